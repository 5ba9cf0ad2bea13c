/// Chain-link marker codec
///
/// Encodes `[MARKER, identity code, payload]` into a non-spendable data-carrier
/// script and reads those segments back out of arbitrary output scripts.
/// Decoding never fails loudly: most scanned outputs have nothing to do with
/// DIDs, so anything unparseable yields an empty segment list.
use crate::did::document::DidDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol marker carried as the first segment of every chain-link output
pub const MARKER: &str = "BSVDID";

/// Payload written by the issuance transaction
pub const PAYLOAD_ISSUANCE: &str = "1";
/// Payload of a funding / no-op continuation
pub const PAYLOAD_FUNDING: &str = "2";
/// Payload written by the deactivation transaction
pub const PAYLOAD_REVOCATION: &str = "3";

pub const OP_FALSE: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_RETURN: u8 = 0x6a;

/// Raw output script bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(#[serde(with = "hex_bytes")] Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Option<Self> {
        hex::decode(hex_str).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a minimal data push
    pub fn push_data(&mut self, data: &[u8]) {
        let len = data.len();
        match len {
            0 => self.0.push(OP_FALSE),
            1..=75 => self.0.push(len as u8),
            76..=0xff => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
            }
            0x100..=0xffff => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
            }
            _ => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        self.0.extend_from_slice(data);
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Build the data-carrier script for a chain-link transition
pub fn encode(identity_code: &str, payload: &str) -> Script {
    let mut script = Script::new(vec![OP_FALSE, OP_RETURN]);
    script.push_data(MARKER.as_bytes());
    script.push_data(identity_code.as_bytes());
    script.push_data(payload.as_bytes());
    script
}

/// Read the UTF-8 push segments following the first OP_RETURN
///
/// Returns an empty list on any malformed input.
pub fn decode(script: &[u8]) -> Vec<String> {
    let start = match script.iter().position(|&b| b == OP_RETURN) {
        Some(pos) => pos + 1,
        None => return Vec::new(),
    };
    read_pushes(&script[start..]).unwrap_or_default()
}

/// Decode a hex-encoded script; bad hex is treated like any other malformed script
pub fn decode_hex(script_hex: &str) -> Vec<String> {
    match hex::decode(script_hex) {
        Ok(bytes) => decode(&bytes),
        Err(_) => Vec::new(),
    }
}

fn read_pushes(mut rest: &[u8]) -> Option<Vec<String>> {
    let mut segments = Vec::new();

    while let Some((&opcode, tail)) = rest.split_first() {
        let (len, tail) = match opcode {
            OP_FALSE => (0usize, tail),
            1..=75 => (opcode as usize, tail),
            OP_PUSHDATA1 => {
                let (len, tail) = take(tail, 1)?;
                (len[0] as usize, tail)
            }
            OP_PUSHDATA2 => {
                let (len, tail) = take(tail, 2)?;
                (u16::from_le_bytes([len[0], len[1]]) as usize, tail)
            }
            OP_PUSHDATA4 => {
                let (len, tail) = take(tail, 4)?;
                (
                    u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize,
                    tail,
                )
            }
            _ => return None,
        };

        let (data, tail) = take(tail, len)?;
        segments.push(String::from_utf8(data.to_vec()).ok()?);
        rest = tail;
    }

    Some(segments)
}

fn take(bytes: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if bytes.len() < n {
        None
    } else {
        Some(bytes.split_at(n))
    }
}

/// Meaning of a decoded chain-link output
#[derive(Debug, Clone, PartialEq)]
pub enum ChainLinkPayload {
    Issuance,
    Funding,
    Revocation,
    Document(Box<DidDocument>),
    Unrecognized,
}

/// A decoded chain-link output
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    pub identity_code: String,
    pub payload: ChainLinkPayload,
}

impl ChainLink {
    /// Interpret decoded segments; `None` when they are not a chain-link marker
    pub fn from_segments(segments: &[String]) -> Option<Self> {
        match segments {
            [marker, code, payload, ..] if marker == MARKER => Some(Self {
                identity_code: code.clone(),
                payload: classify(payload),
            }),
            _ => None,
        }
    }

    pub fn from_script_hex(script_hex: &str) -> Option<Self> {
        Self::from_segments(&decode_hex(script_hex))
    }
}

fn classify(payload: &str) -> ChainLinkPayload {
    match payload {
        PAYLOAD_ISSUANCE => ChainLinkPayload::Issuance,
        PAYLOAD_FUNDING => ChainLinkPayload::Funding,
        PAYLOAD_REVOCATION => ChainLinkPayload::Revocation,
        other => match serde_json::from_str::<DidDocument>(other) {
            Ok(doc) => ChainLinkPayload::Document(Box::new(doc)),
            Err(_) => ChainLinkPayload::Unrecognized,
        },
    }
}
