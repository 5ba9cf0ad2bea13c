//! Chain-linked DID system
//!
//! A DID is anchored to a spend chain of transaction outputs. The issuance
//! transaction id is the permanent identifier; every later state transition
//! spends the current chain-tip output and creates the next one.

pub mod document;
pub mod engine;
pub mod state;
pub mod store;

pub use document::{DidDocument, DidDocumentBuilder, ServiceEndpoint};
pub use engine::{DidEngine, EngineConfig};
pub use state::{ChainState, ChainStateRecord, ChainStatus, RecordKind};
pub use store::{ActiveTip, ChainStateStore};

use crate::{
    crypto::keys::{validate_public_key_hex, COMPRESSED_KEY_HEX_LEN},
    error::{DidError, DidResult},
};
use serde::Serialize;
use std::fmt;

/// Length of a hex transaction id
pub const TXID_HEX_LEN: usize = 64;

/// The identifier part of a DID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DidIdentifier {
    /// Issuance transaction id (current scheme)
    Txid(String),
    /// Compressed public key (legacy scheme)
    LegacyKey(String),
}

/// A parsed `did:<method>:<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    method: String,
    identifier: DidIdentifier,
}

impl Did {
    /// Parse and validate a DID string for the given method
    pub fn parse(did: &str, method: &str) -> DidResult<Self> {
        let rest = did
            .strip_prefix("did:")
            .ok_or_else(|| DidError::DidFormat(format!("Missing did: prefix in {}", did)))?;

        let (did_method, id) = rest
            .split_once(':')
            .ok_or_else(|| DidError::DidFormat(format!("Missing method in {}", did)))?;

        if did_method != method {
            return Err(DidError::DidFormat(format!(
                "Unsupported DID method '{}', expected '{}'",
                did_method, method
            )));
        }

        let identifier = match id.len() {
            TXID_HEX_LEN if is_lower_hex(id) => DidIdentifier::Txid(id.to_string()),
            COMPRESSED_KEY_HEX_LEN if is_hex(id) => {
                let key = id.to_lowercase();
                validate_public_key_hex(&key)?;
                DidIdentifier::LegacyKey(key)
            }
            _ => {
                return Err(DidError::DidFormat(format!(
                    "Identifier must be a 64-char txid or 66-char public key: {}",
                    did
                )))
            }
        };

        Ok(Self {
            method: method.to_string(),
            identifier,
        })
    }

    /// DID for a freshly issued chain
    pub fn from_txid(method: &str, txid: &str) -> Self {
        Self {
            method: method.to_string(),
            identifier: DidIdentifier::Txid(txid.to_lowercase()),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn identifier(&self) -> &DidIdentifier {
        &self.identifier
    }

    /// Issuance txid for txid-based DIDs
    pub fn txid(&self) -> Option<&str> {
        match &self.identifier {
            DidIdentifier::Txid(txid) => Some(txid),
            DidIdentifier::LegacyKey(_) => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.identifier, DidIdentifier::LegacyKey(_))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match &self.identifier {
            DidIdentifier::Txid(txid) => txid,
            DidIdentifier::LegacyKey(key) => key,
        };
        write!(f, "did:{}:{}", self.method, id)
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_lower_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Result of issuing or updating a DID
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOperationResult {
    pub did: String,
    pub txid: String,
    pub identity_code: String,
    pub document: DidDocument,
}

/// Result of deactivating a DID
#[derive(Debug, Clone, Serialize)]
pub struct DeactivationResult {
    pub txid: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChainKey;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn test_parse_txid_did() {
        let did = Did::parse(&format!("did:bsv:{}", TXID), "bsv").unwrap();
        assert_eq!(did.txid(), Some(TXID));
        assert!(!did.is_legacy());
        assert_eq!(did.to_string(), format!("did:bsv:{}", TXID));
    }

    #[test]
    fn test_parse_legacy_did() {
        let key = ChainKey::generate().public_key_hex();
        let did = Did::parse(&format!("did:bsv:{}", key), "bsv").unwrap();
        assert!(did.is_legacy());
        assert_eq!(did.txid(), None);
        assert_eq!(did.identifier(), &DidIdentifier::LegacyKey(key));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let bad = [
            "bsv:abc".to_string(),
            "did:bsv".to_string(),
            format!("did:web:{}", TXID),
            format!("did:bsv:{}", TXID.to_uppercase()),
            format!("did:bsv:{}", &TXID[..63]),
            format!("did:bsv:{}zz", &TXID[..62]),
            format!("did:bsv:02{}", "ff".repeat(32)),
        ];

        for did in bad {
            assert!(
                matches!(Did::parse(&did, "bsv"), Err(DidError::DidFormat(_))),
                "{} should be rejected",
                did
            );
        }
    }

    #[test]
    fn test_from_txid_display() {
        let did = Did::from_txid("bsv", TXID);
        assert_eq!(Did::parse(&did.to_string(), "bsv").unwrap(), did);
    }
}
