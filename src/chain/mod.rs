//! Chain capability
//!
//! The wallet SDK (key derivation, transaction construction, signing and
//! broadcast) is consumed through the [`ChainClient`] trait. The DID engine
//! and store depend only on this trait, never on a concrete wallet backend.

#[cfg(test)]
pub mod memory;

use crate::{codec::Script, error::DidResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Reference to a transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.txid, self.vout)
    }
}

impl FromStr for Outpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .rsplit_once('.')
            .ok_or_else(|| format!("Outpoint must be txid.vout: {}", s))?;
        let vout = vout
            .parse()
            .map_err(|_| format!("Invalid output index in {}", s))?;
        Ok(Self::new(txid, vout))
    }
}

impl Serialize for Outpoint {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Outpoint {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Output to create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub script: Script,
    pub value: u64,
    /// Basket that tracks this output; `None` for untracked outputs
    pub basket: Option<String>,
    pub tags: Vec<String>,
    /// JSON metadata attached to the tracked output
    pub metadata: Option<String>,
    pub description: String,
}

/// Input to spend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub outpoint: Outpoint,
    /// Expected unlocking script length, for fee estimation
    pub unlocking_script_length: usize,
    pub description: String,
}

/// Transaction request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTransaction {
    pub description: String,
    pub outputs: Vec<OutputSpec>,
    pub inputs: Vec<InputSpec>,
}

/// Digest a caller must sign for one of its inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignableInput {
    pub index: u32,
    pub outpoint: Outpoint,
    pub sighash: Vec<u8>,
}

/// Partially signed transaction awaiting client-side unlocking scripts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signable {
    pub reference: String,
    pub inputs: Vec<SignableInput>,
}

/// Outcome of `create_transaction`
///
/// Transactions without caller-supplied inputs are finalized immediately and
/// carry a txid; those spending caller inputs come back as a [`Signable`].
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub txid: Option<String>,
    pub raw: Vec<u8>,
    pub signable: Option<Signable>,
}

/// Finalized, broadcast transaction
#[derive(Debug, Clone)]
pub struct FinalizedTransaction {
    pub txid: String,
    pub raw: Vec<u8>,
}

/// Unlocking script supplied for a signable input
#[derive(Debug, Clone)]
pub struct InputUnlock {
    pub index: u32,
    pub unlocking_script: Script,
}

/// Output currently tracked by the wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedOutput {
    pub outpoint: Outpoint,
    pub script: Script,
    pub value: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Wallet capability consumed by the DID engine and store
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Derive a public key (compressed hex) under a protocol label
    async fn derive_key(&self, label: &str, for_self: bool) -> DidResult<String>;

    /// Locking script paying to a public key's address
    async fn address_script(&self, public_key_hex: &str) -> DidResult<Script>;

    /// Build, fund and (when possible) sign a transaction
    async fn create_transaction(&self, request: CreateTransaction)
        -> DidResult<CreatedTransaction>;

    /// Complete a signable transaction and broadcast it
    async fn finish_signing(
        &self,
        signable: Signable,
        unlocks: Vec<InputUnlock>,
    ) -> DidResult<FinalizedTransaction>;

    /// Unspent outputs in a basket, oldest first
    async fn list_tracked_outputs(&self, basket: &str) -> DidResult<Vec<TrackedOutput>>;
}
