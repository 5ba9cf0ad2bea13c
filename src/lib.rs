//! Chain-linked DIDs on a UTXO ledger
//!
//! Issuance, update and deactivation of `did:<method>:<txid>` identifiers
//! whose state lives in a spend chain of marker transactions, plus a tiered
//! resolver and its HTTP surface.

pub mod api;
pub mod chain;
pub mod codec;
pub mod config;
pub mod context;
pub mod crypto;
pub mod did;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod server;
pub mod wallet;

pub use context::AppContext;
pub use error::{DidError, DidResult};
