/// Cryptographic operations for chain-linked DIDs
pub mod keys;

pub use keys::{public_key_jwk, validate_public_key_hex, ChainKey, SIGHASH_ALL_FORKID};
