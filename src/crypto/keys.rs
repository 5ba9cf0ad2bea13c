/// Chain-linking keys
///
/// Every DID gets its own secp256k1 key pair whose only job is authorizing
/// spends of that DID's chain-tip output. It is unrelated to the identity's
/// main key.
use crate::{
    codec::Script,
    did::document::PublicKeyJwk,
    error::{DidError, DidResult},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use k256::{
    ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey, VerifyingKey},
    SecretKey,
};
use sha2::{Digest, Sha256};

/// Sighash flag appended to every signature (ALL | FORKID)
pub const SIGHASH_ALL_FORKID: u8 = 0x41;

/// Length of a hex-encoded compressed public key
pub const COMPRESSED_KEY_HEX_LEN: usize = 66;

/// Per-DID chain-linking key pair
pub struct ChainKey {
    signing_key: SigningKey,
}

impl ChainKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Load a key from its 32-byte hex encoding
    pub fn from_hex(hex_key: &str) -> DidResult<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| DidError::Crypto(format!("Invalid hex private key: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(DidError::Crypto(
                "Private key must be exactly 32 bytes".to_string(),
            ));
        }

        let secret_key = SecretKey::from_slice(&key_bytes)
            .map_err(|e| DidError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            signing_key: SigningKey::from(secret_key),
        })
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Compressed public key (33 bytes, hex-encoded)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Short identity code derived from the public key
    pub fn identity_code(&self) -> String {
        let digest = Sha256::digest(self.public_key_bytes());
        hex::encode(&digest[..16])
    }

    /// Sign a transaction sighash digest
    ///
    /// Returns a low-S DER signature with the sighash flag appended.
    pub fn sign_sighash(&self, digest: &[u8]) -> DidResult<Vec<u8>> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| DidError::Crypto(format!("Failed to sign sighash: {}", e)))?;
        let signature = signature.normalize_s().unwrap_or(signature);

        let mut bytes = signature.to_der().as_bytes().to_vec();
        bytes.push(SIGHASH_ALL_FORKID);
        Ok(bytes)
    }

    /// Unlocking script `<sig> <pubkey>` for a chain-tip input
    pub fn unlocking_script(&self, digest: &[u8]) -> DidResult<Script> {
        let mut script = Script::default();
        script.push_data(&self.sign_sighash(digest)?);
        script.push_data(&self.public_key_bytes());
        Ok(script)
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

fn parse_public_key(public_key_hex: &str) -> DidResult<VerifyingKey> {
    if public_key_hex.len() != COMPRESSED_KEY_HEX_LEN {
        return Err(DidError::DidFormat(format!(
            "Public key must be {} hex characters",
            COMPRESSED_KEY_HEX_LEN
        )));
    }

    let bytes = hex::decode(public_key_hex)
        .map_err(|e| DidError::DidFormat(format!("Invalid public key hex: {}", e)))?;

    if bytes[0] != 0x02 && bytes[0] != 0x03 {
        return Err(DidError::DidFormat(
            "Public key must be compressed".to_string(),
        ));
    }

    VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| DidError::DidFormat(format!("Invalid secp256k1 point: {}", e)))
}

/// Check that a hex string is a valid compressed secp256k1 public key
pub fn validate_public_key_hex(public_key_hex: &str) -> DidResult<()> {
    parse_public_key(public_key_hex).map(|_| ())
}

/// Convert a compressed public key into its JWK form
pub fn public_key_jwk(public_key_hex: &str) -> DidResult<PublicKeyJwk> {
    let key = parse_public_key(public_key_hex)?;
    let point = key.to_encoded_point(false);

    let (x, y) = match (point.x(), point.y()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(DidError::Crypto(
                "Public key has no affine coordinates".to_string(),
            ))
        }
    };

    Ok(PublicKeyJwk {
        kty: "EC".to_string(),
        crv: "secp256k1".to_string(),
        x: URL_SAFE_NO_PAD.encode(x),
        y: URL_SAFE_NO_PAD.encode(y),
    })
}
