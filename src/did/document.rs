/// W3C-shaped DID documents
///
/// Documents are never stored on their own; they are rebuilt from the subject
/// key plus whatever services and additional keys the chain state carries.
use crate::{
    crypto::keys::public_key_jwk,
    error::{DidError, DidResult},
};
use serde::{Deserialize, Serialize};

pub const DID_CONTEXT_V1: &str = "https://www.w3.org/ns/did/v1";
pub const JWS_2020_CONTEXT: &str = "https://w3id.org/security/suites/jws-2020/v1";
pub const VERIFICATION_METHOD_TYPE: &str = "JsonWebKey2020";

/// DID document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<ServiceEndpoint>,
}

/// Verification method carrying a secp256k1 JWK
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_jwk: PublicKeyJwk,
}

/// Elliptic-curve public key in JWK form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// Service entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

/// Builder for DID documents
#[derive(Debug, Default)]
pub struct DidDocumentBuilder {
    did: Option<String>,
    subject_key: Option<String>,
    controller: Option<String>,
    services: Vec<ServiceEndpoint>,
    additional_keys: Vec<String>,
}

impl DidDocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    /// Primary verification key (compressed, hex)
    pub fn subject_key(mut self, key: impl Into<String>) -> Self {
        self.subject_key = Some(key.into());
        self
    }

    /// Controller; defaults to the DID itself
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    pub fn services(mut self, services: Vec<ServiceEndpoint>) -> Self {
        self.services = services;
        self
    }

    pub fn additional_keys(mut self, keys: Vec<String>) -> Self {
        self.additional_keys = keys;
        self
    }

    pub fn build(self) -> DidResult<DidDocument> {
        let did = self
            .did
            .ok_or_else(|| DidError::Validation("DID is required for a document".to_string()))?;
        let subject_key = self.subject_key.ok_or_else(|| {
            DidError::Validation("Subject key is required for a document".to_string())
        })?;
        let controller = self.controller.unwrap_or_else(|| did.clone());

        let mut verification_method = Vec::with_capacity(1 + self.additional_keys.len());
        for (i, key) in std::iter::once(&subject_key)
            .chain(self.additional_keys.iter())
            .enumerate()
        {
            verification_method.push(VerificationMethod {
                id: format!("{}#key-{}", did, i + 1),
                method_type: VERIFICATION_METHOD_TYPE.to_string(),
                controller: controller.clone(),
                public_key_jwk: public_key_jwk(key)?,
            });
        }

        let authentication: Vec<String> =
            verification_method.iter().map(|vm| vm.id.clone()).collect();
        let assertion_method = vec![format!("{}#key-1", did)];

        let service = self
            .services
            .into_iter()
            .map(|s| ServiceEndpoint {
                id: qualify_fragment(&did, &s.id),
                ..s
            })
            .collect();

        Ok(DidDocument {
            context: vec![DID_CONTEXT_V1.to_string(), JWS_2020_CONTEXT.to_string()],
            id: did,
            controller: Some(controller),
            verification_method,
            authentication,
            assertion_method,
            service,
        })
    }
}

/// `#hub` -> `did:...#hub`; anything else is left alone
fn qualify_fragment(did: &str, id: &str) -> String {
    if id.starts_with('#') {
        format!("{}{}", did, id)
    } else {
        id.to_string()
    }
}

/// Merge updated services into an existing list
///
/// Entries with a matching id are replaced in place, new ones are appended.
pub fn merge_services(
    existing: &[ServiceEndpoint],
    updates: Vec<ServiceEndpoint>,
) -> Vec<ServiceEndpoint> {
    let mut merged = existing.to_vec();
    for service in updates {
        match merged.iter_mut().find(|s| s.id == service.id) {
            Some(slot) => *slot = service,
            None => merged.push(service),
        }
    }
    merged
}

/// Append keys that are not already present, keeping order
pub fn merge_keys(existing: &[String], updates: Vec<String>) -> Vec<String> {
    let mut merged = existing.to_vec();
    for key in updates {
        if !merged.contains(&key) {
            merged.push(key);
        }
    }
    merged
}
