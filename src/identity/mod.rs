//! DID Resolution System
//!
//! Resolves a DID to its current document through, in order: deterministic
//! reconstruction (legacy key DIDs), the local chain-state store, a remote
//! resolver service, and finally a direct crawl of the spend chain.

pub mod crawler;
pub mod indexer;
pub mod remote;
pub mod resolver;

pub use crawler::{ChainCrawler, CrawlReport};
pub use indexer::ChainIndexer;
pub use remote::RemoteResolverClient;
pub use resolver::{DidResolver, ResolverConfig};

use crate::{
    did::DidDocument,
    error::{DidError, DidResult},
};
use serde::{Deserialize, Serialize};

pub const DID_LD_JSON: &str = "application/did+ld+json";

/// Resolution error discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionErrorCode {
    InvalidDid,
    NotFound,
    /// Issuance seen on chain, no document yet; retry shortly
    NotYetPropagated,
    InternalError,
}

/// Which tier answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Legacy,
    Local,
    Remote,
    Chain,
}

/// DID document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl DocumentMetadata {
    pub fn is_deactivated(&self) -> bool {
        self.deactivated.unwrap_or(false)
    }
}

/// Resolution metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolutionErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_issuance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ResolutionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hops: Option<usize>,
}

/// Full resolution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub did_document: Option<DidDocument>,
    #[serde(default)]
    pub did_document_metadata: DocumentMetadata,
    #[serde(default)]
    pub did_resolution_metadata: ResolutionMetadata,
}

impl ResolutionResult {
    /// A resolved (possibly deactivated) document
    pub fn found(
        document: Option<DidDocument>,
        metadata: DocumentMetadata,
        source: ResolutionSource,
    ) -> Self {
        Self {
            did_document: document,
            did_document_metadata: metadata,
            did_resolution_metadata: ResolutionMetadata {
                content_type: Some(DID_LD_JSON.to_string()),
                source: Some(source),
                ..Default::default()
            },
        }
    }

    pub fn error(code: ResolutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            did_document: None,
            did_document_metadata: DocumentMetadata::default(),
            did_resolution_metadata: ResolutionMetadata {
                error: Some(code),
                message: Some(message.into()),
                ..Default::default()
            },
        }
    }

    /// Issuance exists but no document has been published yet
    pub fn pending(did: &str, hops: usize) -> Self {
        let mut result = Self::error(
            ResolutionErrorCode::NotYetPropagated,
            format!("{} is issued but has no document yet", did),
        );
        result.did_resolution_metadata.found_issuance = Some(true);
        result.did_resolution_metadata.source = Some(ResolutionSource::Chain);
        result.did_resolution_metadata.hops = Some(hops);
        result
    }

    pub fn error_code(&self) -> Option<ResolutionErrorCode> {
        self.did_resolution_metadata.error
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        self.did_resolution_metadata.source
    }

    /// Turn the error discriminator into a typed error
    ///
    /// `notFound` and `notYetPropagated` stay distinct so callers know whether
    /// retrying makes sense.
    pub fn into_result(self, did: &str) -> DidResult<Self> {
        let message = self
            .did_resolution_metadata
            .message
            .clone()
            .unwrap_or_default();

        match self.error_code() {
            None => Ok(self),
            Some(ResolutionErrorCode::InvalidDid) => Err(DidError::DidFormat(message)),
            Some(ResolutionErrorCode::NotFound) => {
                Err(DidError::ResolutionNotFound(did.to_string()))
            }
            Some(ResolutionErrorCode::NotYetPropagated) => Err(DidError::ResolutionPending {
                did: did.to_string(),
                found_issuance: self.did_resolution_metadata.found_issuance.unwrap_or(false),
            }),
            Some(ResolutionErrorCode::InternalError) => Err(DidError::UpstreamUnavailable(message)),
        }
    }
}
