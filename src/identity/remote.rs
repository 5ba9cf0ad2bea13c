/// Remote resolver client
///
/// Queries `GET {base}/resolve?did=...` on another resolver service.
/// `200` with a document and `410 Gone` (deactivated) are answers; everything
/// else is reported as unavailable so the caller can move to the next tier.
use crate::{
    error::{DidError, DidResult},
    identity::{DocumentMetadata, ResolutionResult, ResolutionSource},
    metrics,
};
use reqwest::StatusCode;
use tracing::debug;

#[derive(Clone)]
pub struct RemoteResolverClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteResolverClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn resolve(&self, did: &str) -> DidResult<ResolutionResult> {
        let url = format!("{}/resolve", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("did", did)])
            .send()
            .await
            .map_err(|e| self.unavailable(format!("Remote resolver request failed: {}", e)))?;

        let status = response.status();
        debug!(%did, %status, "remote resolver answered");

        match status {
            StatusCode::OK => {
                let mut result: ResolutionResult = response
                    .json()
                    .await
                    .map_err(|e| self.unavailable(format!("Unreadable remote result: {}", e)))?;
                if result.did_document.is_none() {
                    return Err(self.unavailable("Remote resolver returned no document".to_string()));
                }
                result.did_resolution_metadata.source = Some(ResolutionSource::Remote);
                Ok(result)
            }
            StatusCode::GONE => {
                // Body is optional; keep its document when it has one
                let body = response.json::<ResolutionResult>().await.ok();
                let (document, mut metadata) = match body {
                    Some(r) => (r.did_document, r.did_document_metadata),
                    None => (None, DocumentMetadata::default()),
                };
                metadata.deactivated = Some(true);
                Ok(ResolutionResult::found(document, metadata, ResolutionSource::Remote))
            }
            other => Err(self.unavailable(format!("Remote resolver returned {}", other))),
        }
    }

    fn unavailable(&self, message: String) -> DidError {
        metrics::record_upstream_failure("remote_resolver");
        DidError::UpstreamUnavailable(message)
    }
}
