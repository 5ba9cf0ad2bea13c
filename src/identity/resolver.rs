/// DID Resolver - orchestrates the resolution tiers
use crate::{
    did::{ChainState, ChainStateStore, ChainStatus, Did, DidDocument, DidDocumentBuilder, DidIdentifier},
    error::{DidError, DidResult},
    identity::{
        crawler::{ChainCrawler, CrawlReport},
        indexer::ChainIndexer,
        remote::RemoteResolverClient,
        DocumentMetadata, ResolutionErrorCode, ResolutionResult, ResolutionSource,
    },
    metrics,
    rate_limit::CallGate,
};
use chrono::DateTime;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// DID method this resolver answers for
    pub method: String,
    /// Optional remote resolver queried before crawling
    pub remote_resolver_url: Option<String>,
    /// Chain indexer base URL
    pub indexer_url: String,
    /// Maximum transactions visited per crawl
    pub hop_limit: usize,
    /// Timeout for each outbound HTTP request
    pub request_timeout: Duration,
    /// Minimum spacing between indexer calls
    pub min_call_interval: Duration,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            method: "bsv".to_string(),
            remote_resolver_url: None,
            indexer_url: "https://api.whatsonchain.com/v1/bsv/main".to_string(),
            hop_limit: 100,
            request_timeout: Duration::from_secs(10),
            min_call_interval: Duration::from_millis(350),
            user_agent: concat!("chainlink-did/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Tiered DID resolver
#[derive(Clone)]
pub struct DidResolver {
    config: ResolverConfig,
    local: Option<ChainStateStore>,
    remote: Option<RemoteResolverClient>,
    crawler: ChainCrawler,
}

impl DidResolver {
    /// Create a resolver; `local` is the owning wallet's chain-state store, if any
    pub fn new(config: ResolverConfig, local: Option<ChainStateStore>) -> DidResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DidError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let remote = config
            .remote_resolver_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| RemoteResolverClient::new(http.clone(), url));

        let indexer = ChainIndexer::new(
            http,
            &config.indexer_url,
            CallGate::new(config.min_call_interval),
        );
        let crawler = ChainCrawler::new(indexer, config.hop_limit);

        Ok(Self {
            config,
            local,
            remote,
            crawler,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a DID
    ///
    /// Resolution order:
    /// 1. Legacy key DIDs are reconstructed without any I/O
    /// 2. Local chain-state store
    /// 3. Remote resolver (200 or 410 answers; anything else falls through)
    /// 4. Crawl of the spend chain through the indexer
    ///
    /// Misses are reported in the result's metadata. `Err` only when the
    /// indexer cannot be reached for the issuance transaction.
    pub async fn resolve(&self, did: &str) -> DidResult<ResolutionResult> {
        let parsed = match Did::parse(did, &self.config.method) {
            Ok(parsed) => parsed,
            Err(e) => {
                metrics::record_resolution("none", "invalid");
                return Ok(ResolutionResult::error(
                    ResolutionErrorCode::InvalidDid,
                    e.to_string(),
                ));
            }
        };
        let did = parsed.to_string();

        let txid = match parsed.identifier() {
            DidIdentifier::LegacyKey(key) => return self.resolve_legacy(&did, key),
            DidIdentifier::Txid(txid) => txid.clone(),
        };

        if let Some(result) = self.resolve_local(&did).await {
            return Ok(result);
        }
        if let Some(result) = self.resolve_remote(&did).await {
            return Ok(result);
        }
        self.resolve_chain(&did, &txid).await
    }

    fn resolve_legacy(&self, did: &str, key: &str) -> DidResult<ResolutionResult> {
        match DidDocumentBuilder::new().did(did).subject_key(key).build() {
            Ok(document) => {
                metrics::record_resolution("legacy", "found");
                Ok(ResolutionResult::found(
                    Some(document),
                    DocumentMetadata::default(),
                    ResolutionSource::Legacy,
                ))
            }
            Err(e) => {
                metrics::record_resolution("legacy", "invalid");
                Ok(ResolutionResult::error(
                    ResolutionErrorCode::InvalidDid,
                    e.to_string(),
                ))
            }
        }
    }

    async fn resolve_local(&self, did: &str) -> Option<ResolutionResult> {
        let store = self.local.as_ref()?;
        let state = match store.find_latest(did).await {
            Ok(state) => state?,
            Err(e) => {
                warn!(%did, error = %e, "local chain state unavailable");
                return None;
            }
        };

        let document = match document_from_state(&state) {
            Ok(document) => Some(document),
            // Deactivated DIDs may legitimately resolve without a document
            Err(e) if state.status == ChainStatus::Deactivated => {
                debug!(%did, error = %e, "no document for deactivated DID");
                None
            }
            Err(e) => {
                warn!(%did, error = %e, "unusable local chain state");
                return None;
            }
        };

        let deactivated = state.status == ChainStatus::Deactivated;
        let metadata = DocumentMetadata {
            deactivated: deactivated.then_some(true),
            version_id: Some(state.current_outpoint.txid.clone()),
            created: Some(state.created_at.to_rfc3339()),
            updated: Some(state.updated_at.to_rfc3339()),
        };

        metrics::record_resolution("local", outcome(deactivated));
        Some(ResolutionResult::found(document, metadata, ResolutionSource::Local))
    }

    async fn resolve_remote(&self, did: &str) -> Option<ResolutionResult> {
        let remote = self.remote.as_ref()?;
        match remote.resolve(did).await {
            Ok(result) => {
                metrics::record_resolution(
                    "remote",
                    outcome(result.did_document_metadata.is_deactivated()),
                );
                Some(result)
            }
            Err(e) => {
                debug!(%did, error = %e, "remote resolver miss, crawling chain");
                None
            }
        }
    }

    async fn resolve_chain(&self, did: &str, txid: &str) -> DidResult<ResolutionResult> {
        let report = self.crawler.crawl(txid).await.map_err(|e| {
            metrics::record_resolution("chain", "error");
            e
        })?;
        info!(%did, hops = report.hops, found_issuance = report.found_issuance, "crawled DID chain");
        Ok(result_from_report(did, report))
    }
}

fn document_from_state(state: &ChainState) -> DidResult<DidDocument> {
    DidDocumentBuilder::new()
        .did(&state.did)
        .subject_key(&state.subject_key)
        .services(state.services.clone())
        .additional_keys(state.additional_keys.clone())
        .build()
}

fn result_from_report(did: &str, report: CrawlReport) -> ResolutionResult {
    let hops = report.hops;

    let mut result = if report.deactivated || report.latest.is_some() {
        let (document, version_id, updated) = match report.latest {
            Some(latest) => (
                Some(latest.document),
                Some(latest.txid),
                latest
                    .time
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|t| t.to_rfc3339()),
            ),
            None => (None, None, None),
        };
        let metadata = DocumentMetadata {
            deactivated: report.deactivated.then_some(true),
            version_id,
            created: None,
            updated,
        };
        metrics::record_resolution("chain", outcome(report.deactivated));
        ResolutionResult::found(document, metadata, ResolutionSource::Chain)
    } else if report.found_issuance {
        metrics::record_resolution("chain", "pending");
        return ResolutionResult::pending(did, hops);
    } else {
        metrics::record_resolution("chain", "not_found");
        ResolutionResult::error(
            ResolutionErrorCode::NotFound,
            format!("No chain found for {}", did),
        )
    };

    result.did_resolution_metadata.hops = Some(hops);
    result
}

fn outcome(deactivated: bool) -> &'static str {
    if deactivated {
        "deactivated"
    } else {
        "found"
    }
}
