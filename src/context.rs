/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    error::DidResult,
    identity::DidResolver,
    rate_limit::RateLimiter,
};
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub resolver: Arc<DidResolver>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    ///
    /// The standalone server has no wallet of its own, so resolution starts
    /// at the remote tier for txid DIDs.
    pub fn new(config: ServerConfig) -> DidResult<Self> {
        config.validate()?;

        let resolver = DidResolver::new(config.resolver_config(), None)?;
        info!(
            method = %config.did.method,
            indexer = %config.resolution.indexer_url,
            remote = config.resolution.remote_resolver_url.as_deref().unwrap_or("none"),
            "resolver configured"
        );

        let rate_limiter = RateLimiter::new(config.rate_limit_config());

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    /// Context around an existing resolver, e.g. one backed by a wallet's store
    pub fn with_resolver(config: ServerConfig, resolver: DidResolver) -> DidResult<Self> {
        config.validate()?;
        let rate_limiter = RateLimiter::new(config.rate_limit_config());

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            rate_limiter: Arc::new(rate_limiter),
        })
    }
}
