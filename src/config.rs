/// Configuration management for the DID resolution service
use crate::{
    error::{DidError, DidResult},
    identity::ResolverConfig,
    rate_limit::RateLimitConfig,
};
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub did: DidConfig,
    pub resolution: ResolutionConfig,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// DID method and chain-state settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidConfig {
    pub method: String,
    /// Tracked-output basket holding chain state
    pub basket: String,
}

/// Resolution tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Remote resolver queried before crawling
    pub remote_resolver_url: Option<String>,
    pub indexer_url: String,
    pub crawl_hop_limit: usize,
    /// Minimum spacing between indexer calls, 0 disables
    pub crawl_min_interval_ms: u64,
    pub remote_timeout_secs: u64,
}

/// Inbound rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_second: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(DidError::Validation(format!(
                "Log format must be 'text' or 'json': '{}'",
                other
            ))),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                hostname: "0.0.0.0".to_string(),
                port: 3060,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            did: DidConfig {
                method: "bsv".to_string(),
                basket: "did-chain".to_string(),
            },
            resolution: ResolutionConfig {
                remote_resolver_url: None,
                indexer_url: "https://api.whatsonchain.com/v1/bsv/main".to_string(),
                crawl_hop_limit: 100,
                crawl_min_interval_ms: 350,
                remote_timeout_secs: 10,
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                requests_per_second: 20,
            },
            logging: LoggingConfig {
                level: "chainlink_did=debug,tower_http=debug".to_string(),
                format: LogFormat::Text,
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DidResult<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let hostname = env::var("DID_HOSTNAME").unwrap_or(defaults.service.hostname);
        let port = match env::var("DID_PORT") {
            Ok(port) => port
                .parse()
                .map_err(|_| DidError::Validation("Invalid port number".to_string()))?,
            Err(_) => defaults.service.port,
        };

        let method = env::var("DID_METHOD").unwrap_or(defaults.did.method);
        let basket = env::var("DID_BASKET").unwrap_or(defaults.did.basket);

        let remote_resolver_url = env::var("DID_RESOLVER_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        let indexer_url =
            env::var("DID_INDEXER_URL").unwrap_or(defaults.resolution.indexer_url);
        let crawl_hop_limit = env::var("DID_CRAWL_HOP_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.resolution.crawl_hop_limit);
        let crawl_min_interval_ms = env::var("DID_CRAWL_MIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.resolution.crawl_min_interval_ms);
        let remote_timeout_secs = env::var("DID_REMOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.resolution.remote_timeout_secs);

        let rate_limit_enabled = env::var("DID_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let rate_limit_rps = env::var("DID_RATE_LIMIT_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit.requests_per_second);

        let log_level = env::var("RUST_LOG").unwrap_or(defaults.logging.level);
        let log_format = match env::var("DID_LOG_FORMAT") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.logging.format,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version: defaults.service.version,
            },
            did: DidConfig { method, basket },
            resolution: ResolutionConfig {
                remote_resolver_url,
                indexer_url,
                crawl_hop_limit,
                crawl_min_interval_ms,
                remote_timeout_secs,
            },
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                requests_per_second: rate_limit_rps,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DidResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DidError::Validation("Hostname cannot be empty".to_string()));
        }

        let method = &self.did.method;
        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(DidError::Validation(format!(
                "DID method must be lowercase alphanumeric: '{}'",
                method
            )));
        }

        if self.did.basket.is_empty() {
            return Err(DidError::Validation("Basket cannot be empty".to_string()));
        }

        if self.resolution.crawl_hop_limit == 0 {
            return Err(DidError::Validation(
                "Crawl hop limit must be greater than zero".to_string(),
            ));
        }

        if self.resolution.remote_timeout_secs == 0 {
            return Err(DidError::Validation(
                "Remote timeout must be greater than zero".to_string(),
            ));
        }

        for url in std::iter::once(&self.resolution.indexer_url)
            .chain(self.resolution.remote_resolver_url.iter())
        {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DidError::Validation(format!(
                    "Expected an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_second == 0 {
            return Err(DidError::Validation(
                "Rate limit must allow at least one request per second".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolver settings derived from this configuration
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            method: self.did.method.clone(),
            remote_resolver_url: self.resolution.remote_resolver_url.clone(),
            indexer_url: self.resolution.indexer_url.clone(),
            hop_limit: self.resolution.crawl_hop_limit,
            request_timeout: Duration::from_secs(self.resolution.remote_timeout_secs),
            min_call_interval: Duration::from_millis(self.resolution.crawl_min_interval_ms),
            user_agent: format!("chainlink-did/{}", self.service.version),
        }
    }

    /// Inbound limiter settings; burst is twice the sustained rate
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.rate_limit.enabled,
            requests_per_second: self.rate_limit.requests_per_second,
            burst_size: self.rate_limit.requests_per_second.saturating_mul(2),
        }
    }
}
