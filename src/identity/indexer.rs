/// Chain indexer client
///
/// Thin typed wrapper over a public block-explorer API: transaction lookup,
/// spend lookup for an output, and address history. Every call goes through a
/// [`CallGate`] so the indexer's rate limit is respected.
use crate::{
    codec::ChainLink,
    error::{DidError, DidResult},
    metrics,
    rate_limit::CallGate,
};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

/// Script of one transaction output
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexedScript {
    #[serde(default)]
    pub hex: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// One transaction output
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedOutput {
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: IndexedScript,
}

/// One transaction input; coinbase inputs carry no outpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexedInput {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
}

/// Transaction as reported by the indexer
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<IndexedInput>,
    #[serde(default)]
    pub vout: Vec<IndexedOutput>,
    /// Block time in unix seconds, absent while unconfirmed
    #[serde(default)]
    pub time: Option<i64>,
}

impl IndexedTransaction {
    /// First output whose script decodes as a chain link
    pub fn chain_link(&self) -> Option<ChainLink> {
        self.vout
            .iter()
            .find_map(|output| ChainLink::from_script_hex(&output.script_pub_key.hex))
    }

    /// Address of the first output, where the chain-tip lives
    pub fn tip_address(&self) -> Option<&str> {
        self.vout
            .first()
            .and_then(|output| output.script_pub_key.addresses.first())
            .map(String::as_str)
    }

    /// Whether one of the inputs consumes `txid:vout`
    pub fn spends(&self, txid: &str, vout: u32) -> bool {
        self.vin
            .iter()
            .any(|input| input.txid.as_deref() == Some(txid) && input.vout == Some(vout))
    }
}

#[derive(Debug, Deserialize)]
struct SpendInfo {
    txid: String,
}

/// Address history entry
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: String,
    /// Block height; zero or negative while unconfirmed
    #[serde(default)]
    pub height: i64,
}

impl HistoryEntry {
    /// Ordering key where unconfirmed entries count as newest
    pub fn recency(&self) -> i64 {
        if self.height <= 0 {
            i64::MAX
        } else {
            self.height
        }
    }
}

/// Rate-gated indexer client
#[derive(Clone)]
pub struct ChainIndexer {
    http: reqwest::Client,
    base_url: String,
    gate: CallGate,
}

impl ChainIndexer {
    pub fn new(http: reqwest::Client, base_url: &str, gate: CallGate) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            gate,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a transaction; `None` when the indexer does not know it
    pub async fn transaction(&self, txid: &str) -> DidResult<Option<IndexedTransaction>> {
        self.get_json(&format!("/tx/{}", txid)).await
    }

    /// Txid of the transaction spending `txid:vout`, if any
    pub async fn spending_txid(&self, txid: &str, vout: u32) -> DidResult<Option<String>> {
        let spend: Option<SpendInfo> = self
            .get_json(&format!("/tx/{}/out/{}/spend", txid, vout))
            .await?;
        Ok(spend.map(|s| s.txid))
    }

    /// Transactions touching `address`
    pub async fn address_history(&self, address: &str) -> DidResult<Vec<HistoryEntry>> {
        Ok(self
            .get_json(&format!("/address/{}/history", address))
            .await?
            .unwrap_or_default())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> DidResult<Option<T>> {
        self.gate.wait().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "indexer request");

        let response = self.http.get(&url).send().await.map_err(|e| {
            metrics::record_upstream_failure("indexer");
            warn!(%url, error = %e, "indexer unreachable");
            DidError::UpstreamUnavailable(format!("Indexer request failed: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            metrics::record_upstream_failure("indexer");
            return Err(DidError::UpstreamUnavailable(format!(
                "Indexer returned {} for {}",
                status, path
            )));
        }

        let body = response.json::<T>().await.map_err(|e| {
            metrics::record_upstream_failure("indexer");
            DidError::UpstreamUnavailable(format!("Unreadable indexer response: {}", e))
        })?;
        Ok(Some(body))
    }
}
