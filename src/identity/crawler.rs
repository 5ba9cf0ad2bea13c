/// Spend-chain crawler
///
/// Starting from the issuance transaction, follow the chain-tip output
/// (output 0) from spend to spend, remembering the most recent document seen.
/// Stops at a revocation marker, a dead end, a revisited transaction, or the
/// hop limit.
use crate::{
    codec::ChainLinkPayload,
    did::DidDocument,
    error::DidResult,
    identity::indexer::{ChainIndexer, IndexedTransaction},
    metrics,
};
use std::{cmp::Reverse, collections::HashSet};
use tracing::{debug, warn};

/// Output index of the chain-tip in every chain transaction
const TIP_VOUT: u32 = 0;

/// Document carried by one crawled transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledDocument {
    pub document: DidDocument,
    pub txid: String,
    /// Block time in unix seconds
    pub time: Option<i64>,
}

/// What a crawl established about a DID
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Latest document seen along the chain
    pub latest: Option<CrawledDocument>,
    pub found_issuance: bool,
    pub deactivated: bool,
    pub hops: usize,
}

/// Walks a DID's spend chain through the indexer
#[derive(Clone)]
pub struct ChainCrawler {
    indexer: ChainIndexer,
    hop_limit: usize,
}

impl ChainCrawler {
    pub fn new(indexer: ChainIndexer, hop_limit: usize) -> Self {
        Self { indexer, hop_limit }
    }

    /// Crawl from `issuance_txid`
    ///
    /// Only a failure to fetch the issuance transaction itself is an error;
    /// later indexer failures end the walk with what has been seen so far.
    pub async fn crawl(&self, issuance_txid: &str) -> DidResult<CrawlReport> {
        let mut report = CrawlReport::default();
        let mut visited = HashSet::new();
        let mut next = Some(Hop::Txid(issuance_txid.to_string()));

        while let Some(hop) = next.take() {
            if report.hops >= self.hop_limit {
                debug!(%issuance_txid, hops = report.hops, "crawl hop limit reached");
                break;
            }
            if !visited.insert(hop.txid().to_string()) {
                debug!(txid = %hop.txid(), "crawl revisited a transaction");
                break;
            }

            let first_hop = report.hops == 0;
            report.hops += 1;

            let tx = match hop {
                Hop::Fetched(tx) => tx,
                Hop::Txid(txid) => match self.indexer.transaction(&txid).await {
                    Ok(Some(tx)) => tx,
                    Ok(None) => break,
                    Err(e) if first_hop => return Err(e),
                    Err(e) => {
                        warn!(%txid, error = %e, "crawl stopped by indexer failure");
                        break;
                    }
                },
            };

            match tx.chain_link().map(|link| link.payload) {
                Some(ChainLinkPayload::Issuance) => report.found_issuance = true,
                Some(ChainLinkPayload::Document(document)) => {
                    report.latest = Some(CrawledDocument {
                        document: *document,
                        txid: tx.txid.clone(),
                        time: tx.time,
                    });
                }
                Some(ChainLinkPayload::Revocation) => {
                    report.deactivated = true;
                    break;
                }
                Some(ChainLinkPayload::Funding) | Some(ChainLinkPayload::Unrecognized) => {}
                // An unmarked first hop is not a DID chain
                None if first_hop => break,
                None => {}
            }

            next = self.next_hop(&tx, &visited).await;
        }

        metrics::record_crawl_hops(report.hops);
        Ok(report)
    }

    /// Transaction that spent `tx`'s chain-tip
    ///
    /// Asks the indexer for the spend directly, then falls back to the tip
    /// address's history. History candidates are tried newest first and only
    /// one whose inputs consume the chain-tip is taken.
    async fn next_hop(&self, tx: &IndexedTransaction, visited: &HashSet<String>) -> Option<Hop> {
        match self.indexer.spending_txid(&tx.txid, TIP_VOUT).await {
            Ok(Some(spender)) => return Some(Hop::Txid(spender)),
            Ok(None) => {}
            Err(e) => debug!(txid = %tx.txid, error = %e, "spend lookup failed, trying history"),
        }

        let address = tx.tip_address()?;
        let history = match self.indexer.address_history(address).await {
            Ok(history) => history,
            Err(e) => {
                warn!(%address, error = %e, "address history unavailable");
                return None;
            }
        };

        // A spender is never older than what it spends
        let floor = history
            .iter()
            .find(|entry| entry.tx_hash == tx.txid)
            .map(|entry| entry.recency())
            .unwrap_or(i64::MIN);

        let mut candidates: Vec<_> = history
            .into_iter()
            .filter(|entry| !visited.contains(&entry.tx_hash) && entry.recency() >= floor)
            .collect();
        candidates.sort_by_key(|entry| Reverse(entry.recency()));

        for entry in candidates {
            match self.indexer.transaction(&entry.tx_hash).await {
                Ok(Some(candidate)) if candidate.spends(&tx.txid, TIP_VOUT) => {
                    return Some(Hop::Fetched(candidate));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(txid = %entry.tx_hash, error = %e, "history candidate unavailable");
                }
            }
        }

        debug!(txid = %tx.txid, %address, "no history entry spends the chain-tip");
        None
    }
}

/// Next transaction to visit
enum Hop {
    Txid(String),
    /// Already fetched while checking address history
    Fetched(IndexedTransaction),
}

impl Hop {
    fn txid(&self) -> &str {
        match self {
            Hop::Txid(txid) => txid,
            Hop::Fetched(tx) => &tx.txid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{self, PAYLOAD_ISSUANCE, PAYLOAD_REVOCATION},
        did::DidDocumentBuilder,
        error::DidError,
        rate_limit::CallGate,
    };
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ADDRESS: &str = "1ChainTip";

    fn txid(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    fn document(did: &str) -> DidDocument {
        DidDocumentBuilder::new()
            .did(did)
            .subject_key(crate::crypto::ChainKey::generate().public_key_hex())
            .build()
            .unwrap()
    }

    fn chain_tx(txid: &str, payload: &str, time: Option<i64>) -> Value {
        json!({
            "txid": txid,
            "time": time,
            "vout": [
                {"n": 0, "value": 0.00000001, "scriptPubKey": {"hex": "76a91488ac", "addresses": [ADDRESS]}},
                {"n": 1, "value": 0.0, "scriptPubKey": {"hex": codec::encode("c0de", payload).to_hex()}}
            ]
        })
    }

    /// Mark `tx` as consuming `prev`'s chain-tip
    fn spending(mut tx: Value, prev: &str) -> Value {
        tx["vin"] = json!([{"txid": prev, "vout": 0}]);
        tx
    }

    async fn serve_tx(server: &MockServer, body: Value) {
        let txid = body["txid"].as_str().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}", txid)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn serve_spend(server: &MockServer, from: &str, to: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}/out/0/spend", from)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"txid": to})))
            .mount(server)
            .await;
    }

    async fn serve_history(server: &MockServer, entries: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/address/{}/history", ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries))
            .mount(server)
            .await;
    }

    fn crawler(server: &MockServer, hop_limit: usize) -> ChainCrawler {
        let indexer =
            ChainIndexer::new(reqwest::Client::new(), &server.uri(), CallGate::unrestricted());
        ChainCrawler::new(indexer, hop_limit)
    }

    #[tokio::test]
    async fn test_follows_spends_to_latest_document() {
        let server = MockServer::start().await;
        let did = format!("did:bsv:{}", txid(1));
        let v1 = document(&did);
        let v2 = document(&did);

        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, Some(100))).await;
        serve_tx(&server, chain_tx(&txid(2), &serde_json::to_string(&v1).unwrap(), Some(200))).await;
        serve_tx(&server, chain_tx(&txid(3), &serde_json::to_string(&v2).unwrap(), Some(300))).await;
        serve_spend(&server, &txid(1), &txid(2)).await;
        serve_spend(&server, &txid(2), &txid(3)).await;
        serve_history(&server, json!([])).await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        let latest = report.latest.unwrap();
        assert_eq!(latest.document, v2);
        assert_eq!(latest.txid, txid(3));
        assert_eq!(latest.time, Some(300));
        assert!(report.found_issuance);
        assert!(!report.deactivated);
        assert_eq!(report.hops, 3);
    }

    #[tokio::test]
    async fn test_issuance_without_document_is_pending() {
        let server = MockServer::start().await;
        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
        serve_history(&server, json!([{"tx_hash": txid(1), "height": 0}])).await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        assert!(report.found_issuance);
        assert!(report.latest.is_none());
        assert_eq!(report.hops, 1);
    }

    #[tokio::test]
    async fn test_revocation_ends_crawl() {
        let server = MockServer::start().await;
        let did = format!("did:bsv:{}", txid(1));
        let v1 = document(&did);

        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
        serve_tx(&server, chain_tx(&txid(2), &serde_json::to_string(&v1).unwrap(), None)).await;
        serve_tx(&server, chain_tx(&txid(3), PAYLOAD_REVOCATION, None)).await;
        serve_spend(&server, &txid(1), &txid(2)).await;
        serve_spend(&server, &txid(2), &txid(3)).await;
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}/out/0/spend", txid(3))))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        assert!(report.deactivated);
        assert_eq!(report.latest.unwrap().document, v1);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let server = MockServer::start().await;
        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
        serve_tx(&server, chain_tx(&txid(2), "2", None)).await;
        serve_spend(&server, &txid(1), &txid(2)).await;
        serve_spend(&server, &txid(2), &txid(1)).await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        assert_eq!(report.hops, 2);
        assert!(report.found_issuance);
    }

    #[tokio::test]
    async fn test_hop_limit_bounds_crawl() {
        let server = MockServer::start().await;
        for n in 1..=5u8 {
            let payload = if n == 1 { PAYLOAD_ISSUANCE } else { "2" };
            serve_tx(&server, chain_tx(&txid(n), payload, None)).await;
            serve_spend(&server, &txid(n), &txid(n + 1)).await;
        }

        let report = crawler(&server, 3).crawl(&txid(1)).await.unwrap();
        assert_eq!(report.hops, 3);
    }

    #[tokio::test]
    async fn test_history_fallback_follows_spending_input() {
        let server = MockServer::start().await;
        let did = format!("did:bsv:{}", txid(1));
        let old = document(&did);
        let newest = document(&did);

        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
        serve_tx(
            &server,
            spending(chain_tx(&txid(2), &serde_json::to_string(&old).unwrap(), None), &txid(1)),
        )
        .await;
        serve_tx(
            &server,
            spending(chain_tx(&txid(3), &serde_json::to_string(&newest).unwrap(), None), &txid(2)),
        )
        .await;
        // Reused tip address: both later transactions show up in its history
        serve_history(
            &server,
            json!([
                {"tx_hash": txid(1), "height": 10},
                {"tx_hash": txid(2), "height": 11},
                {"tx_hash": txid(3), "height": 0}
            ]),
        )
        .await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        let latest = report.latest.unwrap();
        assert_eq!(latest.txid, txid(3));
        assert_eq!(latest.document, newest);
        assert_eq!(report.hops, 3);
    }

    #[tokio::test]
    async fn test_history_fallback_same_height_reaches_latest() {
        let did = format!("did:bsv:{}", txid(1));
        let v1 = document(&did);
        let v2 = document(&did);
        let unconfirmed = |n: u8| json!({"tx_hash": txid(n), "height": 0});

        // Every entry ties on recency, so listing order must not matter
        for order in [[1u8, 2, 3], [1, 3, 2], [3, 2, 1]] {
            let server = MockServer::start().await;
            serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
            serve_tx(
                &server,
                spending(chain_tx(&txid(2), &serde_json::to_string(&v1).unwrap(), None), &txid(1)),
            )
            .await;
            serve_tx(
                &server,
                spending(chain_tx(&txid(3), &serde_json::to_string(&v2).unwrap(), None), &txid(2)),
            )
            .await;
            serve_history(&server, Value::Array(order.iter().map(|n| unconfirmed(*n)).collect()))
                .await;

            let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
            let latest = report.latest.unwrap();
            assert_eq!(latest.txid, txid(3), "order {:?}", order);
            assert_eq!(latest.document, v2, "order {:?}", order);
            assert_eq!(report.hops, 3, "order {:?}", order);
        }
    }

    #[tokio::test]
    async fn test_history_entry_not_spending_tip_is_ignored() {
        let server = MockServer::start().await;
        let did = format!("did:bsv:{}", txid(1));
        let stray = document(&did);

        serve_tx(&server, chain_tx(&txid(1), PAYLOAD_ISSUANCE, None)).await;
        // Touches the tip address but consumes some other output
        serve_tx(
            &server,
            spending(chain_tx(&txid(2), &serde_json::to_string(&stray).unwrap(), None), &txid(7)),
        )
        .await;
        serve_history(
            &server,
            json!([{"tx_hash": txid(1), "height": 0}, {"tx_hash": txid(2), "height": 0}]),
        )
        .await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        assert!(report.found_issuance);
        assert!(report.latest.is_none());
        assert_eq!(report.hops, 1);
    }

    #[tokio::test]
    async fn test_unknown_issuance_is_empty_report() {
        let server = MockServer::start().await;
        let report = crawler(&server, 100).crawl(&txid(9)).await.unwrap();
        assert!(!report.found_issuance);
        assert!(report.latest.is_none());
    }

    #[tokio::test]
    async fn test_unmarked_transaction_is_not_followed() {
        let server = MockServer::start().await;
        serve_tx(
            &server,
            json!({"txid": txid(1), "vout": [{"n": 0, "scriptPubKey": {"hex": "76a91488ac", "addresses": [ADDRESS]}}]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path(format!("/tx/{}/out/0/spend", txid(1))))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;

        let report = crawler(&server, 100).crawl(&txid(1)).await.unwrap();
        assert!(!report.found_issuance);
        assert_eq!(report.hops, 1);
    }

    #[tokio::test]
    async fn test_first_hop_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(matches!(
            crawler(&server, 100).crawl(&txid(1)).await,
            Err(DidError::UpstreamUnavailable(_))
        ));
    }
}
