/// Chain State Store - per-DID state derived from tracked outputs
use crate::{
    chain::{ChainClient, Outpoint, TrackedOutput},
    did::state::{ChainState, ChainStateRecord, ChainStatus},
    error::DidResult,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Live chain-tip for a DID: the output to spend next plus its state
#[derive(Debug, Clone)]
pub struct ActiveTip {
    pub outpoint: Outpoint,
    pub state: ChainState,
}

/// Read view over the chain-state basket
#[derive(Clone)]
pub struct ChainStateStore {
    chain: Arc<dyn ChainClient>,
    basket: String,
}

impl ChainStateStore {
    pub fn new(chain: Arc<dyn ChainClient>, basket: impl Into<String>) -> Self {
        Self {
            chain,
            basket: basket.into(),
        }
    }

    pub fn basket(&self) -> &str {
        &self.basket
    }

    /// Latest state of every DID, excluding pending issuances
    pub async fn list_all(&self) -> DidResult<Vec<ChainState>> {
        let outputs = self.chain.list_tracked_outputs(&self.basket).await?;
        Ok(latest_per_did(parse_states(outputs)))
    }

    /// Latest state of one DID, whatever its status
    pub async fn find_latest(&self, did: &str) -> DidResult<Option<ChainState>> {
        let outputs = self.chain.list_tracked_outputs(&self.basket).await?;
        let states = parse_states(outputs).into_iter().filter(|s| s.did == did);
        Ok(latest_per_did(states).into_iter().next())
    }

    /// Spendable chain-tip of an active DID
    ///
    /// Returns `None` when the DID is unknown or its latest state is not active.
    pub async fn find_active_tip(&self, did: &str) -> DidResult<Option<ActiveTip>> {
        Ok(self
            .find_latest(did)
            .await?
            .filter(|state| state.status == ChainStatus::Active)
            .map(|state| ActiveTip {
                outpoint: state.current_outpoint.clone(),
                state,
            }))
    }

    /// Tracked output at `outpoint` together with its record, if visible
    pub async fn find_output(
        &self,
        outpoint: &Outpoint,
    ) -> DidResult<Option<(TrackedOutput, ChainStateRecord)>> {
        let outputs = self.chain.list_tracked_outputs(&self.basket).await?;
        Ok(outputs
            .into_iter()
            .find(|o| &o.outpoint == outpoint)
            .and_then(|o| {
                let record = parse_record(&o).ok()?;
                Some((o, record))
            }))
    }
}

/// Why a tracked output was skipped during a scan
#[derive(Debug)]
enum SkipReason {
    NoMetadata,
    Malformed(serde_json::Error),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoMetadata => f.write_str("no metadata"),
            SkipReason::Malformed(e) => write!(f, "malformed metadata: {}", e),
        }
    }
}

fn parse_record(output: &TrackedOutput) -> Result<ChainStateRecord, SkipReason> {
    let metadata = output.metadata.as_deref().ok_or(SkipReason::NoMetadata)?;
    ChainStateRecord::parse(metadata).map_err(SkipReason::Malformed)
}

/// Parse every output, dropping unrelated or pending ones; order is preserved
fn parse_states(outputs: Vec<TrackedOutput>) -> Vec<ChainState> {
    outputs
        .into_iter()
        .filter_map(|output| match parse_record(&output) {
            Ok(record) if record.status == ChainStatus::Pending => None,
            Ok(record) => ChainState::from_record(output.outpoint, record),
            Err(reason) => {
                debug!(outpoint = %output.outpoint, %reason, "skipping tracked output");
                None
            }
        })
        .collect()
}

/// Reduce to one state per DID
///
/// Highest sequence wins; on a tie the later-enumerated output wins. Result
/// keeps first-seen DID order.
fn latest_per_did(states: impl IntoIterator<Item = ChainState>) -> Vec<ChainState> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, ChainState> = HashMap::new();

    for state in states {
        match latest.get(&state.did) {
            Some(current) if current.sequence > state.sequence => {}
            Some(_) => {
                latest.insert(state.did.clone(), state);
            }
            None => {
                order.push(state.did.clone());
                latest.insert(state.did.clone(), state);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|did| latest.remove(&did))
        .collect()
}
