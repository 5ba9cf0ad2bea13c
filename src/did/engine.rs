/// DID Issuance & Update Engine
///
/// Per DID: `Issued(pending) -> Documented(active) -> Updated(active)* -> Deactivated`.
/// Each transition spends the current chain-tip output with the DID's chain
/// key and publishes a marker output describing the new state.
use crate::{
    chain::{ChainClient, CreateTransaction, InputSpec, InputUnlock, Outpoint, OutputSpec},
    codec::{self, Script, PAYLOAD_ISSUANCE, PAYLOAD_REVOCATION},
    crypto::keys::{validate_public_key_hex, ChainKey},
    did::{
        document::{merge_keys, merge_services, DidDocument, DidDocumentBuilder, ServiceEndpoint},
        state::{ChainStateRecord, ChainStatus, RecordKind},
        store::ChainStateStore,
        DeactivationResult, Did, DidOperationResult,
    },
    error::{DidError, DidResult},
    metrics,
    retry::{retry_until, RetryPolicy},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError},
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Satoshis locked in each chain-tip output
const CHAIN_TIP_VALUE: u64 = 1;

/// Upper bound of a `<sig> <pubkey>` unlocking script
const UNLOCKING_SCRIPT_LENGTH: usize = 108;

/// Key derivation label prefix for DID subject keys
const SUBJECT_KEY_LABEL: &str = "did-subject";

/// Key derivation label for the identity's own key
const IDENTITY_KEY_LABEL: &str = "identity";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub method: String,
    pub basket: String,
    /// Wait for the issuance output before the document transaction spends it
    pub visibility: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            method: "bsv".to_string(),
            basket: "did-chain".to_string(),
            visibility: RetryPolicy::default(),
        }
    }
}

/// Options for a new DID
#[derive(Debug, Clone, Default)]
pub struct CreateDidOptions {
    pub services: Vec<ServiceEndpoint>,
}

/// Changes merged into a DID on update
#[derive(Debug, Clone, Default)]
pub struct UpdateDidOptions {
    pub services: Vec<ServiceEndpoint>,
    pub additional_keys: Vec<String>,
}

/// Issues, updates and deactivates chain-linked DIDs
#[derive(Clone)]
pub struct DidEngine {
    chain: Arc<dyn ChainClient>,
    store: ChainStateStore,
    config: EngineConfig,
    locks: LockTable,
}

/// Per-DID async locks; the table itself is only held for map edits
type LockTable = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Held per-DID lock
///
/// Removes its table entry on drop when no other task holds or awaits it.
struct DidLockGuard {
    did: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DidLockGuard {
    fn drop(&mut self) {
        // Release before counting so only the table and waiters remain
        self.guard.take();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(&self.did)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.did);
        }
    }
}

impl DidEngine {
    pub fn new(chain: Arc<dyn ChainClient>, config: EngineConfig) -> Self {
        let store = ChainStateStore::new(Arc::clone(&chain), config.basket.clone());
        Self {
            chain,
            store,
            config,
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &ChainStateStore {
        &self.store
    }

    /// Issue a new DID
    ///
    /// Publishes the issuance transaction, waits for its chain-tip output to
    /// become visible, then spends it with the first document transaction.
    pub async fn issue(&self, options: CreateDidOptions) -> DidResult<DidOperationResult> {
        let result = self.issue_inner(options).await;
        metrics::record_chain_operation("issue", result.is_ok());
        result
    }

    async fn issue_inner(&self, options: CreateDidOptions) -> DidResult<DidOperationResult> {
        let chain_key = ChainKey::generate();
        let identity_code = chain_key.identity_code();

        let subject_key = self
            .chain
            .derive_key(&format!("{}:{}", SUBJECT_KEY_LABEL, identity_code), true)
            .await?;
        validate_public_key_hex(&subject_key)
            .map_err(|e| DidError::Chain(format!("Derived subject key unusable: {}", e)))?;

        let tip_script = self.chain.address_script(&chain_key.public_key_hex()).await?;

        let now = Utc::now();
        let pending = ChainStateRecord {
            kind: RecordKind::Issuance,
            did: None,
            identity_code: identity_code.clone(),
            chain_key_hex: chain_key.private_key_hex(),
            subject_key: subject_key.clone(),
            issuance_txid: None,
            services: options.services.clone(),
            additional_keys: Vec::new(),
            status: ChainStatus::Pending,
            sequence: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .chain
            .create_transaction(CreateTransaction {
                description: "Issue DID".to_string(),
                outputs: vec![
                    self.tip_output(tip_script.clone(), &pending)?,
                    marker_output(&identity_code, PAYLOAD_ISSUANCE),
                ],
                inputs: Vec::new(),
            })
            .await?;
        let issuance_txid = created
            .txid
            .ok_or_else(|| DidError::Chain("Issuance transaction was not finalized".to_string()))?;

        let did = Did::from_txid(&self.config.method, &issuance_txid).to_string();
        info!(%did, "issued DID, publishing document");

        let issuance_outpoint = Outpoint::new(issuance_txid.clone(), 0);
        let (_, pending) = self.wait_for_output(&issuance_outpoint).await?;

        let _guard = self.lock_did(&did).await;

        let document = DidDocumentBuilder::new()
            .did(&did)
            .subject_key(&subject_key)
            .services(options.services)
            .build()?;

        let mut record = pending.next(RecordKind::Document, ChainStatus::Active);
        record.did = Some(did.clone());
        record.issuance_txid = Some(issuance_txid);

        let txid = self
            .publish_document(&issuance_outpoint, &chain_key, tip_script, &record, &document)
            .await?;

        Ok(DidOperationResult {
            did,
            txid,
            identity_code,
            document,
        })
    }

    /// Publish a new document for an active DID
    pub async fn update(
        &self,
        did: &str,
        options: UpdateDidOptions,
    ) -> DidResult<DidOperationResult> {
        let result = self.update_inner(did, options).await;
        metrics::record_chain_operation("update", result.is_ok());
        result
    }

    async fn update_inner(
        &self,
        did: &str,
        options: UpdateDidOptions,
    ) -> DidResult<DidOperationResult> {
        Did::parse(did, &self.config.method)?;
        for key in &options.additional_keys {
            validate_public_key_hex(key)
                .map_err(|e| DidError::Validation(format!("Additional key {}: {}", key, e)))?;
        }

        let _guard = self.lock_did(did).await;

        let tip = self
            .store
            .find_active_tip(did)
            .await?
            .ok_or_else(|| DidError::ChainStateNotFound(did.to_string()))?;

        let mut record = tip.state.successor(RecordKind::Update, ChainStatus::Active);
        record.services = merge_services(&tip.state.services, options.services);
        record.additional_keys = merge_keys(&tip.state.additional_keys, options.additional_keys);

        let document = DidDocumentBuilder::new()
            .did(did)
            .subject_key(&record.subject_key)
            .services(record.services.clone())
            .additional_keys(record.additional_keys.clone())
            .build()?;

        let chain_key = ChainKey::from_hex(&tip.state.chain_private_key)?;
        let tip_script = self.chain.address_script(&chain_key.public_key_hex()).await?;

        let txid = self
            .publish_document(&tip.outpoint, &chain_key, tip_script, &record, &document)
            .await?;
        info!(%did, %txid, sequence = record.sequence, "updated DID");

        Ok(DidOperationResult {
            did: did.to_string(),
            txid,
            identity_code: tip.state.identity_code,
            document,
        })
    }

    /// Terminate a DID's chain
    ///
    /// The chain-tip is spent into a revocation marker and a bookkeeping output
    /// locked to the identity key; no further chain-tip exists afterwards.
    pub async fn deactivate(&self, did: &str) -> DidResult<DeactivationResult> {
        let result = self.deactivate_inner(did).await;
        metrics::record_chain_operation("deactivate", result.is_ok());
        result
    }

    async fn deactivate_inner(&self, did: &str) -> DidResult<DeactivationResult> {
        Did::parse(did, &self.config.method)?;

        let _guard = self.lock_did(did).await;

        let tip = self
            .store
            .find_active_tip(did)
            .await?
            .ok_or_else(|| DidError::ChainStateNotFound(did.to_string()))?;

        let record = tip
            .state
            .successor(RecordKind::Revocation, ChainStatus::Deactivated);
        let identity_key = self.chain.derive_key(IDENTITY_KEY_LABEL, true).await?;
        let bookkeeping_script = self.chain.address_script(&identity_key).await?;

        let outputs = vec![
            marker_output(&record.identity_code, PAYLOAD_REVOCATION),
            OutputSpec {
                script: bookkeeping_script,
                value: CHAIN_TIP_VALUE,
                basket: Some(self.config.basket.clone()),
                tags: vec![kind_tag(record.kind).to_string()],
                metadata: Some(record.to_json()?),
                description: "DID revocation record".to_string(),
            },
        ];

        let chain_key = ChainKey::from_hex(&tip.state.chain_private_key)?;
        let txid = self
            .spend_tip(&tip.outpoint, &chain_key, outputs, "Deactivate DID")
            .await?;
        info!(%did, %txid, "deactivated DID");

        Ok(DeactivationResult { txid })
    }

    async fn wait_for_output(
        &self,
        outpoint: &Outpoint,
    ) -> DidResult<(crate::chain::TrackedOutput, ChainStateRecord)> {
        let policy = self.config.visibility;
        let store = self.store.clone();

        retry_until(policy, || {
            let store = store.clone();
            let outpoint = outpoint.clone();
            async move { store.find_output(&outpoint).await }
        })
        .await
        .ok_or_else(|| DidError::PropagationTimeout {
            outpoint: outpoint.to_string(),
            attempts: policy.attempts,
        })
    }

    async fn publish_document(
        &self,
        tip: &Outpoint,
        chain_key: &ChainKey,
        tip_script: Script,
        record: &ChainStateRecord,
        document: &DidDocument,
    ) -> DidResult<String> {
        let payload = serde_json::to_string(document)?;
        let outputs = vec![
            self.tip_output(tip_script, record)?,
            marker_output(&record.identity_code, &payload),
        ];
        self.spend_tip(tip, chain_key, outputs, "Publish DID document")
            .await
    }

    /// Spend a chain-tip into `outputs`
    ///
    /// Either the whole transaction is broadcast or nothing changes; the
    /// ledger rejects a second spend of the same tip.
    async fn spend_tip(
        &self,
        tip: &Outpoint,
        chain_key: &ChainKey,
        outputs: Vec<OutputSpec>,
        description: &str,
    ) -> DidResult<String> {
        let tracked = self.chain.list_tracked_outputs(&self.config.basket).await?;
        if !tracked.iter().any(|o| &o.outpoint == tip) {
            return Err(DidError::Chain(format!(
                "Chain tip {} is no longer unspent",
                tip
            )));
        }

        let created = self
            .chain
            .create_transaction(CreateTransaction {
                description: description.to_string(),
                outputs,
                inputs: vec![InputSpec {
                    outpoint: tip.clone(),
                    unlocking_script_length: UNLOCKING_SCRIPT_LENGTH,
                    description: "DID chain tip".to_string(),
                }],
            })
            .await?;

        let signable = created.signable.ok_or_else(|| {
            DidError::Chain("Wallet returned no signable transaction for chain-tip spend".to_string())
        })?;

        let unlocks = signable
            .inputs
            .iter()
            .filter(|input| &input.outpoint == tip)
            .map(|input| {
                Ok(InputUnlock {
                    index: input.index,
                    unlocking_script: chain_key.unlocking_script(&input.sighash)?,
                })
            })
            .collect::<DidResult<Vec<_>>>()?;
        if unlocks.is_empty() {
            return Err(DidError::Chain(format!(
                "Chain tip {} missing from signable inputs",
                tip
            )));
        }

        let finalized = self.chain.finish_signing(signable, unlocks).await?;
        debug!(%tip, txid = %finalized.txid, "spent chain tip");
        Ok(finalized.txid)
    }

    fn tip_output(&self, script: Script, record: &ChainStateRecord) -> DidResult<OutputSpec> {
        Ok(OutputSpec {
            script,
            value: CHAIN_TIP_VALUE,
            basket: Some(self.config.basket.clone()),
            tags: vec![kind_tag(record.kind).to_string()],
            metadata: Some(record.to_json()?),
            description: "DID chain tip".to_string(),
        })
    }

    /// Serialize read-tip -> build -> submit per DID within this process
    async fn lock_did(&self, did: &str) -> DidLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(did.to_string()).or_default())
        };
        DidLockGuard {
            did: did.to_string(),
            table: Arc::clone(&self.locks),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn marker_output(identity_code: &str, payload: &str) -> OutputSpec {
    OutputSpec {
        script: codec::encode(identity_code, payload),
        value: 0,
        basket: None,
        tags: Vec::new(),
        metadata: None,
        description: "DID chain link".to_string(),
    }
}

fn kind_tag(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Issuance => "did-issuance",
        RecordKind::Document => "did-document",
        RecordKind::Update => "did-update",
        RecordKind::Revocation => "did-revocation",
    }
}
