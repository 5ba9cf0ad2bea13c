/// Chain state records attached to tracked outputs
use crate::{chain::Outpoint, did::document::ServiceEndpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a chain-state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    /// Issuance output not yet followed by a document
    Pending,
    Active,
    Deactivated,
}

/// Transition that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "did-issuance")]
    Issuance,
    #[serde(rename = "did-document")]
    Document,
    #[serde(rename = "did-update")]
    Update,
    #[serde(rename = "did-revocation")]
    Revocation,
}

/// JSON metadata persisted on each chain-state output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStateRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    pub identity_code: String,
    pub chain_key_hex: String,
    pub subject_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceEndpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_keys: Vec<String>,
    pub status: ChainStatus,
    /// Transition counter; higher is more recent
    #[serde(default)]
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainStateRecord {
    pub fn parse(metadata: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(metadata)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Next record in the chain, stamped now
    pub fn next(&self, kind: RecordKind, status: ChainStatus) -> Self {
        Self {
            kind,
            status,
            sequence: self.sequence + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Current state of one DID as seen by this wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub did: String,
    pub identity_code: String,
    pub issuance_txid: String,
    pub current_outpoint: Outpoint,
    pub status: ChainStatus,
    pub subject_key: String,
    #[serde(skip_serializing)]
    pub chain_private_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub services: Vec<ServiceEndpoint>,
    pub additional_keys: Vec<String>,
    pub sequence: u64,
}

impl ChainState {
    /// Combine a record with the output carrying it; pending records have no DID yet
    pub fn from_record(outpoint: Outpoint, record: ChainStateRecord) -> Option<Self> {
        let did = record.did?;
        let issuance_txid = record.issuance_txid?;
        Some(Self {
            did,
            identity_code: record.identity_code,
            issuance_txid,
            current_outpoint: outpoint,
            status: record.status,
            subject_key: record.subject_key,
            chain_private_key: record.chain_key_hex,
            created_at: record.created_at,
            updated_at: record.updated_at,
            services: record.services,
            additional_keys: record.additional_keys,
            sequence: record.sequence,
        })
    }

    /// Record for the transition that follows this state
    pub fn successor(&self, kind: RecordKind, status: ChainStatus) -> ChainStateRecord {
        ChainStateRecord {
            kind,
            did: Some(self.did.clone()),
            identity_code: self.identity_code.clone(),
            chain_key_hex: self.chain_private_key.clone(),
            subject_key: self.subject_key.clone(),
            issuance_txid: Some(self.issuance_txid.clone()),
            services: self.services.clone(),
            additional_keys: self.additional_keys.clone(),
            status,
            sequence: self.sequence + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}
