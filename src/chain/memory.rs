/// In-memory ledger implementing [`ChainClient`] for tests
///
/// Enforces single-spend, verifies chain-tip unlocking signatures against the
/// spent locking script, and can simulate listing lag after a commit.
use super::{
    ChainClient, CreateTransaction, CreatedTransaction, FinalizedTransaction, InputUnlock,
    Outpoint, OutputSpec, Signable, SignableInput, TrackedOutput,
};
use crate::{
    codec::Script,
    error::{DidError, DidResult},
};
use async_trait::async_trait;
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, SigningKey, VerifyingKey},
    SecretKey,
};
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

#[derive(Debug, Clone)]
struct Utxo {
    basket: Option<String>,
    output: TrackedOutput,
}

/// Transaction as committed to the ledger
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub txid: String,
    pub inputs: Vec<Outpoint>,
    pub outputs: Vec<OutputSpec>,
}

#[derive(Default)]
struct Ledger {
    counter: u64,
    utxos: Vec<Utxo>,
    spent: HashSet<Outpoint>,
    pending: HashMap<String, CreateTransaction>,
    transactions: HashMap<String, StoredTransaction>,
    last_txid: Option<String>,
    lagging_listings: u32,
    reject_commits: bool,
}

#[derive(Default)]
pub struct MemoryChain {
    ledger: Mutex<Ledger>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tracked output directly
    pub fn insert_tracked(&self, basket: &str, output: TrackedOutput) {
        self.ledger.lock().unwrap().utxos.push(Utxo {
            basket: Some(basket.to_string()),
            output,
        });
    }

    /// Hide the most recent transaction's outputs from the next `n` listings
    pub fn lag_listings(&self, n: u32) {
        self.ledger.lock().unwrap().lagging_listings = n;
    }

    /// Make every subsequent broadcast fail
    pub fn reject_commits(&self, reject: bool) {
        self.ledger.lock().unwrap().reject_commits = reject;
    }

    pub fn transaction(&self, txid: &str) -> Option<StoredTransaction> {
        self.ledger.lock().unwrap().transactions.get(txid).cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.ledger.lock().unwrap().transactions.len()
    }

    pub fn is_spent(&self, outpoint: &Outpoint) -> bool {
        self.ledger.lock().unwrap().spent.contains(outpoint)
    }

    fn sighash(reference: &str, outpoint: &Outpoint) -> Vec<u8> {
        Sha256::digest(format!("{}:{}", reference, outpoint)).to_vec()
    }

    fn fake_address_script(public_key_hex: &str) -> Script {
        let digest = Sha256::digest(public_key_hex.as_bytes());
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&digest[..20]);
        bytes.extend_from_slice(&[0x88, 0xac]);
        Script::new(bytes)
    }

    fn check_unspent(ledger: &Ledger, request: &CreateTransaction) -> DidResult<()> {
        for input in &request.inputs {
            if ledger.spent.contains(&input.outpoint) {
                return Err(DidError::Chain(format!(
                    "double spend of {}",
                    input.outpoint
                )));
            }
            if !ledger.utxos.iter().any(|u| u.output.outpoint == input.outpoint) {
                return Err(DidError::Chain(format!("unknown input {}", input.outpoint)));
            }
        }
        Ok(())
    }

    fn commit(ledger: &mut Ledger, request: CreateTransaction) -> DidResult<String> {
        if ledger.reject_commits {
            return Err(DidError::Chain("broadcast rejected".to_string()));
        }
        Self::check_unspent(ledger, &request)?;

        ledger.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(ledger.counter.to_le_bytes());
        hasher.update(request.description.as_bytes());
        let txid = hex::encode(hasher.finalize());

        let inputs: Vec<Outpoint> = request.inputs.iter().map(|i| i.outpoint.clone()).collect();
        ledger.utxos.retain(|u| !inputs.contains(&u.output.outpoint));
        ledger.spent.extend(inputs.iter().cloned());

        for (vout, spec) in request.outputs.iter().enumerate() {
            ledger.utxos.push(Utxo {
                basket: spec.basket.clone(),
                output: TrackedOutput {
                    outpoint: Outpoint::new(txid.clone(), vout as u32),
                    script: spec.script.clone(),
                    value: spec.value,
                    tags: spec.tags.clone(),
                    metadata: spec.metadata.clone(),
                },
            });
        }

        ledger.transactions.insert(
            txid.clone(),
            StoredTransaction {
                txid: txid.clone(),
                inputs,
                outputs: request.outputs,
            },
        );
        ledger.last_txid = Some(txid.clone());
        Ok(txid)
    }

    fn verify_unlock(ledger: &Ledger, input: &SignableInput, unlock: &InputUnlock) -> DidResult<()> {
        let bytes = unlock.unlocking_script.as_bytes();
        let sig_len = *bytes.first().ok_or_else(|| DidError::Chain("empty unlock".into()))? as usize;
        let sig = bytes
            .get(1..1 + sig_len)
            .ok_or_else(|| DidError::Chain("truncated signature".into()))?;
        let key = bytes
            .get(2 + sig_len..)
            .ok_or_else(|| DidError::Chain("missing public key".into()))?;

        let signature = Signature::from_der(&sig[..sig.len() - 1])
            .map_err(|e| DidError::Chain(format!("bad signature encoding: {}", e)))?;
        let verifying = VerifyingKey::from_sec1_bytes(key)
            .map_err(|e| DidError::Chain(format!("bad public key: {}", e)))?;
        verifying
            .verify_prehash(&input.sighash, &signature)
            .map_err(|_| DidError::Chain("signature does not verify".into()))?;

        let locking = ledger
            .utxos
            .iter()
            .find(|u| u.output.outpoint == input.outpoint)
            .map(|u| u.output.script.clone())
            .ok_or_else(|| DidError::Chain(format!("input {} already spent", input.outpoint)))?;
        if locking != Self::fake_address_script(&hex::encode(key)) {
            return Err(DidError::Chain("key does not match locking script".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn derive_key(&self, label: &str, for_self: bool) -> DidResult<String> {
        let seed = Sha256::digest(format!("memory-chain:{}:{}", label, for_self));
        let secret = SecretKey::from_slice(&seed)
            .map_err(|e| DidError::Crypto(format!("derivation failed: {}", e)))?;
        let key = SigningKey::from(secret);
        Ok(hex::encode(key.verifying_key().to_encoded_point(true).as_bytes()))
    }

    async fn address_script(&self, public_key_hex: &str) -> DidResult<Script> {
        Ok(Self::fake_address_script(public_key_hex))
    }

    async fn create_transaction(
        &self,
        request: CreateTransaction,
    ) -> DidResult<CreatedTransaction> {
        let mut ledger = self.ledger.lock().unwrap();
        Self::check_unspent(&ledger, &request)?;

        if request.inputs.is_empty() {
            let txid = Self::commit(&mut ledger, request)?;
            return Ok(CreatedTransaction {
                txid: Some(txid),
                raw: Vec::new(),
                signable: None,
            });
        }

        ledger.counter += 1;
        let reference = format!("ref-{}", ledger.counter);
        let inputs = request
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| SignableInput {
                index: i as u32,
                outpoint: input.outpoint.clone(),
                sighash: Self::sighash(&reference, &input.outpoint),
            })
            .collect();
        ledger.pending.insert(reference.clone(), request);

        Ok(CreatedTransaction {
            txid: None,
            raw: Vec::new(),
            signable: Some(Signable { reference, inputs }),
        })
    }

    async fn finish_signing(
        &self,
        signable: Signable,
        unlocks: Vec<InputUnlock>,
    ) -> DidResult<FinalizedTransaction> {
        let mut ledger = self.ledger.lock().unwrap();
        let request = ledger
            .pending
            .remove(&signable.reference)
            .ok_or_else(|| DidError::Chain(format!("unknown reference {}", signable.reference)))?;

        for input in &signable.inputs {
            let unlock = unlocks
                .iter()
                .find(|u| u.index == input.index)
                .ok_or_else(|| DidError::Chain(format!("input {} not unlocked", input.index)))?;
            Self::verify_unlock(&ledger, input, unlock)?;
        }

        let txid = Self::commit(&mut ledger, request)?;
        Ok(FinalizedTransaction {
            txid,
            raw: Vec::new(),
        })
    }

    async fn list_tracked_outputs(&self, basket: &str) -> DidResult<Vec<TrackedOutput>> {
        let mut ledger = self.ledger.lock().unwrap();
        let hidden = if ledger.lagging_listings > 0 {
            ledger.lagging_listings -= 1;
            ledger.last_txid.clone()
        } else {
            None
        };

        Ok(ledger
            .utxos
            .iter()
            .filter(|u| u.basket.as_deref() == Some(basket))
            .filter(|u| hidden.as_deref() != Some(u.output.outpoint.txid.as_str()))
            .map(|u| u.output.clone())
            .collect())
    }
}
