/// DID wallet
///
/// One trait per feature area, both implemented by [`DidWallet`] over a
/// single [`ChainClient`] backend.
use crate::{
    chain::ChainClient,
    did::{
        engine::{CreateDidOptions, UpdateDidOptions},
        ActiveTip, ChainState, DeactivationResult, DidEngine, DidOperationResult, EngineConfig,
    },
    error::DidResult,
    identity::{DidResolver, ResolutionResult, ResolverConfig},
};
use async_trait::async_trait;
use std::sync::Arc;

/// DID lifecycle and resolution
#[async_trait]
pub trait DidOperations: Send + Sync {
    async fn create_did(&self, options: CreateDidOptions) -> DidResult<DidOperationResult>;

    async fn update_did(&self, did: &str, options: UpdateDidOptions)
        -> DidResult<DidOperationResult>;

    async fn deactivate_did(&self, did: &str) -> DidResult<DeactivationResult>;

    /// Resolve through every tier; misses come back as typed errors
    async fn resolve_did(&self, did: &str) -> DidResult<ResolutionResult>;

    /// DIDs owned by this wallet, any status
    async fn list_dids(&self) -> DidResult<Vec<String>>;
}

/// Read access to the wallet's chain state
#[async_trait]
pub trait ChainStateAccess: Send + Sync {
    async fn chain_states(&self) -> DidResult<Vec<ChainState>>;

    async fn active_tip(&self, did: &str) -> DidResult<Option<ActiveTip>>;
}

/// Wallet combining the issuance engine with a resolver backed by its own store
#[derive(Clone)]
pub struct DidWallet {
    engine: DidEngine,
    resolver: DidResolver,
}

impl DidWallet {
    /// The resolver answers for the engine's DID method
    pub fn new(
        chain: Arc<dyn ChainClient>,
        engine_config: EngineConfig,
        mut resolver_config: ResolverConfig,
    ) -> DidResult<Self> {
        resolver_config.method = engine_config.method.clone();

        let engine = DidEngine::new(chain, engine_config);
        let resolver = DidResolver::new(resolver_config, Some(engine.store().clone()))?;

        Ok(Self { engine, resolver })
    }

    pub fn engine(&self) -> &DidEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &DidResolver {
        &self.resolver
    }
}

#[async_trait]
impl DidOperations for DidWallet {
    async fn create_did(&self, options: CreateDidOptions) -> DidResult<DidOperationResult> {
        self.engine.issue(options).await
    }

    async fn update_did(
        &self,
        did: &str,
        options: UpdateDidOptions,
    ) -> DidResult<DidOperationResult> {
        self.engine.update(did, options).await
    }

    async fn deactivate_did(&self, did: &str) -> DidResult<DeactivationResult> {
        self.engine.deactivate(did).await
    }

    async fn resolve_did(&self, did: &str) -> DidResult<ResolutionResult> {
        self.resolver.resolve(did).await?.into_result(did)
    }

    async fn list_dids(&self) -> DidResult<Vec<String>> {
        Ok(self
            .engine
            .store()
            .list_all()
            .await?
            .into_iter()
            .map(|state| state.did)
            .collect())
    }
}

#[async_trait]
impl ChainStateAccess for DidWallet {
    async fn chain_states(&self) -> DidResult<Vec<ChainState>> {
        self.engine.store().list_all().await
    }

    async fn active_tip(&self, did: &str) -> DidResult<Option<ActiveTip>> {
        self.engine.store().find_active_tip(did).await
    }
}
