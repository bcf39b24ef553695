//! `AppState`: the handful of long-lived collaborators every handler
//! needs, assembled once in `main` and cloned (cheaply, via `Arc`) into
//! each request.

use std::sync::Arc;

use latchflow_authz::{CompiledRuleCache, RateLimiter};
use latchflow_crypto::MasterKey;
use latchflow_history::{ChangeLogStore, MemoryChangeLogStore};
use latchflow_plugins::PluginRegistry;
use latchflow_queue::{MemoryWorkQueue, WorkQueue};
use latchflow_storage::{MemoryStorageService, RebuildScheduler, StorageService};

use crate::config::Config;
use crate::runtime_adapters::{InMemoryInvocations, StoreTriggers};
use crate::store::{memory::MemoryStore, Store};

type Builder = Box<
    dyn Fn(String, bool) -> futures::future::BoxFuture<'static, latchflow_storage::RebuildOutcome>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub change_log: Arc<dyn ChangeLogStore>,
    pub storage: Arc<dyn StorageService>,
    pub queue: Arc<dyn WorkQueue>,
    pub plugins: Arc<PluginRegistry>,
    pub triggers: Arc<StoreTriggers>,
    pub invocations: Arc<InMemoryInvocations>,
    pub rule_cache: Arc<CompiledRuleCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub master_key: Option<MasterKey>,
    pub rebuild_scheduler: Arc<RebuildScheduler<Builder>>,
    /// Plaintext device-code API tokens, cached only for the short
    /// approval-to-poll window (§4.18 "never persisted in plaintext").
    pub device_token_cache: Arc<dashmap::DashMap<String, String>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let change_log: Arc<dyn ChangeLogStore> = Arc::new(MemoryChangeLogStore::new());
        let storage: Arc<dyn StorageService> = Arc::new(MemoryStorageService::default());
        let queue: Arc<dyn WorkQueue> = Arc::new(MemoryWorkQueue::new());
        let plugins = Arc::new(PluginRegistry::new());
        let triggers = Arc::new(StoreTriggers::new(Arc::clone(&store)));
        let invocations = Arc::new(InMemoryInvocations::new());
        let rule_cache = Arc::new(CompiledRuleCache::new());
        let rate_limiter = Arc::new(RateLimiter::new());

        let master_key = config
            .encryption_master_key_b64
            .as_deref()
            .map(latchflow_crypto::parse_master_key)
            .transpose()
            .unwrap_or(None);

        let build_storage = Arc::clone(&storage);
        let build_store = Arc::clone(&store);
        let builder: Builder = Box::new(move |bundle_id: String, force: bool| {
            let storage = Arc::clone(&build_storage);
            let store = Arc::clone(&build_store);
            Box::pin(async move { rebuild_one(store, storage, bundle_id, force).await })
        });
        let rebuild_scheduler = Arc::new(RebuildScheduler::new(builder));

        Self {
            config,
            store,
            change_log,
            storage,
            queue,
            plugins,
            triggers,
            invocations,
            rule_cache,
            rate_limiter,
            master_key,
            rebuild_scheduler,
            device_token_cache: Arc::new(dashmap::DashMap::new()),
        }
    }
}

async fn rebuild_one(
    store: Arc<dyn Store>,
    storage: Arc<dyn StorageService>,
    bundle_id: String,
    force: bool,
) -> latchflow_storage::RebuildOutcome {
    match crate::bundles::rebuild_bundle(&*store, &*storage, &bundle_id, force).await {
        Ok(latchflow_storage::BuildOutcome::Built(_)) => latchflow_storage::RebuildOutcome::Built,
        Ok(latchflow_storage::BuildOutcome::SkippedUnchanged) => latchflow_storage::RebuildOutcome::Skipped,
        Err(e) => latchflow_storage::RebuildOutcome::Failed(e.to_string()),
    }
}
