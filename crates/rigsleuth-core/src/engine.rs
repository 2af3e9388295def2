/// Orchestrator: the engine's entry point.
///
/// [`Engine::gather`] never blocks on probing. It either returns the cached
/// snapshot (no workers started) or creates a fresh [`SnapshotStore`],
/// replaces the cache entry with it, starts one named thread per
/// [`Category`], and returns immediately. Callers watch the store fill in
/// through the [`ObserverRegistry`] or by waiting on completion flags.
///
/// There is no cancellation. A forced refresh while workers are still
/// running starts a new generation; the superseded workers finish and
/// publish into their own store, and their updates carry the old
/// generation number.
use crate::cache::CacheManager;
use crate::config::EngineConfig;
use crate::observer::{Handler, ObserverRegistry, SubscriptionToken};
use crate::platform::{is_elevated, HostEnv};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::workers::{run_category, Category, Publisher};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of one [`Engine::gather`] call.
#[derive(Debug, Clone)]
pub struct GatherHandle {
    /// The snapshot, still being written to unless `from_cache` is set and
    /// the cached gather had already completed.
    pub store: SnapshotStore,
    pub from_cache: bool,
    /// Category workers started by this call.
    pub workers_started: usize,
    pub generation: u64,
}

impl GatherHandle {
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Block until every category has completed or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.store.wait_until_complete(timeout)
    }
}

pub struct Engine {
    config: EngineConfig,
    host: HostEnv,
    cache: CacheManager,
    observers: ObserverRegistry,
    workers_spawned: AtomicUsize,
    generation: AtomicU64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine probing the local machine.
    pub fn new(config: EngineConfig) -> Self {
        let host = HostEnv::from_config(&config);
        Self::with_host(config, host)
    }

    /// Engine probing an arbitrary [`HostEnv`].
    pub fn with_host(config: EngineConfig, host: HostEnv) -> Self {
        Self {
            cache: CacheManager::new(config.cache_ttl),
            config,
            host,
            observers: ObserverRegistry::new(),
            workers_spawned: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &HostEnv {
        &self.host
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn subscribe(&self, handler: Handler) -> SubscriptionToken {
        self.observers.subscribe(handler)
    }

    pub fn unsubscribe(&self, handler: &Handler) {
        self.observers.unsubscribe(handler);
    }

    /// Total category workers started over the engine's lifetime.
    pub fn workers_spawned(&self) -> usize {
        self.workers_spawned.load(Ordering::SeqCst)
    }

    /// Return the cached snapshot, or start a new gather.
    ///
    /// A cache hit on a completed gather returns a detached copy. A hit on
    /// a gather that is still running shares its live store so the caller
    /// still sees it complete.
    pub fn gather(&self, force_refresh: bool) -> GatherHandle {
        let now = Instant::now();
        self.cache.with_lock(|slot| {
            if !force_refresh {
                if let Some(cached) = slot.fresh(now) {
                    let generation = cached.generation();
                    info!("Using cached snapshot (generation {generation})");
                    let store = if cached.is_complete() {
                        cached.detached()
                    } else {
                        cached
                    };
                    return GatherHandle {
                        store,
                        from_cache: true,
                        workers_started: 0,
                        generation,
                    };
                }
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                "Starting gather {generation} (forced: {force_refresh}, elevated: {})",
                is_elevated()
            );
            let store = SnapshotStore::new(generation);
            slot.replace(store.clone(), now);
            let workers_started = self.spawn_workers(&store);

            GatherHandle {
                store,
                from_cache: false,
                workers_started,
                generation,
            }
        })
    }

    fn spawn_workers(&self, store: &SnapshotStore) -> usize {
        let mut started = 0;
        for category in Category::ALL {
            let host = self.host.clone();
            let publisher = Publisher::new(store.clone(), self.observers.clone());
            let fallback = publisher.clone();

            let spawned = thread::Builder::new()
                .name(category.thread_name())
                .spawn(move || run_category(category, &host, &publisher));
            match spawned {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!("Failed to start {} worker: {e}", category.name());
                    fallback.text(category.error_key(), format!("worker thread failed to start: {e}"));
                }
            }
        }
        self.workers_spawned.fetch_add(started, Ordering::SeqCst);
        started
    }
}
