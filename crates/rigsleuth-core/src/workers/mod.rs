/// Category workers.
///
/// One worker per information category, each on its own named thread.
/// Workers publish field by field through a [`Publisher`], so observers
/// see partial results as soon as a probe chain resolves. On success the
/// category's completion flag is set; on failure the flag stays unset and
/// the error text lands in the category's error key.
pub mod basic;
pub mod hardware;
pub mod health;
pub mod network;
pub mod storage;

use crate::error::WorkerError;
use crate::observer::ObserverRegistry;
use crate::platform::HostEnv;
use crate::snapshot::{InfoKey, InfoUpdate, InfoValue, SnapshotStore};

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{info, warn};

/// Information categories, each gathered by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Basic,
    Hardware,
    Drives,
    Network,
    Health,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Basic,
        Category::Hardware,
        Category::Drives,
        Category::Network,
        Category::Health,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Hardware => "hardware",
            Self::Drives => "drives",
            Self::Network => "network",
            Self::Health => "health",
        }
    }

    pub fn completion_flag(self) -> InfoKey {
        match self {
            Self::Basic => InfoKey::BasicInfoLoaded,
            Self::Hardware => InfoKey::HardwareInfoLoaded,
            Self::Drives => InfoKey::DrivesScanComplete,
            Self::Network => InfoKey::NetworkInfoLoaded,
            Self::Health => InfoKey::HealthMetricsLoaded,
        }
    }

    pub fn error_key(self) -> InfoKey {
        match self {
            Self::Basic => InfoKey::BasicInfoError,
            Self::Hardware => InfoKey::HardwareInfoError,
            Self::Drives => InfoKey::DrivesError,
            Self::Network => InfoKey::NetworkInfoError,
            Self::Health => InfoKey::HealthMetricsError,
        }
    }

    pub fn thread_name(self) -> String {
        format!("rigsleuth-{}", self.name())
    }

    pub fn failure(self, message: impl Into<String>) -> WorkerError {
        WorkerError::Failed {
            category: self.name(),
            message: message.into(),
        }
    }
}

/// Writes into the snapshot store, then notifies observers.
#[derive(Debug, Clone)]
pub struct Publisher {
    store: SnapshotStore,
    observers: ObserverRegistry,
    generation: u64,
}

impl Publisher {
    pub fn new(store: SnapshotStore, observers: ObserverRegistry) -> Self {
        let generation = store.generation();
        Self {
            store,
            observers,
            generation,
        }
    }

    pub fn publish(&self, key: InfoKey, value: InfoValue) {
        let update = InfoUpdate {
            generation: self.generation,
            key,
            value,
        };
        if self.store.apply(key, update.value.clone()) {
            self.observers.publish(&update);
        }
    }

    pub fn text(&self, key: InfoKey, value: impl Into<String>) {
        self.publish(key, InfoValue::Text(value.into()));
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}

fn run_body(category: Category, host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    match category {
        Category::Basic => basic::run(host, out),
        Category::Hardware => hardware::run(host, out),
        Category::Drives => storage::run(host, out),
        Category::Network => network::run(host, out),
        Category::Health => health::run(host, out),
    }
}

/// Run one category to completion on the current thread.
pub fn run_category(category: Category, host: &HostEnv, out: &Publisher) {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_body(category, host, out)))
        .unwrap_or_else(|_| Err(category.failure("worker panicked")));

    match result {
        Ok(()) => {
            out.publish(category.completion_flag(), InfoValue::Flag(true));
            info!("{} info gathered in {:?}", category.name(), started.elapsed());
        }
        Err(e) => {
            warn!("{e}");
            out.text(category.error_key(), e.to_string());
        }
    }
}
