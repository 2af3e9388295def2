/// RigSleuth Core: best-effort hardware inference for repair benches.
///
/// This crate contains all probing and inference logic with zero UI
/// dependencies. Every attribute degrades to "Unknown" rather than failing,
/// so it works unprivileged, in containers, and on stripped-down images.
///
/// # Modules
///
/// - [`probe`]: Probes and priority-ordered probe chains.
/// - [`evidence`]: Weighted RAM upgradability scorer and classifier.
/// - [`drives`]: Physical drive enumeration and classification.
/// - [`snapshot`]: The gathered result and its shared store.
/// - [`observer`]: Progressive-update subscriptions.
/// - [`cache`]: Time-to-live cache for the last gather.
/// - [`workers`]: One background worker per information category.
/// - [`engine`]: The orchestrator tying the above together.
/// - [`report`]: Technician text report and saved report bundle.
/// - [`platform`]: Host environment, command runner, privilege checks.
pub mod cache;
pub mod config;
pub mod drives;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod observer;
pub mod platform;
pub mod probe;
pub mod report;
pub mod snapshot;
pub mod workers;

pub use config::EngineConfig;
pub use engine::{Engine, GatherHandle};
