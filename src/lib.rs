//! Refresh orchestration for the environmental-health client.
//!
//! Three feeds are kept cached per location: the raw environmental reading,
//! the personalized score derived from it, and an expensive LLM-generated
//! advisory. The cheap two are refetched on every refresh; the advisory only
//! when the [`detection`] module finds a meaningful change, when it has gone
//! stale, or when the user explicitly asked.
//!
//! Wiring, leaf to root:
//! - [`storage`]: injected key/value JSON persistence (memory, file, SQLite)
//! - [`snapshot::SnapshotStore`]: last captured reading plus advisory refresh time
//! - [`cadence::CadenceTracker`]: "is a routine refresh due?" gate
//! - [`detection::ChangeDetector`]: pure change classification
//! - [`refresh::RefreshOrchestrator`]: runs the cycle

pub mod cadence;
pub mod config;
pub mod detection;
pub mod models;
pub mod refresh;
pub mod snapshot;
pub mod storage;
pub mod utils;

pub use cadence::{CadenceConfig, CadenceTracker, RefreshCadenceState};
pub use config::RefreshConfig;
pub use detection::{detect_changes, ChangeDetector, DetectionThresholds};
pub use models::{
    ChangeDetectionResult, ChangeReason, ChangeType, ChangedField, Coordinates,
    CurrentEnvironmentData, DataSnapshot, DominantDriver, EnvironmentSnapshot, EnvironmentUpdate,
    FieldDeltas, RefreshReason, RefreshResult, RefreshedFeeds, ResolvedLocation,
};
pub use refresh::{
    CurrentDataAccessor, FeedClient, FeedKey, FeedKind, FixedLocation, LocationProvider,
    RefreshOrchestrator, RefreshScheduler,
};
pub use snapshot::SnapshotStore;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, SqliteStore};
pub use utils::init_logging;
