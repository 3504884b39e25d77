pub mod detection;
pub mod environment;
pub mod location;
pub mod refresh;
pub mod snapshot;

pub use detection::{ChangeDetectionResult, ChangeReason, ChangeType, ChangedField, FieldDeltas};
pub use environment::{
    CurrentEnvironmentData, DominantDriver, EnvironmentSnapshot, EnvironmentUpdate,
};
pub use location::{Coordinates, ResolvedLocation};
pub use refresh::{RefreshReason, RefreshResult, RefreshedFeeds};
pub use snapshot::{DataSnapshot, SNAPSHOT_SCHEMA_VERSION};
