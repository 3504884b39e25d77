pub mod feeds;
pub mod inflight;
pub mod orchestrator;
pub mod scheduler;

pub use feeds::{
    CurrentDataAccessor, FeedClient, FeedKey, FeedKind, FixedLocation, LocationProvider,
};
pub use orchestrator::RefreshOrchestrator;
pub use scheduler::RefreshScheduler;
