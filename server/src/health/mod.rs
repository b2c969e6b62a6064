//! Provider Health Tracking
//!
//! Process-wide rolling-window success/failure state per provider,
//! consumed by the provider pool and the orchestrator.

mod tracker;
mod types;

pub use tracker::HealthTracker;
pub use types::{HealthStatus, ProviderHealth};
