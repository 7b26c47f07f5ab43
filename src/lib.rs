//! Resource Health Monitor Library
//!
//! This library polls source repositories and websites on independent cadences,
//! normalizes what it observes, keeps a rolling uptime window per website,
//! scores health and emits alert events when a resource changes state.

pub mod config;
pub mod detector;
pub mod errors;
pub mod github;
pub mod history;
pub mod models;
pub mod monitor;
pub mod normalizer;
pub mod resource;
pub mod scheduler;
pub mod score;
pub mod website;

pub use config::MonitorConfig;
pub use detector::{PollState, TransitionDetector};
pub use errors::{ErrorKind, MonitorError, Result};
pub use github::RepositoryPoller;
pub use history::UptimeHistory;
pub use models::{
    AlertEvent, AlertKind, HealthGrade, HealthScore, PollReport, RepositorySnapshot,
    ResourceKind, ResourceStatus, Snapshot, TrackedResource, WebsiteMetrics, WebsiteSnapshot,
};
pub use monitor::{Pollers, ResourceMonitor};
pub use resource::{classify, ResourceTarget};
pub use scheduler::{Scheduler, SchedulerStats, SyncSummary};
pub use website::WebsitePoller;
