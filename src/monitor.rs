//! Per-resource poll path: single-flight guard, history, scoring and detection

use crate::config::MonitorConfig;
use crate::detector::{PollState, TransitionDetector};
use crate::errors::{MonitorError, Result};
use crate::github::RepositoryPoller;
use crate::history::UptimeHistory;
use crate::models::{
    AlertDetail, AlertEvent, PollReport, ResourceId, ResourceStatus, Snapshot, TrackedResource,
    UptimeHistoryEntry, WebsiteSnapshot,
};
use crate::resource::{target_for, ResourceTarget};
use crate::score::{score_repository, score_website};
use crate::website::WebsitePoller;

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// HTTP clients shared by every monitored resource
#[derive(Debug, Clone)]
pub struct Pollers {
    pub website: Arc<WebsitePoller>,
    pub repository: Arc<RepositoryPoller>,
}

impl Pollers {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        Ok(Self {
            website: Arc::new(WebsitePoller::new(config)?),
            repository: Arc::new(RepositoryPoller::new(config)?),
        })
    }
}

#[derive(Debug)]
struct MonitorState {
    poll: PollState,
    history: UptimeHistory,
}

/// Clears the in-flight flag however the poll ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything one tracked resource owns. Only its own poll path touches the state.
///
/// The registry may change the resource's name or notification flag while it
/// is tracked; those edits land in place through [`ResourceMonitor::refresh`]
/// and never reset the history or the detector state.
#[derive(Debug)]
pub struct ResourceMonitor {
    id: ResourceId,
    target: ResourceTarget,
    resource: RwLock<TrackedResource>,
    pollers: Pollers,
    detector: TransitionDetector,
    in_flight: AtomicBool,
    retired: AtomicBool,
    state: Mutex<MonitorState>,
}

impl ResourceMonitor {
    /// Fails with `ValidationFailure` when the resource URL cannot be polled
    pub fn new(resource: TrackedResource, pollers: Pollers, config: &MonitorConfig) -> Result<Self> {
        let target = target_for(&resource)?;

        Ok(Self {
            id: resource.id,
            target,
            resource: RwLock::new(resource),
            pollers,
            detector: TransitionDetector::from_config(config),
            in_flight: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            state: Mutex::new(MonitorState {
                poll: PollState::default(),
                history: UptimeHistory::new(config.history_capacity, config.history_sample_interval),
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn target(&self) -> &ResourceTarget {
        &self.target
    }

    /// Current definition of the resource
    pub async fn resource(&self) -> TrackedResource {
        self.resource.read().await.clone()
    }

    /// Whether `resource` still points at what this monitor polls
    pub fn polls_same_target(&self, resource: &TrackedResource) -> bool {
        resource.id == self.id && target_for(resource).is_ok_and(|target| target == self.target)
    }

    /// Swap in a newer definition of the same target. Returns whether anything changed.
    pub async fn refresh(&self, resource: TrackedResource) -> bool {
        if !self.polls_same_target(&resource) {
            return false;
        }

        let mut current = self.resource.write().await;
        if *current == resource {
            return false;
        }

        debug!("Refreshed definition of {}", resource.url);
        *current = resource;
        true
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Results of polls still running after this are discarded
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Run one poll unless one is already running.
    ///
    /// Returns `None` when the tick was skipped by the single-flight guard or
    /// when the resource was retired while the poll was outstanding.
    #[instrument(skip(self), fields(resource_id = %self.id))]
    pub async fn poll_once(&self) -> Option<PollReport> {
        if self.is_retired() {
            return None;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous poll still in flight, skipping tick");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let report = match &self.target {
            ResourceTarget::Website { url } => self.poll_website(url).await,
            ResourceTarget::Repository { owner, repo } => self.poll_repository(owner, repo).await,
        };

        if self.is_retired() {
            debug!("Resource untracked during poll, discarding result");
            return None;
        }

        Some(report)
    }

    async fn poll_website(&self, url: &str) -> PollReport {
        let probe = match self.pollers.website.poll(url).await {
            Ok(probe) => probe,
            Err(e) => return self.failure_report(e).await,
        };

        let (snapshot, alerts) = {
            let mut state = self.state.lock().await;
            state.history.record(UptimeHistoryEntry::from_metrics(&probe.metrics));
            let alerts = self.detector.evaluate_website(&mut state.poll, &probe.metrics);

            let snapshot = WebsiteSnapshot {
                metrics: probe.metrics,
                performance: probe.performance,
                uptime_history: state.history.to_vec(),
                uptime_percentage: state.history.uptime_percentage(),
                avg_response_time: state.history.avg_response_time(),
            };
            (snapshot, alerts)
        };

        let health_score = score_website(&snapshot);
        debug!(
            "Website {} is {} (score {}, uptime {:.2}%)",
            url, snapshot.metrics.status, health_score.score, snapshot.uptime_percentage
        );

        let resource = self.resource().await;
        PollReport {
            resource_id: self.id,
            resource_name: resource.name.clone(),
            kind: resource.kind,
            observed_status: snapshot.metrics.status,
            last_updated: snapshot.metrics.last_checked,
            snapshot: Some(Snapshot::Website(snapshot)),
            health_score: Some(health_score),
            error: None,
            error_kind: None,
            alerts: gate(&resource, alerts),
        }
    }

    async fn poll_repository(&self, owner: &str, repo: &str) -> PollReport {
        let snapshot = match self.pollers.repository.poll(owner, repo).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.failure_report(e).await,
        };

        let alerts = {
            let mut state = self.state.lock().await;
            self.detector
                .evaluate_repository(&mut state.poll, &snapshot.workflow_runs)
        };

        let health_score = score_repository(&snapshot);
        if !snapshot.unavailable.is_empty() {
            info!(
                "Repository {}/{} scored with {} section(s) unavailable",
                owner,
                repo,
                snapshot.unavailable.len()
            );
        }

        let resource = self.resource().await;
        PollReport {
            resource_id: self.id,
            resource_name: resource.name.clone(),
            kind: resource.kind,
            observed_status: ResourceStatus::Up,
            snapshot: Some(Snapshot::Repository(snapshot)),
            health_score: Some(health_score),
            last_updated: Utc::now(),
            error: None,
            error_kind: None,
            alerts: gate(&resource, alerts),
        }
    }

    /// Poll-level failure: no snapshot and no score. History and state stay intact.
    async fn failure_report(&self, error: MonitorError) -> PollReport {
        let resource = self.resource().await;
        warn!("Poll of {} failed: {}", resource.url, error);

        PollReport {
            resource_id: self.id,
            resource_name: resource.name,
            kind: resource.kind,
            observed_status: ResourceStatus::Down,
            snapshot: None,
            health_score: None,
            last_updated: Utc::now(),
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            alerts: Vec::new(),
        }
    }

    /// Copy of the uptime window, oldest first
    pub async fn history(&self) -> Vec<UptimeHistoryEntry> {
        self.state.lock().await.history.to_vec()
    }

    pub async fn poll_state(&self) -> PollState {
        self.state.lock().await.poll.clone()
    }
}

fn gate(resource: &TrackedResource, alerts: Vec<AlertDetail>) -> Vec<AlertEvent> {
    if !resource.notifications_enabled {
        if !alerts.is_empty() {
            debug!("Notifications disabled, suppressing {} alert(s)", alerts.len());
        }
        return Vec::new();
    }

    alerts
        .into_iter()
        .map(|detail| AlertEvent::new(resource, detail))
        .collect()
}
