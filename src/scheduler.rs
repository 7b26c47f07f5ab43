//! Poll scheduler orchestrating one independent timer per tracked resource

use crate::config::MonitorConfig;
use crate::errors::{MonitorError, Result};
use crate::models::{PollReport, ResourceId, ResourceKind, TrackedResource};
use crate::monitor::{Pollers, ResourceMonitor};

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Capacity of the report channel handed to the consumer
pub const REPORT_CHANNEL_CAPACITY: usize = 256;

/// A running resource: its monitor and the timer task driving it
struct TrackedHandle {
    monitor: Arc<ResourceMonitor>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Counters {
    polls_completed: AtomicU64,
    polls_skipped: AtomicU64,
    alerts_emitted: AtomicU64,
}

/// Scheduler statistics
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    pub tracked: usize,
    pub polls_completed: u64,
    pub polls_skipped: u64,
    pub alerts_emitted: u64,
}

/// Outcome of reconciling against the registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub tracked: Vec<ResourceId>,
    pub refreshed: Vec<ResourceId>,
    pub untracked: Vec<ResourceId>,
    pub rejected: Vec<ResourceId>,
}

/// Polls every tracked resource on its own cadence and publishes reports
pub struct Scheduler {
    config: MonitorConfig,
    pollers: Pollers,
    tracked: Arc<RwLock<HashMap<ResourceId, TrackedHandle>>>,
    reports: mpsc::Sender<PollReport>,
    counters: Arc<Counters>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its report stream
    pub fn new(config: MonitorConfig) -> Result<(Self, mpsc::Receiver<PollReport>)> {
        config.validate().map_err(MonitorError::Config)?;

        let pollers = Pollers::new(&config)?;
        let (reports, receiver) = mpsc::channel(REPORT_CHANNEL_CAPACITY);

        let scheduler = Self {
            config,
            pollers,
            tracked: Arc::new(RwLock::new(HashMap::new())),
            reports,
            counters: Arc::new(Counters::default()),
        };

        Ok((scheduler, receiver))
    }

    /// Start polling a resource. Tracking an id twice is a no-op.
    #[instrument(skip(self, resource), fields(resource = %resource.name))]
    pub async fn track(&self, resource: TrackedResource) -> Result<ResourceId> {
        let id = resource.id;
        let mut tracked = self.tracked.write().await;
        if tracked.contains_key(&id) {
            debug!("Resource {} already tracked", id);
            return Ok(id);
        }

        let period = self.period_for(resource.kind);
        let (kind, url) = (resource.kind, resource.url.clone());
        let monitor = Arc::new(ResourceMonitor::new(resource, self.pollers.clone(), &self.config)?);

        let task = tokio::spawn(run_resource(
            Arc::clone(&monitor),
            period,
            self.config.start_jitter,
            self.reports.clone(),
            Arc::clone(&self.counters),
        ));

        info!("Tracking {} {} every {:?}", kind, url, period);
        tracked.insert(id, TrackedHandle { monitor, task });

        Ok(id)
    }

    /// Stop polling a resource. An in-flight poll finishes but its result is
    /// dropped; the resource state goes away with the last outstanding poll.
    pub async fn untrack(&self, id: ResourceId) -> bool {
        let handle = self.tracked.write().await.remove(&id);

        match handle {
            Some(handle) => {
                handle.monitor.retire();
                handle.task.abort();
                info!("Untracked {}", handle.monitor.target().canonical_url());
                true
            }
            None => false,
        }
    }

    /// Reconcile with the registry's current list by id. Edits that keep the
    /// same target are applied in place, so history and detector state survive;
    /// a resource whose URL or kind changed is restarted.
    pub async fn sync(&self, resources: &[TrackedResource]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let missing: Vec<ResourceId> = {
            let tracked = self.tracked.read().await;
            tracked
                .keys()
                .filter(|id| !resources.iter().any(|r| r.id == **id))
                .copied()
                .collect()
        };

        for id in missing {
            if self.untrack(id).await {
                summary.untracked.push(id);
            }
        }

        for resource in resources {
            let id = resource.id;

            if let Some(monitor) = self.monitor(id).await {
                if monitor.polls_same_target(resource) {
                    if monitor.refresh(resource.clone()).await {
                        summary.refreshed.push(id);
                    }
                    continue;
                }

                info!("Target of {} changed, restarting", id);
                if self.untrack(id).await {
                    summary.untracked.push(id);
                }
            }

            match self.track(resource.clone()).await {
                Ok(id) => summary.tracked.push(id),
                Err(e) => {
                    warn!("Rejected resource {}: {}", resource.url, e);
                    summary.rejected.push(id);
                }
            }
        }

        debug!(
            "Sync complete: {} tracked, {} refreshed, {} untracked, {} rejected",
            summary.tracked.len(),
            summary.refreshed.len(),
            summary.untracked.len(),
            summary.rejected.len()
        );

        summary
    }

    /// Poll immediately, outside the timer. Subject to the same single-flight guard.
    pub async fn poll_now(&self, id: ResourceId) -> Option<PollReport> {
        let monitor = self.monitor(id).await?;
        let report = monitor.poll_once().await;

        match &report {
            Some(report) => self.counters.record(report),
            None if monitor.is_retired() => {}
            None => {
                self.counters.polls_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        report
    }

    pub async fn is_tracked(&self, id: ResourceId) -> bool {
        self.tracked.read().await.contains_key(&id)
    }

    pub async fn monitor(&self, id: ResourceId) -> Option<Arc<ResourceMonitor>> {
        self.tracked
            .read()
            .await
            .get(&id)
            .map(|handle| Arc::clone(&handle.monitor))
    }

    pub async fn tracked_ids(&self) -> Vec<ResourceId> {
        self.tracked.read().await.keys().copied().collect()
    }

    /// Get scheduler statistics
    pub async fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tracked: self.tracked.read().await.len(),
            polls_completed: self.counters.polls_completed.load(Ordering::Relaxed),
            polls_skipped: self.counters.polls_skipped.load(Ordering::Relaxed),
            alerts_emitted: self.counters.alerts_emitted.load(Ordering::Relaxed),
        }
    }

    /// Untrack everything
    pub async fn shutdown(&self) {
        let ids = self.tracked_ids().await;
        info!("Shutting down scheduler with {} tracked resources", ids.len());

        join_all(ids.into_iter().map(|id| self.untrack(id))).await;

        let stats = self.stats().await;
        info!(
            "Final scheduler stats - Completed: {}, Skipped: {}, Alerts: {}",
            stats.polls_completed, stats.polls_skipped, stats.alerts_emitted
        );
    }

    fn period_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Website => self.config.website_poll_interval,
            ResourceKind::Repository => self.config.repo_poll_interval,
        }
    }
}

impl Counters {
    fn record(&self, report: &PollReport) {
        self.polls_completed.fetch_add(1, Ordering::Relaxed);
        self.alerts_emitted
            .fetch_add(report.alerts.len() as u64, Ordering::Relaxed);
    }
}

/// Timer loop for one resource. Each tick spawns a poll so a slow upstream
/// never delays the timer; the monitor's guard drops overlapping ticks.
async fn run_resource(
    monitor: Arc<ResourceMonitor>,
    period: Duration,
    start_jitter: Duration,
    reports: mpsc::Sender<PollReport>,
    counters: Arc<Counters>,
) {
    if !start_jitter.is_zero() {
        let delay = rand::random_range(0..=start_jitter.as_millis() as u64);
        sleep(Duration::from_millis(delay)).await;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let monitor = Arc::clone(&monitor);
        let reports = reports.clone();
        let counters = Arc::clone(&counters);

        tokio::spawn(async move {
            match monitor.poll_once().await {
                Some(report) => {
                    counters.record(&report);
                    for alert in &report.alerts {
                        warn!("{}: {}", alert.title(), alert.summary());
                    }
                    if reports.send(report).await.is_err() {
                        debug!("Report receiver dropped");
                    }
                }
                None if monitor.is_retired() => {}
                None => {
                    counters.polls_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::{AlertKind, ResourceStatus};
    use chrono::TimeDelta;
    use tokio::time::timeout;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(website_poll_interval: Duration) -> MonitorConfig {
        MonitorConfig {
            website_poll_interval,
            website_timeout: Duration::from_secs(5),
            start_jitter: Duration::ZERO,
            history_sample_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn website(server: &MockServer) -> TrackedResource {
        TrackedResource::new(server.uri(), ResourceKind::Website, "site".to_string())
    }

    #[tokio::test]
    async fn test_tracked_website_reports() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (scheduler, mut reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let id = scheduler.track(website(&server)).await.unwrap();

        let report = timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.resource_id, id);
        assert_eq!(report.observed_status, ResourceStatus::Up);
        assert_eq!(scheduler.stats().await.tracked, 1);

        scheduler.shutdown().await;
        assert_eq!(scheduler.stats().await.tracked, 0);
    }

    #[tokio::test]
    async fn test_slow_upstream_skips_overlapping_ticks() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(400)))
            .mount(&server)
            .await;

        let (scheduler, _reports) = Scheduler::new(config(Duration::from_millis(50))).unwrap();
        scheduler.track(website(&server)).await.unwrap();

        sleep(Duration::from_millis(300)).await;
        scheduler.shutdown().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(scheduler.stats().await.polls_skipped >= 1);
    }

    #[tokio::test]
    async fn test_untrack_discards_in_flight_result() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let (scheduler, mut reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let id = scheduler.track(website(&server)).await.unwrap();
        let state = Arc::downgrade(&scheduler.monitor(id).await.unwrap());

        sleep(Duration::from_millis(100)).await;
        assert!(scheduler.untrack(id).await);
        assert!(!scheduler.is_tracked(id).await);

        sleep(Duration::from_millis(600)).await;
        assert!(reports.try_recv().is_err());
        assert!(state.upgrade().is_none());
        assert!(!scheduler.untrack(id).await);
    }

    #[tokio::test]
    async fn test_track_rejects_invalid_resource() {
        let (scheduler, _reports) = Scheduler::new(config(Duration::from_secs(60))).unwrap();
        let resource = TrackedResource::new(
            "https://example.com".to_string(),
            ResourceKind::Repository,
            "example".to_string(),
        );

        let err = scheduler.track(resource).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert_eq!(scheduler.stats().await.tracked, 0);
    }

    #[tokio::test]
    async fn test_sync_reconciles_registry() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (scheduler, _reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let first = website(&server);
        let second = website(&server);
        let invalid = TrackedResource::new(
            "https://example.com".to_string(),
            ResourceKind::Repository,
            "example".to_string(),
        );

        let summary = scheduler
            .sync(&[first.clone(), second.clone(), invalid.clone()])
            .await;
        assert_eq!(summary.tracked.len(), 2);
        assert_eq!(summary.rejected, vec![invalid.id]);

        let summary = scheduler.sync(&[second.clone()]).await;
        assert_eq!(summary.untracked, vec![first.id]);
        assert!(summary.tracked.is_empty());
        assert!(summary.refreshed.is_empty());
        assert_eq!(scheduler.tracked_ids().await, vec![second.id]);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_now_runs_outside_timer() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (scheduler, _reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let id = scheduler.track(website(&server)).await.unwrap();

        // Let the immediate first tick finish
        sleep(Duration::from_millis(200)).await;
        let report = scheduler.poll_now(id).await.unwrap();
        assert_eq!(report.observed_status, ResourceStatus::Down);

        let history = scheduler.monitor(id).await.unwrap().history().await;
        assert_eq!(history.len(), 2);

        scheduler.shutdown().await;
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MonitorConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(Scheduler::new(config), Err(MonitorError::Config(_))));
    }

    #[tokio::test]
    async fn test_sync_with_edited_resource_keeps_history() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (scheduler, mut reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let resource = website(&server);
        scheduler.sync(&[resource.clone()]).await;

        let first = timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.observed_status, ResourceStatus::Up);

        let mut edited = resource.clone();
        edited.name = "renamed".to_string();
        edited.updated_at += TimeDelta::seconds(5);

        let summary = scheduler.sync(&[edited]).await;
        assert_eq!(summary.refreshed, vec![resource.id]);
        assert!(summary.untracked.is_empty());
        assert!(summary.tracked.is_empty());

        let second = scheduler.poll_now(resource.id).await.unwrap();
        assert_eq!(second.observed_status, ResourceStatus::Down);
        assert_eq!(second.resource_name, "renamed");
        assert_eq!(second.alerts.len(), 1);
        assert_eq!(second.alerts[0].kind(), AlertKind::ResourceDown);

        let history = scheduler.monitor(resource.id).await.unwrap().history().await;
        assert_eq!(history.len(), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_sync_restarts_when_target_changes() {
        let old_server = MockServer::start().await;
        let new_server = MockServer::start().await;
        for server in [&old_server, &new_server] {
            Mock::given(method("HEAD"))
                .respond_with(ResponseTemplate::new(200))
                .mount(server)
                .await;
        }

        let (scheduler, _reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let resource = website(&old_server);
        scheduler.sync(&[resource.clone()]).await;

        let mut moved = resource.clone();
        moved.url = new_server.uri();
        moved.updated_at += TimeDelta::seconds(5);

        let summary = scheduler.sync(&[moved]).await;
        assert_eq!(summary.untracked, vec![resource.id]);
        assert_eq!(summary.tracked, vec![resource.id]);

        let monitor = scheduler.monitor(resource.id).await.unwrap();
        assert_eq!(monitor.resource().await.url, new_server.uri());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_poll_now_discarded_by_untrack_is_not_a_skip() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let (scheduler, mut reports) = Scheduler::new(config(Duration::from_secs(3600))).unwrap();
        let id = scheduler.track(website(&server)).await.unwrap();
        timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();

        let (report, untracked) = tokio::join!(scheduler.poll_now(id), async {
            sleep(Duration::from_millis(100)).await;
            scheduler.untrack(id).await
        });

        assert!(report.is_none());
        assert!(untracked);
        let stats = scheduler.stats().await;
        assert_eq!(stats.polls_skipped, 0);
        assert_eq!(stats.polls_completed, 1);
    }
}
