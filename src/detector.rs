//! Detection of alert-worthy transitions between consecutive polls

use crate::config::MonitorConfig;
use crate::models::{AlertDetail, ResourceStatus, WebsiteMetrics, WorkflowRun};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// What the previous completed poll of one resource observed.
///
/// Owned by that resource's poll path only; it is overwritten after each
/// evaluation, never before.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    pub previous_status: Option<ResourceStatus>,
    pub previous_response_time_ms: Option<u64>,
    pub down_since: Option<DateTime<Utc>>,
    /// Run ids seen by the previous repository poll; `None` until the first one
    pub previous_run_ids: Option<HashSet<u64>>,
    pub completed_polls: u64,
}

#[derive(Debug, Clone)]
pub struct TransitionDetector {
    spike_threshold_ms: u64,
    spike_multiplier: u64,
}

impl TransitionDetector {
    pub fn new(spike_threshold_ms: u64, spike_multiplier: u64) -> Self {
        Self {
            spike_threshold_ms,
            spike_multiplier,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.spike_threshold_ms, config.spike_multiplier)
    }

    /// Compare a website observation with the prior one, then record it.
    /// Emits at most one alert of each kind.
    pub fn evaluate_website(&self, state: &mut PollState, metrics: &WebsiteMetrics) -> Vec<AlertDetail> {
        let mut alerts = Vec::new();
        let current = metrics.status;

        match (state.previous_status, current) {
            (Some(ResourceStatus::Up), ResourceStatus::Down) => {
                alerts.push(AlertDetail::ResourceDown {
                    status_code: metrics.status_code,
                    error: metrics.error.clone(),
                    error_kind: metrics.error_kind,
                    last_response_time_ms: state.previous_response_time_ms,
                });
            }
            (Some(ResourceStatus::Down), ResourceStatus::Up) => {
                let downtime_secs = state
                    .down_since
                    .map(|since| (metrics.last_checked - since).num_seconds().max(0));
                alerts.push(AlertDetail::Recovered { downtime_secs });
            }
            _ => {}
        }

        if let (Some(current_ms), Some(previous_ms)) =
            (metrics.response_time_ms, state.previous_response_time_ms)
        {
            if self.is_spike(current_ms, previous_ms) {
                alerts.push(AlertDetail::ResponseTimeSpike {
                    current_ms,
                    previous_ms,
                    threshold_ms: self.spike_threshold_ms,
                });
            }
        }

        match current {
            ResourceStatus::Down => {
                state.down_since.get_or_insert(metrics.last_checked);
            }
            ResourceStatus::Up => state.down_since = None,
            ResourceStatus::Unknown => {}
        }
        state.previous_status = Some(current);
        if metrics.response_time_ms.is_some() {
            state.previous_response_time_ms = metrics.response_time_ms;
        }
        state.completed_polls += 1;

        if !alerts.is_empty() {
            debug!("{} transition(s) detected for {}", alerts.len(), metrics.url);
        }

        alerts
    }

    /// Flag the newest failed run that the previous poll had not seen.
    /// The first poll only establishes the baseline.
    pub fn evaluate_repository(&self, state: &mut PollState, runs: &[WorkflowRun]) -> Vec<AlertDetail> {
        let mut alerts = Vec::new();

        if let Some(seen) = &state.previous_run_ids {
            if let Some(run) = runs.iter().find(|r| r.is_failure() && !seen.contains(&r.id)) {
                alerts.push(AlertDetail::CiFailure {
                    run_id: run.id,
                    workflow_name: run.name.clone(),
                });
            }
        }

        state.previous_status = Some(ResourceStatus::Up);
        state.previous_run_ids = Some(runs.iter().map(|r| r.id).collect());
        state.completed_polls += 1;

        alerts
    }

    /// Exceeds the absolute threshold and the multiple of the prior time
    pub fn is_spike(&self, current_ms: u64, previous_ms: u64) -> bool {
        current_ms > self.spike_threshold_ms
            && current_ms > previous_ms.saturating_mul(self.spike_multiplier)
    }
}
