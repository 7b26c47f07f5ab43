//! Data structures shared by the pollers, scorer, detector and scheduler

use crate::errors::ErrorKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ResourceId = Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Repository,
    Website,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Repository => write!(f, "repository"),
            ResourceKind::Website => write!(f, "website"),
        }
    }
}

/// A resource owned by the registry collaborator. The monitor only reads it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackedResource {
    pub id: ResourceId,
    pub url: String,
    pub kind: ResourceKind,
    pub name: String,
    pub notifications_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedResource {
    pub fn new(url: String, kind: ResourceKind, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url,
            kind,
            name,
            notifications_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Up,
    Down,
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Up => write!(f, "up"),
            ResourceStatus::Down => write!(f, "down"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebsiteMetrics {
    pub url: String,
    pub status: ResourceStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub ssl_valid: Option<bool>,
    pub last_checked: DateTime<Utc>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl WebsiteMetrics {
    pub fn unknown(url: String) -> Self {
        Self {
            url,
            status: ResourceStatus::Unknown,
            status_code: None,
            response_time_ms: None,
            ssl_valid: None,
            last_checked: Utc::now(),
            error: None,
            error_kind: None,
        }
    }
}

/// Round-trip phase breakdown. When `estimated` is set the phases are a fixed
/// proportional split of the total, not measured boundaries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebsitePerformance {
    pub dns_time_ms: u64,
    pub connect_time_ms: u64,
    pub ttfb_ms: u64,
    pub download_time_ms: u64,
    pub total_time_ms: u64,
    pub estimated: bool,
}

impl WebsitePerformance {
    /// Split `total_time_ms` 10/15/50/25. Download absorbs the rounding so the
    /// phases always sum to the total exactly.
    pub fn estimate(total_time_ms: u64) -> Self {
        let share = |percent: u64| (total_time_ms * percent + 50) / 100;
        let dns_time_ms = share(10);
        let connect_time_ms = share(15);
        let ttfb_ms = share(50);
        let download_time_ms =
            total_time_ms.saturating_sub(dns_time_ms + connect_time_ms + ttfb_ms);

        Self {
            dns_time_ms,
            connect_time_ms,
            ttfb_ms,
            download_time_ms,
            total_time_ms,
            estimated: true,
        }
    }

    pub fn phase_sum(&self) -> u64 {
        self.dns_time_ms + self.connect_time_ms + self.ttfb_ms + self.download_time_ms
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Up,
    Down,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UptimeHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub status: SampleStatus,
    pub response_time_ms: Option<u64>,
}

impl UptimeHistoryEntry {
    /// Sample derived from a completed probe. `Unknown` counts as down.
    pub fn from_metrics(metrics: &WebsiteMetrics) -> Self {
        Self {
            timestamp: metrics.last_checked,
            status: match metrics.status {
                ResourceStatus::Up => SampleStatus::Up,
                _ => SampleStatus::Down,
            },
            response_time_ms: metrics.response_time_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebsiteSnapshot {
    pub metrics: WebsiteMetrics,
    pub performance: Option<WebsitePerformance>,
    pub uptime_history: Vec<UptimeHistoryEntry>,
    pub uptime_percentage: f64,
    pub avg_response_time: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RepoData {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub default_branch: String,
    pub license: Option<String>,
    pub topics: Vec<String>,
    pub size: u64,
    pub subscribers_count: u64,
    pub network_count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitActivity {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contributor {
    pub login: String,
    pub avatar_url: String,
    pub contributions: u64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueStats {
    pub open: u64,
    pub closed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn is_success(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }

    pub fn is_failure(&self) -> bool {
        self.conclusion.as_deref() == Some("failure")
    }
}

/// Auxiliary sections of a repository snapshot that may fall back to defaults
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryData {
    CommitActivity,
    Contributors,
    IssueStats,
    WorkflowRuns,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RepositorySnapshot {
    pub repo_data: Option<RepoData>,
    pub commit_activity: Vec<CommitActivity>,
    pub contributors: Vec<Contributor>,
    pub issue_stats: IssueStats,
    pub workflow_runs: Vec<WorkflowRun>,
    /// Sections that failed upstream and hold a default value rather than a measured one
    pub unavailable: Vec<AuxiliaryData>,
}

impl RepositorySnapshot {
    pub fn is_available(&self, section: AuxiliaryData) -> bool {
        !self.unavailable.contains(&section)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthFactor {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthScore {
    pub score: u8,
    pub factors: Vec<HealthFactor>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Healthy,
    Degraded,
    Critical,
}

impl HealthScore {
    pub fn grade(&self) -> HealthGrade {
        match self.score {
            80..=100 => HealthGrade::Healthy,
            50..=79 => HealthGrade::Degraded,
            _ => HealthGrade::Critical,
        }
    }

    pub fn factor(&self, name: &str) -> Option<&HealthFactor> {
        self.factors.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Snapshot {
    Website(WebsiteSnapshot),
    Repository(RepositorySnapshot),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ResourceDown,
    ResponseTimeSpike,
    Recovered,
    CiFailure,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::ResourceDown => write!(f, "resource_down"),
            AlertKind::ResponseTimeSpike => write!(f, "response_time_spike"),
            AlertKind::Recovered => write!(f, "recovered"),
            AlertKind::CiFailure => write!(f, "ci_failure"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetail {
    ResourceDown {
        status_code: Option<u16>,
        error: Option<String>,
        error_kind: Option<ErrorKind>,
        last_response_time_ms: Option<u64>,
    },
    ResponseTimeSpike {
        current_ms: u64,
        previous_ms: u64,
        threshold_ms: u64,
    },
    Recovered {
        downtime_secs: Option<i64>,
    },
    CiFailure {
        run_id: u64,
        workflow_name: String,
    },
}

impl AlertDetail {
    pub fn kind(&self) -> AlertKind {
        match self {
            AlertDetail::ResourceDown { .. } => AlertKind::ResourceDown,
            AlertDetail::ResponseTimeSpike { .. } => AlertKind::ResponseTimeSpike,
            AlertDetail::Recovered { .. } => AlertKind::Recovered,
            AlertDetail::CiFailure { .. } => AlertKind::CiFailure,
        }
    }
}

/// Transient alert handed to the delivery collaborator
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub resource_id: ResourceId,
    pub resource_name: String,
    pub resource_url: String,
    pub timestamp: DateTime<Utc>,
    pub detail: AlertDetail,
}

impl AlertEvent {
    pub fn new(resource: &TrackedResource, detail: AlertDetail) -> Self {
        Self {
            resource_id: resource.id,
            resource_name: resource.name.clone(),
            resource_url: resource.url.clone(),
            timestamp: Utc::now(),
            detail,
        }
    }

    pub fn kind(&self) -> AlertKind {
        self.detail.kind()
    }

    pub fn title(&self) -> &'static str {
        match self.kind() {
            AlertKind::ResourceDown => "Website Down",
            AlertKind::ResponseTimeSpike => "Response Time Spike",
            AlertKind::Recovered => "Website Recovered",
            AlertKind::CiFailure => "CI/CD Failure",
        }
    }

    pub fn summary(&self) -> String {
        match &self.detail {
            AlertDetail::ResourceDown {
                status_code, error, ..
            } => match (status_code, error) {
                (_, Some(error)) => format!("{} is not responding: {}", self.resource_url, error),
                (Some(code), None) => format!("{} returned HTTP {}", self.resource_url, code),
                (None, None) => format!("{} is not responding", self.resource_url),
            },
            AlertDetail::ResponseTimeSpike {
                current_ms,
                threshold_ms,
                ..
            } => format!("Response time: {}ms (threshold: {}ms)", current_ms, threshold_ms),
            AlertDetail::Recovered { downtime_secs } => match downtime_secs {
                Some(secs) => format!("{} is back up after {}s", self.resource_url, secs),
                None => format!("{} is back up", self.resource_url),
            },
            AlertDetail::CiFailure { workflow_name, .. } => {
                format!("Workflow \"{}\" failed", workflow_name)
            }
        }
    }
}

/// Output of one completed poll, handed to the collaborator layer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PollReport {
    pub resource_id: ResourceId,
    pub resource_name: String,
    pub kind: ResourceKind,
    pub observed_status: ResourceStatus,
    pub snapshot: Option<Snapshot>,
    pub health_score: Option<HealthScore>,
    pub last_updated: DateTime<Utc>,
    /// Set only when the whole poll failed and no snapshot exists
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub alerts: Vec<AlertEvent>,
}
