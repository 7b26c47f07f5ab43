//! Composite 0-100 health scores built from weighted factors

use crate::models::{
    CommitActivity, HealthFactor, HealthScore, IssueStats, RepoData, RepositorySnapshot,
    ResourceStatus, WebsiteSnapshot, WorkflowRun,
};

pub const ACTIVITY: &str = "Activity";
pub const COMMUNITY: &str = "Community";
pub const ISSUE_MANAGEMENT: &str = "Issue Management";
pub const CI_HEALTH: &str = "CI Health";
pub const AVAILABILITY: &str = "Availability";
pub const UPTIME: &str = "Uptime";
pub const RESPONSIVENESS: &str = "Responsiveness";

const ACTIVITY_WINDOW_DAYS: usize = 14;
const ACTIVITY_TARGET_COMMITS: f64 = 20.0;
const COMMUNITY_TARGET: f64 = 500.0;
const CI_WINDOW_RUNS: usize = 10;
const FAST_RESPONSE_MS: f64 = 500.0;
const SLOW_RESPONSE_MS: f64 = 3000.0;

/// `round(Σ value·weight / Σ weight)`, clamped to 0..=100
pub fn weighted_score(factors: Vec<HealthFactor>) -> HealthScore {
    let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
    let weighted_sum: f64 = factors.iter().map(|f| f.value * f.weight).sum();

    let score = if total_weight > 0.0 {
        (weighted_sum / total_weight).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    HealthScore { score, factors }
}

fn factor(name: &str, value: f64, weight: f64) -> HealthFactor {
    HealthFactor {
        name: name.to_string(),
        value: value.clamp(0.0, 100.0),
        weight,
    }
}

/// Commits over the most recent 14 daily points against a target of 20
pub fn activity_factor(commit_activity: &[CommitActivity]) -> f64 {
    let recent = &commit_activity[commit_activity.len().saturating_sub(ACTIVITY_WINDOW_DAYS)..];
    let commits: u64 = recent.iter().map(|d| d.count).sum();
    (commits as f64 * 100.0 / ACTIVITY_TARGET_COMMITS).min(100.0)
}

/// Stars plus doubled forks against a target of 500; 0 without metadata
pub fn community_factor(repo_data: Option<&RepoData>) -> f64 {
    repo_data
        .map(|r| ((r.stars + r.forks * 2) as f64 * 100.0 / COMMUNITY_TARGET).min(100.0))
        .unwrap_or(0.0)
}

/// Closed share of all issues; 100 when there are none
pub fn issue_factor(stats: IssueStats) -> f64 {
    let total = stats.open + stats.closed;
    if total == 0 {
        return 100.0;
    }
    stats.closed as f64 * 100.0 / total as f64
}

/// Success rate over the most recent runs; 100 when there are none
pub fn ci_factor(workflow_runs: &[WorkflowRun]) -> f64 {
    let recent = &workflow_runs[..workflow_runs.len().min(CI_WINDOW_RUNS)];
    if recent.is_empty() {
        return 100.0;
    }
    let successful = recent.iter().filter(|r| r.is_success()).count();
    successful as f64 * 100.0 / recent.len() as f64
}

/// 100 at or below 500 ms, falling linearly to 0 at 3000 ms
pub fn responsiveness_factor(avg_response_time_ms: Option<u64>) -> f64 {
    match avg_response_time_ms {
        None => 100.0,
        Some(ms) => {
            let ms = ms as f64;
            if ms <= FAST_RESPONSE_MS {
                100.0
            } else {
                (100.0 * (SLOW_RESPONSE_MS - ms) / (SLOW_RESPONSE_MS - FAST_RESPONSE_MS)).max(0.0)
            }
        }
    }
}

pub fn score_repository(snapshot: &RepositorySnapshot) -> HealthScore {
    weighted_score(vec![
        factor(ACTIVITY, activity_factor(&snapshot.commit_activity), 0.25),
        factor(COMMUNITY, community_factor(snapshot.repo_data.as_ref()), 0.20),
        factor(ISSUE_MANAGEMENT, issue_factor(snapshot.issue_stats), 0.25),
        factor(CI_HEALTH, ci_factor(&snapshot.workflow_runs), 0.30),
    ])
}

pub fn score_website(snapshot: &WebsiteSnapshot) -> HealthScore {
    let availability = match snapshot.metrics.status {
        ResourceStatus::Up => 100.0,
        _ => 0.0,
    };
    let measured = snapshot
        .uptime_history
        .iter()
        .any(|e| e.response_time_ms.is_some());

    weighted_score(vec![
        factor(AVAILABILITY, availability, 0.40),
        factor(UPTIME, snapshot.uptime_percentage, 0.35),
        factor(
            RESPONSIVENESS,
            responsiveness_factor(measured.then_some(snapshot.avg_response_time)),
            0.25,
        ),
    ])
}
