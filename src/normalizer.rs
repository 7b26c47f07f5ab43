//! Conversion of raw provider responses into the internal metric shapes
//!
//! Wire structs mirror the source-hosting API's JSON closely and are tolerant of
//! missing fields; everything downstream only sees the types in [`crate::models`].

use crate::errors::MonitorError;
use crate::models::{
    CommitActivity, Contributor, RepoData, ResourceStatus, WebsiteMetrics, WebsitePerformance,
    WorkflowRun,
};
use chrono::{DateTime, Days, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

pub const COMMIT_WEEKS: usize = 4;
pub const MAX_CONTRIBUTORS: usize = 10;
pub const MAX_WORKFLOW_RUNS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct RawRepository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub default_branch: String,
    pub license: Option<RawLicense>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub subscribers_count: u64,
    #[serde(default)]
    pub network_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawLicense {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCommitWeek {
    /// Unix timestamp of the start of the week
    pub week: i64,
    #[serde(default)]
    pub days: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawContributor {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub contributions: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawWorkflowRuns {
    #[serde(default)]
    pub workflow_runs: Vec<RawWorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub struct RawWorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<RawRepository> for RepoData {
    fn from(raw: RawRepository) -> Self {
        Self {
            name: raw.name,
            full_name: raw.full_name,
            description: raw.description,
            stars: raw.stargazers_count,
            forks: raw.forks_count,
            watchers: raw.watchers_count,
            open_issues: raw.open_issues_count,
            language: raw.language,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            pushed_at: raw.pushed_at,
            default_branch: raw.default_branch,
            license: raw.license.and_then(|l| l.name),
            topics: raw.topics,
            size: raw.size,
            subscribers_count: raw.subscribers_count,
            network_count: raw.network_count,
        }
    }
}

impl From<RawWorkflowRun> for WorkflowRun {
    fn from(raw: RawWorkflowRun) -> Self {
        Self {
            id: raw.id,
            name: raw.name.unwrap_or_else(|| "unknown".to_string()),
            status: raw.status.unwrap_or_else(|| "unknown".to_string()),
            conclusion: raw.conclusion,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }
}

/// Expand weekly commit buckets into daily points for the most recent weeks,
/// ordered oldest to newest.
pub fn expand_commit_activity(weeks: &[RawCommitWeek]) -> Vec<CommitActivity> {
    let recent = &weeks[weeks.len().saturating_sub(COMMIT_WEEKS)..];
    let mut daily = Vec::with_capacity(recent.len() * 7);

    for week in recent {
        let Some(start) = DateTime::from_timestamp(week.week, 0) else {
            continue;
        };
        let start = start.date_naive();

        for day in 0..7u64 {
            let Some(date) = start.checked_add_days(Days::new(day)) else {
                continue;
            };
            daily.push(CommitActivity {
                date,
                count: week.days.get(day as usize).copied().unwrap_or(0),
            });
        }
    }

    daily
}

/// Top contributors, highest contribution count first
pub fn normalize_contributors(raw: Vec<RawContributor>) -> Vec<Contributor> {
    let mut contributors: Vec<Contributor> = raw
        .into_iter()
        .map(|c| Contributor {
            login: c.login,
            avatar_url: c.avatar_url,
            contributions: c.contributions,
        })
        .collect();

    contributors.sort_by(|a, b| b.contributions.cmp(&a.contributions));
    contributors.truncate(MAX_CONTRIBUTORS);
    contributors
}

/// Most recent runs first
pub fn normalize_workflow_runs(raw: RawWorkflowRuns) -> Vec<WorkflowRun> {
    let mut runs: Vec<WorkflowRun> = raw.workflow_runs.into_iter().map(WorkflowRun::from).collect();
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.truncate(MAX_WORKFLOW_RUNS);
    runs
}

static LAST_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[?&]page=(\d+)[^>]*>;\s*rel="last""#).expect("valid regex"));

/// Page number of the `rel="last"` entry of a pagination `Link` header
pub fn last_page_from_link(link: &str) -> Option<u64> {
    LAST_PAGE
        .captures(link)
        .and_then(|c| c[1].parse().ok())
}

/// Total item count of a listing requested with `per_page=1`.
///
/// With one item per page the last page number is the total. Without a
/// `rel="last"` link there are no further pages, so the page itself is counted.
pub fn paged_total(link: Option<&str>, page_len: usize) -> u64 {
    link.and_then(last_page_from_link)
        .unwrap_or(page_len as u64)
}

/// Metrics for a probe that produced an HTTP response
pub fn website_metrics_from_response(
    url: &str,
    status: StatusCode,
    elapsed: Duration,
) -> (WebsiteMetrics, WebsitePerformance) {
    let total_ms = elapsed.as_millis() as u64;
    let up = status.is_success() || status.is_redirection();

    let metrics = WebsiteMetrics {
        url: url.to_string(),
        status: if up { ResourceStatus::Up } else { ResourceStatus::Down },
        status_code: Some(status.as_u16()),
        response_time_ms: Some(total_ms),
        ssl_valid: if url.starts_with("https://") { Some(true) } else { None },
        last_checked: Utc::now(),
        error: None,
        error_kind: None,
    };

    (metrics, WebsitePerformance::estimate(total_ms))
}

/// Metrics for a probe that failed before a response arrived
pub fn website_metrics_from_error(
    url: &str,
    error: &MonitorError,
    elapsed: Duration,
) -> WebsiteMetrics {
    WebsiteMetrics {
        url: url.to_string(),
        status: ResourceStatus::Down,
        status_code: None,
        response_time_ms: Some(elapsed.as_millis() as u64),
        ssl_valid: None,
        last_checked: Utc::now(),
        error: Some(match error {
            MonitorError::Timeout => "Request timeout".to_string(),
            MonitorError::NetworkFailure(msg) => msg.clone(),
            other => other.to_string(),
        }),
        error_kind: Some(error.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use chrono::NaiveDate;

    fn week(start: &str, days: [u64; 7]) -> RawCommitWeek {
        let date = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
        RawCommitWeek {
            week: date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp(),
            days: days.to_vec(),
        }
    }

    #[test]
    fn test_commit_activity_keeps_last_four_weeks() {
        let weeks = vec![
            week("2024-01-07", [9; 7]),
            week("2024-01-14", [1, 0, 0, 0, 0, 0, 0]),
            week("2024-01-21", [0; 7]),
            week("2024-01-28", [0; 7]),
            week("2024-02-04", [0, 0, 0, 0, 0, 0, 5]),
        ];

        let daily = expand_commit_activity(&weeks);
        assert_eq!(daily.len(), 28);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        assert_eq!(daily[0].count, 1);
        assert_eq!(daily[27].date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(daily[27].count, 5);
        assert!(daily.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_commit_activity_short_week_pads_zero() {
        let weeks = vec![RawCommitWeek {
            week: 0,
            days: vec![3],
        }];
        let daily = expand_commit_activity(&weeks);
        assert_eq!(daily.len(), 7);
        assert_eq!(daily[0].count, 3);
        assert_eq!(daily[6].count, 0);
    }

    #[test]
    fn test_contributors_sorted_and_capped() {
        let raw = (0..15)
            .map(|i| RawContributor {
                login: format!("user{}", i),
                avatar_url: String::new(),
                contributions: i,
            })
            .collect();

        let contributors = normalize_contributors(raw);
        assert_eq!(contributors.len(), 10);
        assert_eq!(contributors[0].login, "user14");
        assert!(contributors.windows(2).all(|w| w[0].contributions >= w[1].contributions));
    }

    #[test]
    fn test_last_page_from_link_header() {
        let link = r#"<https://api.github.com/repositories/1/issues?state=open&per_page=1&page=2>; rel="next", <https://api.github.com/repositories/1/issues?state=open&per_page=1&page=57>; rel="last""#;
        assert_eq!(last_page_from_link(link), Some(57));
    }

    #[test]
    fn test_last_page_ignores_per_page_parameter() {
        let link = r#"<https://api.github.com/x?page=12&per_page=1>; rel="last""#;
        assert_eq!(last_page_from_link(link), Some(12));
    }

    #[test]
    fn test_paged_total_falls_back_to_page_length() {
        let link = r#"<https://api.github.com/x?page=1>; rel="prev""#;
        assert_eq!(paged_total(Some(link), 1), 1);
        assert_eq!(paged_total(None, 0), 0);
    }

    #[test]
    fn test_repository_license_flattened() {
        let raw: RawRepository = serde_json::from_value(serde_json::json!({
            "name": "demo",
            "full_name": "acme/demo",
            "description": null,
            "stargazers_count": 10,
            "forks_count": 2,
            "license": { "name": "MIT License" },
            "default_branch": "main"
        }))
        .unwrap();

        let data = RepoData::from(raw);
        assert_eq!(data.license.as_deref(), Some("MIT License"));
        assert_eq!(data.stars, 10);
        assert!(data.topics.is_empty());
    }

    #[test]
    fn test_response_metrics_up_for_success() {
        let (metrics, perf) = website_metrics_from_response(
            "https://example.com/",
            StatusCode::OK,
            Duration::from_millis(1000),
        );
        assert_eq!(metrics.status, ResourceStatus::Up);
        assert_eq!(metrics.status_code, Some(200));
        assert_eq!(metrics.ssl_valid, Some(true));
        assert_eq!(perf.phase_sum(), 1000);
    }

    #[test]
    fn test_response_metrics_down_for_server_error() {
        let (metrics, _) = website_metrics_from_response(
            "http://example.com/",
            StatusCode::SERVICE_UNAVAILABLE,
            Duration::from_millis(12),
        );
        assert_eq!(metrics.status, ResourceStatus::Down);
        assert_eq!(metrics.status_code, Some(503));
        assert_eq!(metrics.ssl_valid, None);
        assert!(metrics.error.is_none());
    }

    #[test]
    fn test_error_metrics_classify_timeout() {
        let metrics = website_metrics_from_error(
            "https://example.com/",
            &MonitorError::Timeout,
            Duration::from_millis(30_000),
        );
        assert_eq!(metrics.status, ResourceStatus::Down);
        assert_eq!(metrics.error.as_deref(), Some("Request timeout"));
        assert_eq!(metrics.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(metrics.response_time_ms, Some(30_000));
    }
}
