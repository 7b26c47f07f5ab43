//! Repository polling against the source-hosting REST API

use crate::config::MonitorConfig;
use crate::errors::{classify_reqwest_error, MonitorError, Result};
use crate::models::{
    AuxiliaryData, CommitActivity, Contributor, IssueStats, RepoData, RepositorySnapshot,
    WorkflowRun,
};
use crate::normalizer::{
    expand_commit_activity, normalize_contributors, normalize_workflow_runs, paged_total,
    RawCommitWeek, RawContributor, RawRepository, RawWorkflowRuns, MAX_CONTRIBUTORS,
    MAX_WORKFLOW_RUNS,
};
use crate::resource::validate_repository;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Outcome of one auxiliary sub-fetch. A degraded fetch still yields a value,
/// the section's default, together with the reason it is not a real measurement.
#[derive(Debug)]
pub enum SubFetch<T> {
    Fetched(T),
    Degraded { fallback: T, cause: MonitorError },
}

impl<T: Default> SubFetch<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => SubFetch::Fetched(value),
            Err(cause) => SubFetch::Degraded {
                fallback: T::default(),
                cause: match cause {
                    MonitorError::PartialDataUnavailable(_) => cause,
                    other => MonitorError::PartialDataUnavailable(other.to_string()),
                },
            },
        }
    }
}

impl<T> SubFetch<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SubFetch::Degraded { .. })
    }

    /// Take the value, recording `section` as unavailable when degraded
    fn settle(self, section: AuxiliaryData, unavailable: &mut Vec<AuxiliaryData>) -> T {
        match self {
            SubFetch::Fetched(value) => value,
            SubFetch::Degraded { fallback, cause } => {
                warn!("{:?} unavailable: {}", section, cause);
                unavailable.push(section);
                fallback
            }
        }
    }
}

/// Client for the repository endpoints of the source-hosting API
#[derive(Debug, Clone)]
pub struct RepositoryPoller {
    client: Client,
    api_url: String,
    timeout: Duration,
}

impl RepositoryPoller {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        if let Some(token) = &config.github_token {
            let value = HeaderValue::from_str(&format!("token {}", token))
                .map_err(|e| MonitorError::Config(format!("invalid API token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.repo_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self {
            client,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            timeout: config.repo_timeout,
        })
    }

    /// Poll one repository. The metadata fetch is mandatory; the four auxiliary
    /// fetches run concurrently with it and degrade independently.
    #[instrument(skip(self))]
    pub async fn poll(&self, owner: &str, repo: &str) -> Result<RepositorySnapshot> {
        validate_repository(owner, repo)?;
        let base = format!("/repos/{}/{}", owner, repo);

        let (repo_data, commit_activity, contributors, issue_stats, workflow_runs) = tokio::join!(
            self.fetch_repository(&base),
            self.fetch_commit_activity(&base),
            self.fetch_contributors(&base),
            self.fetch_issue_stats(&base),
            self.fetch_workflow_runs(&base),
        );

        let repo_data = repo_data.map_err(|e| match e {
            MonitorError::UpstreamNotFound(_) => {
                MonitorError::UpstreamNotFound("Repository not found or inaccessible".to_string())
            }
            MonitorError::UpstreamRateLimited | MonitorError::Timeout => e,
            other => MonitorError::TotalPollFailure(other.to_string()),
        })?;

        let mut unavailable = Vec::new();
        let snapshot = RepositorySnapshot {
            repo_data: Some(repo_data),
            commit_activity: commit_activity.settle(AuxiliaryData::CommitActivity, &mut unavailable),
            contributors: contributors.settle(AuxiliaryData::Contributors, &mut unavailable),
            issue_stats: issue_stats.settle(AuxiliaryData::IssueStats, &mut unavailable),
            workflow_runs: workflow_runs.settle(AuxiliaryData::WorkflowRuns, &mut unavailable),
            unavailable,
        };

        debug!(
            "Polled {}/{}: {} commit days, {} contributors, {} runs, {} sections unavailable",
            owner,
            repo,
            snapshot.commit_activity.len(),
            snapshot.contributors.len(),
            snapshot.workflow_runs.len(),
            snapshot.unavailable.len()
        );

        Ok(snapshot)
    }

    async fn fetch_repository(&self, base: &str) -> Result<RepoData> {
        let raw: RawRepository = self.get_json(base).await?;
        Ok(RepoData::from(raw))
    }

    async fn fetch_commit_activity(&self, base: &str) -> SubFetch<Vec<CommitActivity>> {
        let result: Result<Vec<CommitActivity>> = async {
            let response = self.get(&format!("{}/stats/commit_activity", base)).await?;
            if response.status() == StatusCode::ACCEPTED {
                return Err(MonitorError::PartialDataUnavailable(
                    "commit statistics are still being computed".to_string(),
                ));
            }

            let weeks: Vec<RawCommitWeek> = decode(response).await?;
            Ok(expand_commit_activity(&weeks))
        }
        .await;

        SubFetch::from_result(result)
    }

    async fn fetch_contributors(&self, base: &str) -> SubFetch<Vec<Contributor>> {
        let result: Result<Vec<Contributor>> = async {
            let path = format!("{}/contributors?per_page={}", base, MAX_CONTRIBUTORS);
            let response = self.get(&path).await?;
            if response.status() == StatusCode::NO_CONTENT {
                return Ok(Vec::new());
            }

            let raw: Vec<RawContributor> = decode(response).await?;
            Ok(normalize_contributors(raw))
        }
        .await;

        SubFetch::from_result(result)
    }

    async fn fetch_issue_stats(&self, base: &str) -> SubFetch<IssueStats> {
        let (open, closed) = tokio::join!(
            self.count_issues(base, "open"),
            self.count_issues(base, "closed"),
        );

        // Both counts or neither
        let result = open.and_then(|open| closed.map(|closed| IssueStats { open, closed }));
        SubFetch::from_result(result)
    }

    async fn count_issues(&self, base: &str, state: &str) -> Result<u64> {
        let path = format!("{}/issues?state={}&per_page=1", base, state);
        let response = self.get(&path).await?;

        let link = response
            .headers()
            .get(header::LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let page: Vec<serde_json::Value> = decode(response).await?;
        Ok(paged_total(link.as_deref(), page.len()))
    }

    async fn fetch_workflow_runs(&self, base: &str) -> SubFetch<Vec<WorkflowRun>> {
        let path = format!("{}/actions/runs?per_page={}", base, MAX_WORKFLOW_RUNS);
        let result = self
            .get_json::<RawWorkflowRuns>(&path)
            .await
            .map(normalize_workflow_runs);

        SubFetch::from_result(result)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        decode(response).await
    }

    /// Issue a GET with a hard timeout and classify unsuccessful statuses
    async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.api_url, path);

        let response = timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| MonitorError::Timeout)?
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(classify_status(status, response.headers(), path))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await.map_err(|e| classify_reqwest_error(&e))?;
    Ok(serde_json::from_slice(&body)?)
}

/// Distinguish rate limiting from missing or inaccessible resources
pub fn classify_status(status: StatusCode, headers: &HeaderMap, path: &str) -> MonitorError {
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::TOO_MANY_REQUESTS => MonitorError::UpstreamRateLimited,
        StatusCode::FORBIDDEN if quota_exhausted => MonitorError::UpstreamRateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MonitorError::UpstreamNotFound(format!("{} not found or inaccessible", path))
        }
        _ => MonitorError::TotalPollFailure(format!("{} returned HTTP {}", path, status)),
    }
}
