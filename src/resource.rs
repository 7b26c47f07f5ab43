//! Classification and validation of user-supplied resource locations

use crate::errors::{MonitorError, Result};
use crate::models::{ResourceKind, TrackedResource};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// What a tracked resource points at, parsed once before any network call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceTarget {
    Website { url: String },
    Repository { owner: String, repo: String },
}

impl ResourceTarget {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceTarget::Website { .. } => ResourceKind::Website,
            ResourceTarget::Repository { .. } => ResourceKind::Repository,
        }
    }

    pub fn canonical_url(&self) -> String {
        match self {
            ResourceTarget::Website { url } => url.clone(),
            ResourceTarget::Repository { owner, repo } => {
                format!("https://github.com/{}/{}", owner, repo)
            }
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ResourceTarget::Repository { owner, repo } => format!("{}/{}", owner, repo),
            ResourceTarget::Website { url } => Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| url.clone()),
        }
    }

    /// Build a tracked resource with a fresh id
    pub fn into_resource(self) -> TrackedResource {
        TrackedResource::new(self.canonical_url(), self.kind(), self.display_name())
    }
}

static REPOSITORY_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^https?://github\.com/([^/]+)/([^/]+)/?.*$").expect("valid regex"),
        Regex::new(r"^github\.com/([^/]+)/([^/]+)/?.*$").expect("valid regex"),
        Regex::new(r"^([^/]+)/([^/]+)$").expect("valid regex"),
    ]
});

/// Classify free-form input as a repository or a website
pub fn classify(input: &str) -> Result<ResourceTarget> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MonitorError::ValidationFailure("empty resource location".to_string()));
    }

    for pattern in REPOSITORY_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(trimmed) {
            let owner = &captures[1];
            let repo = clean_repo_name(&captures[2]);

            if !owner.is_empty() && !repo.is_empty() && !owner.contains('.') && owner != "www" {
                return Ok(ResourceTarget::Repository {
                    owner: owner.to_string(),
                    repo,
                });
            }
        }
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| MonitorError::ValidationFailure(format!("invalid URL '{}': {}", trimmed, e)))?;

    match parsed.host_str() {
        None => Err(MonitorError::ValidationFailure(format!(
            "URL '{}' has no host",
            trimmed
        ))),
        Some("github.com") => Err(MonitorError::ValidationFailure(format!(
            "'{}' is not a repository URL",
            trimmed
        ))),
        Some(_) => Ok(ResourceTarget::Website {
            url: parsed.to_string(),
        }),
    }
}

/// Resolve the target of an already tracked resource, honouring its declared kind
pub fn target_for(resource: &TrackedResource) -> Result<ResourceTarget> {
    let target = classify(&resource.url)?;
    match (resource.kind, &target) {
        (ResourceKind::Repository, ResourceTarget::Repository { .. }) => Ok(target),
        (ResourceKind::Website, ResourceTarget::Website { .. }) => Ok(target),
        (ResourceKind::Website, ResourceTarget::Repository { .. }) => {
            validate_website_url(&resource.url).map(|url| ResourceTarget::Website { url })
        }
        (ResourceKind::Repository, ResourceTarget::Website { .. }) => {
            Err(MonitorError::ValidationFailure(format!(
                "'{}' does not identify a repository",
                resource.url
            )))
        }
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_website_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| MonitorError::ValidationFailure(format!("invalid URL '{}': {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MonitorError::ValidationFailure(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(MonitorError::ValidationFailure(format!("URL '{}' has no host", raw)));
    }

    Ok(parsed.to_string())
}

/// Validate an owner/repo pair before it is interpolated into API paths
pub fn validate_repository(owner: &str, repo: &str) -> Result<()> {
    let valid = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && s != "."
            && s != ".."
    };

    if !valid(owner) || !valid(repo) {
        return Err(MonitorError::ValidationFailure(format!(
            "invalid repository identifier '{}/{}'",
            owner, repo
        )));
    }

    Ok(())
}

fn clean_repo_name(raw: &str) -> String {
    let repo = raw.split(['/', '?', '#']).next().unwrap_or("");
    repo.strip_suffix(".git").unwrap_or(repo).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(owner: &str, repo: &str) -> ResourceTarget {
        ResourceTarget::Repository {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    #[test]
    fn test_github_urls_classify_as_repositories() {
        assert_eq!(classify("https://github.com/rust-lang/rust").unwrap(), repo("rust-lang", "rust"));
        assert_eq!(
            classify("https://github.com/tokio-rs/tokio/tree/master/tokio").unwrap(),
            repo("tokio-rs", "tokio")
        );
        assert_eq!(classify("github.com/serde-rs/serde.git").unwrap(), repo("serde-rs", "serde"));
        assert_eq!(classify("  owner/name  ").unwrap(), repo("owner", "name"));
    }

    #[test]
    fn test_query_and_fragment_are_stripped() {
        assert_eq!(classify("https://github.com/a/b?tab=readme").unwrap(), repo("a", "b"));
        assert_eq!(classify("https://github.com/a/b#install").unwrap(), repo("a", "b"));
    }

    #[test]
    fn test_dotted_owner_is_a_website() {
        let target = classify("example.com/docs").unwrap();
        assert_eq!(
            target,
            ResourceTarget::Website {
                url: "https://example.com/docs".to_string()
            }
        );
        assert_eq!(target.display_name(), "example.com");
    }

    #[test]
    fn test_plain_host_gets_https_scheme() {
        let target = classify("example.org").unwrap();
        assert_eq!(target.canonical_url(), "https://example.org/");
        assert_eq!(target.kind(), ResourceKind::Website);
    }

    #[test]
    fn test_bare_github_host_is_rejected() {
        let err = classify("https://github.com/").unwrap_err();
        assert!(matches!(err, MonitorError::ValidationFailure(_)));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(classify("   "), Err(MonitorError::ValidationFailure(_))));
    }

    #[test]
    fn test_validate_repository_identifiers() {
        assert!(validate_repository("rust-lang", "rust").is_ok());
        assert!(validate_repository("a", "b.rs").is_ok());
        assert!(validate_repository("", "rust").is_err());
        assert!(validate_repository("a", "..").is_err());
        assert!(validate_repository("a b", "c").is_err());
    }

    #[test]
    fn test_validate_website_url_rejects_other_schemes() {
        assert!(validate_website_url("ftp://example.com").is_err());
        assert!(validate_website_url("not a url").is_err());
        assert!(validate_website_url("http://127.0.0.1:8080/health").is_ok());
    }

    #[test]
    fn test_target_for_keeps_declared_website_kind() {
        let resource = TrackedResource::new(
            "http://127.0.0.1:9000/status".to_string(),
            ResourceKind::Website,
            "local".to_string(),
        );
        assert_eq!(
            target_for(&resource).unwrap(),
            ResourceTarget::Website {
                url: "http://127.0.0.1:9000/status".to_string()
            }
        );
    }
}
