//! Website probing over HTTP(S)

use crate::config::MonitorConfig;
use crate::errors::{classify_reqwest_error, MonitorError, Result};
use crate::models::{WebsiteMetrics, WebsitePerformance};
use crate::normalizer::{website_metrics_from_error, website_metrics_from_response};
use crate::resource::validate_website_url;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Result of one probe. `performance` is only present when a response arrived.
#[derive(Debug, Clone)]
pub struct WebsiteProbe {
    pub metrics: WebsiteMetrics,
    pub performance: Option<WebsitePerformance>,
}

/// Issues bounded-timeout HEAD probes against arbitrary URLs
#[derive(Debug, Clone)]
pub struct WebsitePoller {
    client: Client,
    timeout: Duration,
}

impl WebsitePoller {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.website_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self {
            client,
            timeout: config.website_timeout,
        })
    }

    /// Probe `url`. Network failures become a `down` result, never an error;
    /// only a malformed URL is rejected, before any request is made.
    #[instrument(skip(self))]
    pub async fn poll(&self, url: &str) -> Result<WebsiteProbe> {
        let url = validate_website_url(url)?;
        let start = Instant::now();

        let outcome = timeout(self.timeout, self.client.head(&url).send())
            .await
            .map_err(|_| MonitorError::Timeout)
            .and_then(|sent| sent.map_err(|e| classify_reqwest_error(&e)));
        let elapsed = start.elapsed();

        let probe = match outcome {
            Ok(response) => {
                let (metrics, performance) =
                    website_metrics_from_response(&url, response.status(), elapsed);
                debug!(
                    "Probe of {} returned {} in {}ms",
                    url,
                    response.status(),
                    elapsed.as_millis()
                );
                WebsiteProbe {
                    metrics,
                    performance: Some(performance),
                }
            }
            Err(e) => {
                debug!("Probe of {} failed after {}ms: {}", url, elapsed.as_millis(), e);
                WebsiteProbe {
                    metrics: website_metrics_from_error(&url, &e, elapsed),
                    performance: None,
                }
            }
        };

        Ok(probe)
    }
}
