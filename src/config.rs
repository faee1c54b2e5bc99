//! Resolved settings for reaching the primary instance.

use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::time::Duration;

use crate::http::RetryPolicy;

pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_MAX_WORKERS: usize = 64;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything the client needs, already resolved by the hosting service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Base URL of the primary, e.g. `http://primary:8080`.
    pub api_url: String,
    /// Version segment placed after `/api/` in every outbound path.
    pub api_version: String,
    /// Bound on pooled connections, matching the service's worker count.
    pub max_workers: usize,
    /// Applied to requests that do not carry their own timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ProxyConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The base URL with exactly one trailing slash removed, if present.
    pub fn normalized_api_url(&self) -> &str {
        self.api_url.strip_suffix('/').unwrap_or(&self.api_url)
    }

    /// Checks the settings before any connection is made.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(self.normalized_api_url())
            .with_context(|| format!("Invalid primary API URL '{}'", self.api_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "Unsupported scheme '{}' in primary API URL '{}'",
                url.scheme(),
                self.api_url
            );
        }
        if self.api_version.is_empty() || self.api_version.contains('/') {
            bail!("Invalid API version '{}'", self.api_version);
        }
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        Ok(())
    }
}
