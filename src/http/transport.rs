//! Pooled HTTP transport with built-in retry for connection failures.

use anyhow::{Context, Result};
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode};

use super::retry::{RetryPolicy, is_idempotent, should_retry, with_retry};

/// A fully received response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Shared transport for every request sent to the primary.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    retry: RetryPolicy,
}

impl Transport {
    /// Builds the pooled client.
    ///
    /// Certificate verification is disabled: the primary is reached over the
    /// internal network and commonly serves a self-signed certificate.
    pub fn new(max_idle_per_host: usize, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("primary-proxy/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(max_idle_per_host)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, retry))
    }

    /// Wraps an existing reqwest Client.
    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Sends a request and reads the whole body.
    ///
    /// `build` is called once per attempt to decorate a fresh request, so it
    /// must not consume anything it needs for a later attempt.
    pub async fn send<F>(
        &self,
        method: &Method,
        url: &str,
        build: F,
    ) -> Result<TransportResponse, reqwest::Error>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let idempotent = is_idempotent(method);
        let operation_name = format!("{} {}", method, url);

        with_retry(
            &self.retry,
            &operation_name,
            |e: &reqwest::Error| should_retry(e, idempotent),
            || async {
                let response = build(self.client.request(method.clone(), url)).send().await?;

                let status = response.status();
                let headers = response.headers().clone();
                let body = response.bytes().await?.to_vec();

                debug!(
                    "{} answered {} ({} bytes)",
                    operation_name,
                    status,
                    body.len()
                );

                Ok(TransportResponse {
                    status,
                    headers,
                    body,
                })
            },
        )
        .await
    }
}
