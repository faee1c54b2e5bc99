use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::Method;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::error::{FailureContext, ForwardError, StatusError, TransportError};
use super::inbound::InboundRequest;
use super::request::{Payload, RequestOptions};
use super::response::{ForwardResult, OutboundResponse};
use crate::config::ProxyConfig;
use crate::http::Transport;

static GLOBAL: OnceCell<PrimaryClient> = OnceCell::const_new();

/// Forwards requests from this instance to the primary instance.
///
/// Every instance of the service exposes the same API, but some operations
/// (scheduling, migrations, ...) only the primary can carry out. Handlers for
/// those operations hand the inbound request to this client, which replays it
/// against the primary and returns the primary's answer unchanged.
///
/// Clones share the connection pool.
#[derive(Clone)]
pub struct PrimaryClient {
    transport: Transport,
    api_url: String,
    api_version: String,
    timeout: Duration,
}

impl PrimaryClient {
    #[tracing::instrument(skip(config))]
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::new(config.max_workers, config.retry)
            .context("Failed to set up transport to primary")?;
        Ok(Self::with_transport(transport, config))
    }

    /// Uses a prepared transport; `config` only supplies addressing and the
    /// default timeout.
    pub fn with_transport(transport: Transport, config: &ProxyConfig) -> Self {
        Self {
            transport,
            api_url: config.normalized_api_url().to_string(),
            api_version: config.api_version.clone(),
            timeout: config.timeout,
        }
    }

    /// Creates the process-wide client, or returns the one already created.
    ///
    /// Concurrent callers wait for a single construction. A failed
    /// construction is reported to its caller and leaves the slot empty.
    pub async fn init_global(config: &ProxyConfig) -> Result<&'static PrimaryClient> {
        GLOBAL
            .get_or_try_init(|| async {
                let client = PrimaryClient::new(config)?;
                info!("Forwarding primary-only requests to {}", client.api_url);
                Ok::<_, anyhow::Error>(client)
            })
            .await
    }

    /// The process-wide client, if [`PrimaryClient::init_global`] succeeded.
    pub fn global() -> Option<&'static PrimaryClient> {
        GLOBAL.get()
    }

    /// Full URL for an endpoint path such as `projects/p1/schedules`.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.api_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Forwards a request and translates the answer for the original caller.
    ///
    /// Failures never escape: the caller gets the primary's failing response
    /// as is, or a gateway status when the primary could not be reached.
    pub async fn proxy(
        &self,
        method: Method,
        path: &str,
        inbound: Option<&dyn InboundRequest>,
        body: Option<Payload>,
    ) -> OutboundResponse {
        let result = self
            .forward(method, path, inbound, body, false)
            .await
            .unwrap_or_else(ForwardResult::from);
        OutboundResponse::from_result(&result)
    }

    /// Sends one request to the primary.
    ///
    /// Connection failures are retried by the transport; a response from the
    /// primary is never retried. With `raise_on_failure` unset a failing
    /// status comes back as `Ok`, and an unreachable primary as a synthetic
    /// 502/504 result. With it set both become a [`ForwardError`].
    #[tracing::instrument(skip(self, inbound, body))]
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        inbound: Option<&dyn InboundRequest>,
        body: Option<Payload>,
        raise_on_failure: bool,
    ) -> Result<ForwardResult, ForwardError> {
        let url = self.url_for(path);
        let options = RequestOptions::from_inbound(inbound, body).or_timeout(self.timeout);

        let kind = if options.is_internal() {
            "internal"
        } else {
            "forwarded"
        };
        debug!(
            "Sending {} request to primary: method={} url={} options={:?}",
            kind, method, url, options
        );

        let sent = match options.to_wire() {
            Ok(wire) => self
                .transport
                .send(&method, &url, |builder| wire.apply(builder))
                .await
                .map_err(|e| TransportError::from_reqwest(&e)),
            Err(e) => Err(TransportError::invalid_request(&e)),
        };

        let result = match sent {
            Ok(response) => ForwardResult::from(response),
            Err(error) => {
                let context = FailureContext {
                    method: method.as_str(),
                    path,
                    status: None,
                    options,
                    detail: None,
                    reason: Some(error.message.as_str()),
                };
                warn!("Request to primary failed: {}", context);
                if raise_on_failure {
                    return Err(ForwardError::Transport(error));
                }
                return Ok(ForwardResult::gateway_failure(&error));
            }
        };

        if !result.is_success() {
            let error = StatusError::new(result);
            let context = FailureContext {
                method: method.as_str(),
                path,
                status: Some(error.status()),
                options,
                detail: error.detail.as_ref(),
                reason: None,
            };
            warn!("Request to primary failed: {}", context);
            if raise_on_failure {
                return Err(ForwardError::Status(error));
            }
            return Ok(error.response);
        }

        debug!(
            "Request to primary succeeded: method={} url={} options={:?} response={}",
            method,
            url,
            options,
            result.decode()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use crate::proxy::error::{StatusCategory, TransportFailure};
    use crate::proxy::inbound::CapturedRequest;
    use crate::test_utils::test_config;
    use mockito::Matcher;
    use reqwest::StatusCode;
    use serde_json::json;

    fn client_for(url: &str) -> PrimaryClient {
        PrimaryClient::new(&test_config(url)).unwrap()
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_url_for_has_no_double_slashes() {
        for base in ["http://primary:8080", "http://primary:8080/"] {
            let client = client_for(base);
            assert_eq!(
                client.url_for("projects/p1/schedules"),
                "http://primary:8080/api/v1/projects/p1/schedules"
            );
            assert_eq!(
                client.url_for("/submit_job"),
                "http://primary:8080/api/v1/submit_job"
            );
        }
    }

    #[test]
    fn test_url_for_uses_configured_version() {
        let config = test_config("https://primary").with_api_version("v2");
        let client = PrimaryClient::new(&config).unwrap();
        assert_eq!(
            client.url_for("build/function"),
            "https://primary/api/v2/build/function"
        );
    }

    #[test]
    fn test_new_fails_fast_on_bad_url() {
        let result = PrimaryClient::new(&ProxyConfig::new("::not-a-url::"));
        assert!(result.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_forward_success_returns_raw_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/background-tasks/task-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-served-by", "primary")
            .with_body(r#"{"metadata": {"name": "task-1"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .forward(Method::GET, "background-tasks/task-1", None, None, false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.headers.get("X-Served-By"), Some("primary"));
        assert_eq!(result.body, br#"{"metadata": {"name": "task-1"}}"#);
    }

    #[tokio::test]
    async fn test_forward_copies_inbound_context() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/projects/p1/schedules")
            .match_header("authorization", "Bearer secret")
            .match_header("x-request-id", "r-9")
            .match_header("cookie", "session=s1")
            .match_header("content-type", "application/json")
            .match_query(Matcher::UrlEncoded("dry_run".into(), "true".into()))
            .match_body(Matcher::Json(json!({"name": "nightly"})))
            .with_status(200)
            .create_async()
            .await;

        let request = CapturedRequest::new()
            .with_header("Authorization", "Bearer secret")
            .with_header("X-Request-Id", "r-9")
            .with_query("dry_run", "true")
            .with_cookie("session", "s1");

        let client = client_for(&server.url());
        let result = client
            .forward(
                Method::POST,
                "projects/p1/schedules",
                Some(&request),
                Some(payload(json!({"name": "nightly"}))),
                false,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forward_without_context_sends_nothing_extra() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/operations/migrations")
            .match_header("authorization", Matcher::Missing)
            .match_header("cookie", Matcher::Missing)
            .match_body(Matcher::Exact(String::new()))
            .with_status(202)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .forward(Method::POST, "operations/migrations", None, None, false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_forward_failure_passes_through() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"error":"boom","errorStackTrace":"..."}"#;
        let mock = server
            .mock("POST", "/api/v1/submit_job")
            .with_status(500)
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .forward(Method::POST, "submit_job", None, None, false)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(result.body, body.as_bytes());
    }

    #[tokio::test]
    async fn test_forward_failure_raises_when_asked() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/v1/projects/p1")
            .with_status(412)
            .with_body(r#"{"error":"project has resources"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .forward(Method::DELETE, "projects/p1", None, None, true)
            .await
            .unwrap_err();

        match err {
            ForwardError::Status(e) => {
                assert_eq!(e.status(), StatusCode::PRECONDITION_FAILED);
                assert_eq!(e.category, StatusCategory::PreconditionFailed);
                assert_eq!(
                    e.detail.unwrap().error.as_deref(),
                    Some("project has resources")
                );
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_failure_with_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/background-tasks/t")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .forward(Method::GET, "background-tasks/t", None, None, true)
            .await
            .unwrap_err();

        match err {
            ForwardError::Status(e) => {
                assert!(e.detail.is_none());
                assert_eq!(e.response.text(), "<html>bad gateway</html>");
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_no_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/v1/projects/p1/schedules")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .forward(Method::DELETE, "projects/p1/schedules", None, None, false)
            .await
            .unwrap();

        assert_eq!(result.status, StatusCode::NO_CONTENT);
        assert!(result.body.is_empty());
    }

    #[tokio::test]
    async fn test_forward_unreachable_primary() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));

        let result = client
            .forward(Method::GET, "background-tasks/t", None, None, false)
            .await
            .unwrap();
        assert_eq!(result.status, StatusCode::BAD_GATEWAY);
        assert!(result.json().unwrap()["error"].is_string());

        let err = client
            .forward(Method::GET, "background-tasks/t", None, None, true)
            .await
            .unwrap_err();
        match err {
            ForwardError::Transport(e) => assert_eq!(e.kind, TransportFailure::Connect),
            other => panic!("Expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forward_timeout_maps_to_gateway_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = test_config(&format!("http://{}", addr))
            .with_timeout(Duration::from_millis(100))
            .with_retry(RetryPolicy::none());
        let client = PrimaryClient::new(&config).unwrap();

        let result = client
            .forward(Method::POST, "submit_job", None, None, false)
            .await
            .unwrap();
        assert_eq!(result.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_forward_invalid_header_is_a_gateway_failure() {
        let client = client_for("http://127.0.0.1:9");
        let request = CapturedRequest::new().with_header("bad name", "v");

        let result = client
            .forward(
                Method::GET,
                "background-tasks/t",
                Some(&request),
                None,
                false,
            )
            .await
            .unwrap();
        assert_eq!(result.status, StatusCode::BAD_GATEWAY);

        let err = client
            .forward(
                Method::GET,
                "background-tasks/t",
                Some(&request),
                None,
                true,
            )
            .await
            .unwrap_err();
        match err {
            ForwardError::Transport(e) => assert_eq!(e.kind, TransportFailure::InvalidRequest),
            other => panic!("Expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proxy_translates_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/background-tasks/t")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_header("x", "y")
            .with_body(r#"{"a":1}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let response = client
            .proxy(Method::GET, "background-tasks/t", None, None)
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, br#"{"a":1}"#);
        assert_eq!(response.headers.get("x").map(String::as_str), Some("y"));
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_init_global_constructs_once() {
        let config = test_config("http://primary-one");
        let other = test_config("http://primary-two");

        let (first, second) = tokio::join!(
            PrimaryClient::init_global(&config),
            PrimaryClient::init_global(&other)
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, PrimaryClient::global().unwrap()));
    }
}
