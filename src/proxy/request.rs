//! Translation of an inbound request into outbound request options.

use anyhow::{Context, Result};
use reqwest::RequestBuilder;
use reqwest::header::HeaderMap;
use std::time::Duration;

use super::inbound::{Cookies, InboundRequest, QueryParams};
use crate::http::Headers;

/// Structured key-value request body.
pub type Payload = serde_json::Map<String, serde_json::Value>;

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Options for one outbound call. `None` means "not given at all", which
/// differs from an empty value only in what gets logged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub body: Option<Payload>,
    pub headers: Option<Headers>,
    pub params: Option<QueryParams>,
    pub cookies: Option<Cookies>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Builds the options for forwarding `inbound`.
    ///
    /// Without an inbound request nothing is forwarded, not even `body`.
    /// With one, headers, query parameters and cookies are copied as they are
    /// and the body defaults to an empty payload.
    pub fn from_inbound(inbound: Option<&dyn InboundRequest>, body: Option<Payload>) -> Self {
        match inbound {
            None => Self::default(),
            Some(request) => Self {
                body: Some(body.unwrap_or_default()),
                headers: Some(request.headers().clone()),
                params: Some(request.query_params().clone()),
                cookies: Some(request.cookies().clone()),
                timeout: None,
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout unless one is already present.
    pub fn or_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    /// True when no caller context is carried.
    pub fn is_internal(&self) -> bool {
        self.body.is_none()
            && self.headers.is_none()
            && self.params.is_none()
            && self.cookies.is_none()
    }

    /// Encodes the options for the wire.
    pub fn to_wire(&self) -> Result<WireRequest> {
        let mut headers = self.headers.clone().unwrap_or_default();
        // Framing is recomputed for the body actually sent
        headers.remove("content-length");
        headers.remove("transfer-encoding");

        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            if !headers.contains("cookie") {
                headers.insert("Cookie", cookie_header(cookies));
            }
        }

        let body = match self.body.as_ref().filter(|b| !b.is_empty()) {
            Some(payload) => {
                if !headers.contains("content-type") {
                    headers.insert("Content-Type", JSON_MEDIA_TYPE);
                }
                let encoded = serde_json::to_vec(payload)
                    .context("Failed to encode request body")?;
                Some(encoded)
            }
            None => None,
        };

        Ok(WireRequest {
            headers: headers.to_header_map()?,
            query: self.params.clone().unwrap_or_default(),
            body,
            timeout: self.timeout,
        })
    }
}

fn cookie_header(cookies: &Cookies) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Request options in transport form, reusable across retry attempts.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub headers: HeaderMap,
    pub query: QueryParams,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl WireRequest {
    pub fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if !self.headers.is_empty() {
            builder = builder.headers(self.headers.clone());
        }
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}
