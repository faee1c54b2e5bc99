//! Results received from the primary and their caller-facing translation.

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

use super::error::{ForwardError, TransportError};
use super::request::JSON_MEDIA_TYPE;
use crate::http::{Headers, TransportResponse};

/// A response exactly as the primary sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ForwardResult {
    /// Stand-in for a response when the primary could not be reached.
    pub fn gateway_failure(error: &TransportError) -> Self {
        let body = json!({ "error": error.message }).to_string().into_bytes();
        let mut headers = Headers::new();
        headers.insert("content-type", JSON_MEDIA_TYPE);
        Self {
            status: error.gateway_status(),
            headers,
            body,
        }
    }

    /// Anything below 400 counts as success.
    pub fn is_success(&self) -> bool {
        self.status.as_u16() < 400
    }

    /// Best-effort JSON decode of the body.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body as JSON if possible, otherwise as text. Only used for logging.
    pub fn decode(&self) -> DecodedBody {
        match self.json() {
            Some(value) => DecodedBody::Json(value),
            None => DecodedBody::Text(self.text()),
        }
    }
}

impl From<TransportResponse> for ForwardResult {
    fn from(response: TransportResponse) -> Self {
        Self {
            status: response.status,
            headers: Headers::from_header_map(&response.headers),
            body: response.body,
        }
    }
}

impl From<ForwardError> for ForwardResult {
    fn from(error: ForwardError) -> Self {
        match error {
            ForwardError::Status(e) => e.response,
            ForwardError::Transport(e) => ForwardResult::gateway_failure(&e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Json(Value),
    Text(String),
}

impl fmt::Display for DecodedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedBody::Json(value) => write!(f, "{}", value),
            DecodedBody::Text(text) => write!(f, "{:?}", text),
        }
    }
}

/// The response handed back to the original caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub media_type: &'static str,
}

impl OutboundResponse {
    /// Passes status, headers and body through untouched, except that the
    /// content type is always JSON: every endpoint of the primary, including
    /// its error handlers, answers with JSON.
    pub fn from_result(result: &ForwardResult) -> Self {
        let mut headers = result.headers.clone();
        headers.insert("content-type", JSON_MEDIA_TYPE);

        Self {
            status: result.status,
            headers: headers.flatten(),
            body: result.body.clone(),
            media_type: JSON_MEDIA_TYPE,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

impl From<ForwardResult> for OutboundResponse {
    fn from(result: ForwardResult) -> Self {
        OutboundResponse::from_result(&result)
    }
}
