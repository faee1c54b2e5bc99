//! Failure classification for forwarded requests.

use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;

use super::request::RequestOptions;
use super::response::ForwardResult;

/// Error details the primary puts in failing response bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub error: Option<String>,
    pub stack_trace: Option<String>,
}

impl ErrorDetail {
    /// Extracts `error` and `errorStackTrace` from a JSON object body.
    ///
    /// Returns `None` when the body is not JSON or not an object.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let object = value.as_object()?;
        Some(Self {
            error: object.get("error").and_then(render),
            stack_trace: object.get("errorStackTrace").and_then(render),
        })
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Coarse class of a failing status, used to pick how callers react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    BadRequest,
    Unauthorized,
    AccessDenied,
    NotFound,
    Conflict,
    PreconditionFailed,
    InternalServerError,
    ServiceUnavailable,
    /// Any other failing status
    Http,
}

impl StatusCategory {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => StatusCategory::BadRequest,
            StatusCode::UNAUTHORIZED => StatusCategory::Unauthorized,
            StatusCode::FORBIDDEN => StatusCategory::AccessDenied,
            StatusCode::NOT_FOUND => StatusCategory::NotFound,
            StatusCode::CONFLICT => StatusCategory::Conflict,
            StatusCode::PRECONDITION_FAILED => StatusCategory::PreconditionFailed,
            StatusCode::INTERNAL_SERVER_ERROR => StatusCategory::InternalServerError,
            StatusCode::SERVICE_UNAVAILABLE => StatusCategory::ServiceUnavailable,
            _ => StatusCategory::Http,
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCategory::BadRequest => "Bad request",
            StatusCategory::Unauthorized => "Unauthorized",
            StatusCategory::AccessDenied => "Access denied",
            StatusCategory::NotFound => "Not found",
            StatusCategory::Conflict => "Conflict",
            StatusCategory::PreconditionFailed => "Precondition failed",
            StatusCategory::InternalServerError => "Internal server error",
            StatusCategory::ServiceUnavailable => "Service unavailable",
            StatusCategory::Http => "HTTP error",
        };
        f.write_str(name)
    }
}

/// The primary answered with a failing status.
#[derive(Debug, Clone)]
pub struct StatusError {
    pub category: StatusCategory,
    pub detail: Option<ErrorDetail>,
    /// The response exactly as received.
    pub response: ForwardResult,
}

impl StatusError {
    pub fn new(response: ForwardResult) -> Self {
        let detail = if response.body.is_empty() {
            None
        } else {
            ErrorDetail::from_body(&response.body)
        };
        Self {
            category: StatusCategory::from_status(response.status),
            detail,
            response,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    /// The outbound request could not be built.
    InvalidRequest,
    Other,
}

/// The primary could not be reached, or no request could be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportFailure,
    pub message: String,
}

impl TransportError {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportFailure::Timeout
        } else if error.is_connect() {
            TransportFailure::Connect
        } else {
            TransportFailure::Other
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    pub fn invalid_request(error: &anyhow::Error) -> Self {
        Self {
            kind: TransportFailure::InvalidRequest,
            message: format!("{:#}", error),
        }
    }

    /// Status reported to callers in place of a response from the primary.
    pub fn gateway_status(&self) -> StatusCode {
        match self.kind {
            TransportFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ForwardError {
    Status(StatusError),
    Transport(TransportError),
}

impl ForwardError {
    /// The status a caller should see for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Status(e) => e.status(),
            ForwardError::Transport(e) => e.gateway_status(),
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Status(e) => {
                write!(f, "{}: primary responded with {}", e.category, e.status())?;
                if let Some(error) = e.detail.as_ref().and_then(|d| d.error.as_deref()) {
                    write!(f, ": {}", error)?;
                }
                Ok(())
            }
            ForwardError::Transport(e) => match e.kind {
                TransportFailure::Timeout => {
                    write!(f, "Request to primary timed out: {}", e.message)
                }
                TransportFailure::Connect => {
                    write!(f, "Failed to connect to primary: {}", e.message)
                }
                TransportFailure::InvalidRequest => {
                    write!(f, "Invalid request for primary: {}", e.message)
                }
                TransportFailure::Other => write!(f, "Request to primary failed: {}", e.message),
            },
        }
    }
}

impl std::error::Error for ForwardError {}

/// Everything known about a failed forward, rendered as `key=value` pairs.
#[derive(Debug, Clone)]
pub struct FailureContext<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub status: Option<StatusCode>,
    pub options: RequestOptions,
    pub detail: Option<&'a ErrorDetail>,
    pub reason: Option<&'a str>,
}

impl fmt::Display for FailureContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method={} path={}", self.method, self.path)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status.as_u16())?;
        }
        if let Some(detail) = self.detail {
            write!(
                f,
                " error={} error_stack_trace={}",
                detail.error.as_deref().unwrap_or("None"),
                detail.stack_trace.as_deref().unwrap_or("None")
            )?;
        }
        if let Some(reason) = self.reason {
            write!(f, " reason={}", reason)?;
        }
        write!(f, " options={:?}", self.options)
    }
}
