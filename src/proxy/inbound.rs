use std::collections::BTreeMap;

use crate::http::Headers;

/// Query parameters in arrival order. Repeated keys are kept.
pub type QueryParams = Vec<(String, String)>;

pub type Cookies = BTreeMap<String, String>;

/// What the proxy needs to know about the request being forwarded.
///
/// Implemented by the hosting web framework's request type.
#[cfg_attr(test, mockall::automock)]
pub trait InboundRequest: Send + Sync {
    fn headers(&self) -> &Headers;
    fn query_params(&self) -> &QueryParams;
    fn cookies(&self) -> &Cookies;
}

/// An owned snapshot of an inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedRequest {
    pub headers: Headers,
    pub query: QueryParams,
    pub cookies: Cookies,
}

impl CapturedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.query.is_empty() && self.cookies.is_empty()
    }
}

impl InboundRequest for CapturedRequest {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn query_params(&self) -> &QueryParams {
        &self.query
    }

    fn cookies(&self) -> &Cookies {
        &self.cookies
    }
}
