//! Forwarding of primary-only requests.
//!
//! # Structure
//!
//! - `inbound` - What is read from the request being forwarded
//! - `request` - Inbound request to outbound options, and their wire form
//! - `response` - Primary results and the caller-facing translation
//! - `error` - Failure classification and log context
//! - `client` - The generic forward operation
//! - `endpoints` - Named operations layered over the generic one

mod client;
mod endpoints;
mod error;
mod inbound;
mod request;
mod response;

pub use client::PrimaryClient;
pub use endpoints::Endpoint;
pub use error::{
    ErrorDetail, FailureContext, ForwardError, StatusCategory, StatusError, TransportError,
    TransportFailure,
};
pub use inbound::{CapturedRequest, Cookies, InboundRequest, QueryParams};
pub use request::{JSON_MEDIA_TYPE, Payload, RequestOptions, WireRequest};
pub use response::{DecodedBody, ForwardResult, OutboundResponse};
