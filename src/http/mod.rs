//! HTTP transport for talking to the primary: pooled client, retry policy and
//! a case-insensitive header container.

mod headers;
mod retry;
mod transport;

pub use headers::Headers;
pub use retry::{
    BACKOFF_MAX, DEFAULT_RETRIES, RetryPolicy, is_idempotent, should_retry, with_retry,
};
pub use transport::{Transport, TransportResponse};
