pub mod cli;
pub mod config;
pub mod http;
pub mod proxy;

pub use config::ProxyConfig;
pub use proxy::{ForwardError, ForwardResult, OutboundResponse, PrimaryClient};
