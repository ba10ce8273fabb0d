//! HTTP transport for deliveries.
//!
//! This module provides:
//! - Request and response value types ([`HttpRequest`], [`HttpResponse`])
//! - The client abstraction ([`HttpClient`]) and its reqwest implementation
//!   ([`ReqwestClient`])
//! - Proxy routing ([`ProxyPolicy`]) and host allow-lists ([`HostMatchList`])

mod client;
mod error;
mod hostmatch;
mod http;
mod proxy;

#[cfg(test)]
pub mod mock;

#[cfg(test)]
mod hostmatch_tests;
#[cfg(test)]
mod test_server;

pub use client::{ALLOWED_HOST_LIST_SETTING, ReqwestClient, TransportConfig};
pub use error::{HttpError, TransportError};
pub use hostmatch::{
    HostMatchError, HostMatchList, MATCH_ALL, MATCH_EXTERNAL, MATCH_LOOPBACK, MATCH_PRIVATE,
    glob_to_regex,
};
pub use http::{HttpClient, HttpRequest, HttpResponse, header_record};
pub use proxy::{ProxyPolicy, ProxyRoute, host_with_port};
