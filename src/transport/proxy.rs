//! Outbound proxy routing.

use regex::Regex;
use tracing::warn;
use url::Url;

use super::hostmatch::{HostMatchList, glob_to_regex};
use super::HttpError;

/// Where a request should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyRoute {
    /// The client's default routing, including environment proxies.
    Environment,
    /// Through the configured webhook proxy.
    Proxy(Url),
}

/// Decides per destination whether to use the webhook proxy.
///
/// Built once at startup and shared read-only by every delivery.
#[derive(Debug, Clone)]
pub struct ProxyPolicy {
    proxy_url: Option<Url>,
    host_patterns: Vec<Regex>,
    allow_list: HostMatchList,
}

impl ProxyPolicy {
    /// Creates a policy routing hosts matching `proxy_hosts` through
    /// `proxy_url`.
    ///
    /// Globs that fail to compile are logged and ignored.
    #[must_use]
    pub fn new(proxy_url: Option<Url>, proxy_hosts: &[String], allow_list: HostMatchList) -> Self {
        let host_patterns = proxy_hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .filter_map(|glob| match glob_to_regex(glob) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = glob, error = %e, "Ignoring invalid proxy host pattern");
                    None
                }
            })
            .collect();

        Self {
            proxy_url,
            host_patterns,
            allow_list,
        }
    }

    /// The allow-list applied to proxied hosts.
    #[must_use]
    pub const fn allow_list(&self) -> &HostMatchList {
        &self.allow_list
    }

    /// Routes `url`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::PolicyViolation`] when the host is configured for
    /// the proxy but not present in the allow-list.
    pub fn route(&self, url: &Url) -> Result<ProxyRoute, HttpError> {
        let Some(proxy_url) = &self.proxy_url else {
            return Ok(ProxyRoute::Environment);
        };

        let host = host_with_port(url);
        if !self.host_patterns.iter().any(|p| p.is_match(&host)) {
            return Ok(ProxyRoute::Environment);
        }

        if !self.allow_list.match_host_name(&host) {
            return Err(HttpError::PolicyViolation {
                setting: self.allow_list.setting_key().to_string(),
                host,
            });
        }

        Ok(ProxyRoute::Proxy(proxy_url.clone()))
    }

    #[must_use]
    pub const fn proxy_url(&self) -> Option<&Url> {
        self.proxy_url.as_ref()
    }
}

/// The URL authority without user info, e.g. `example.com:8443`.
#[must_use]
pub fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
