//! Production HTTP client implementation using reqwest.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::{Attempt, Policy};
use tracing::debug;
use url::{Host, Url};

use super::hostmatch::HostMatchList;
use super::proxy::{ProxyPolicy, ProxyRoute, host_with_port};
use super::{HttpClient, HttpError, HttpRequest, HttpResponse, TransportError};

/// Settings for the shared delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
    /// Webhook proxy, if any.
    pub proxy_url: Option<Url>,
    /// Host globs routed through `proxy_url`.
    pub proxy_hosts: Vec<String>,
    /// Comma separated allow-list, e.g. `external,*.ci.example.com`.
    pub allowed_host_list: String,
}

/// Setting name reported when the allow-list denies a host.
pub const ALLOWED_HOST_LIST_SETTING: &str = "transport.allowed_host_list";

/// Redirects followed before a delivery fails.
const MAX_REDIRECTS: usize = 10;

/// Production HTTP client using reqwest.
///
/// Holds two `reqwest::Client`s built at startup with the delivery timeout
/// and TLS policy:
/// - `direct` keeps reqwest's environment proxy handling and resolves names
///   through the allow-list, so every address it connects to is checked,
///   on redirects too.
/// - `proxied` exists when a webhook proxy is configured and sends
///   everything through it. Its hosts are checked by name.
///
/// Redirects may not move a delivery from one route to the other.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use forge_hooks::transport::{HttpClient, HttpRequest, ReqwestClient, TransportConfig};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ReqwestClient::from_config(&TransportConfig {
///     timeout: Duration::from_secs(5),
///     skip_tls_verify: false,
///     proxy_url: None,
///     proxy_hosts: Vec::new(),
///     allowed_host_list: "external".into(),
/// })?;
/// let url = Url::parse("https://ci.example.com/hook")?;
/// let response = client.request(HttpRequest::post(url).with_body(b"{}".to_vec())).await?;
/// println!("Status: {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
    policy: Arc<ProxyPolicy>,
}

impl ReqwestClient {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the allow-list does not parse or the
    /// underlying client cannot be constructed.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let allow_list =
            HostMatchList::parse(ALLOWED_HOST_LIST_SETTING, &config.allowed_host_list)?;
        let policy = Arc::new(ProxyPolicy::new(
            config.proxy_url.clone(),
            &config.proxy_hosts,
            allow_list,
        ));

        let builder = || {
            reqwest::Client::builder()
                .timeout(config.timeout)
                .danger_accept_invalid_certs(config.skip_tls_verify)
        };

        let direct = builder()
            .dns_resolver(Arc::new(AllowListResolver {
                policy: Arc::clone(&policy),
            }))
            .redirect(redirect_policy(Arc::clone(&policy), RouteKind::Direct))
            .build()
            .map_err(TransportError::Client)?;

        let proxied = match policy.proxy_url() {
            Some(proxy_url) => Some(
                builder()
                    .proxy(reqwest::Proxy::all(proxy_url.as_str()).map_err(TransportError::Client)?)
                    .redirect(redirect_policy(Arc::clone(&policy), RouteKind::Proxied))
                    .build()
                    .map_err(TransportError::Client)?,
            ),
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            policy,
        })
    }

    /// Picks the client for `url`, rejecting destinations that can be
    /// judged without a lookup.
    fn client_for(&self, url: &Url) -> Result<&reqwest::Client, HttpError> {
        match (self.policy.route(url)?, &self.proxied) {
            (ProxyRoute::Proxy(proxy), Some(client)) => {
                debug!(url = %url, proxy = %proxy, "Routing delivery through proxy");
                Ok(client)
            }
            _ => {
                check_literal(self.policy.allow_list(), url)?;
                Ok(&self.direct)
            }
        }
    }
}

impl HttpClient for ReqwestClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let client = self.client_for(&req.url)?;
        let mut builder = client.request(req.method, req.url.as_str());

        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if let Some(denied) = policy_violation(&e) {
                denied
            } else if e.is_timeout() {
                HttpError::Timeout
            } else if e.is_builder() {
                HttpError::InvalidUrl(e.to_string())
            } else {
                HttpError::Connection(Box::new(e))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::ReadBody(Box::new(e)))?
            .to_vec();

        Ok(HttpResponse::new(status, headers, body))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Direct,
    Proxied,
}

/// Denies a literal IP host outside the allow-list. Names are left to the
/// resolver.
fn check_literal(allow_list: &HostMatchList, url: &Url) -> Result<(), HttpError> {
    match url.host() {
        None => Err(HttpError::InvalidUrl(format!("{url} has no host"))),
        Some(Host::Domain(_)) => Ok(()),
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => {
            let host = host_with_port(url);
            if allow_list.match_host_name(&host) {
                Ok(())
            } else {
                Err(HttpError::PolicyViolation {
                    setting: allow_list.setting_key().to_string(),
                    host,
                })
            }
        }
    }
}

/// Follows a redirect only when its target is allowed on the same route.
///
/// A target that would need the other route stops the chain and the
/// redirect response itself is recorded.
fn redirect_policy(policy: Arc<ProxyPolicy>, kind: RouteKind) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let url = attempt.url().clone();
        let screened = match (policy.route(&url), kind) {
            (Err(denied), _) => Err(denied),
            (Ok(ProxyRoute::Proxy(_)), RouteKind::Proxied) => Ok(true),
            (Ok(ProxyRoute::Environment), RouteKind::Direct) => {
                check_literal(policy.allow_list(), &url).map(|()| true)
            }
            (Ok(_), _) => Ok(false),
        };

        match screened {
            Ok(true) => attempt.follow(),
            Ok(false) => {
                debug!(url = %url, "Not following redirect across proxy routes");
                attempt.stop()
            }
            Err(denied) => attempt.error(denied),
        }
    })
}

/// Resolves host names and drops addresses outside the allow-list.
///
/// Used for every connection of the direct client, including redirects
/// and environment proxies. A name matching a host glob of the list is
/// trusted with all of its addresses.
#[derive(Debug)]
struct AllowListResolver {
    policy: Arc<ProxyPolicy>,
}

impl Resolve for AllowListResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_allowed(
            Arc::clone(&self.policy),
            name.as_str().to_string(),
        ))
    }
}

async fn resolve_allowed(
    policy: Arc<ProxyPolicy>,
    host: String,
) -> Result<Addrs, Box<dyn StdError + Send + Sync>> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();

    let allow_list = policy.allow_list();
    let allowed: Vec<SocketAddr> = if allow_list.match_pattern(&host) {
        resolved
    } else {
        resolved
            .into_iter()
            .filter(|addr| allow_list.match_ip(addr.ip()))
            .collect()
    };

    if allowed.is_empty() {
        debug!(host = %host, "No allowed address for host");
        return Err(Box::new(HttpError::PolicyViolation {
            setting: allow_list.setting_key().to_string(),
            host,
        }));
    }
    Ok(Box::new(allowed.into_iter()))
}

/// Finds a denial raised by the resolver or the redirect policy inside a
/// reqwest error.
fn policy_violation(err: &reqwest::Error) -> Option<HttpError> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(HttpError::PolicyViolation { setting, host }) = cause.downcast_ref::<HttpError>()
        {
            return Some(HttpError::PolicyViolation {
                setting: setting.clone(),
                host: host.clone(),
            });
        }
        source = cause.source();
    }
    None
}
