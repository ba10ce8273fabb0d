//! Host allow-lists.
//!
//! A list is a comma separated setting made of builtin network classes,
//! CIDR blocks and host name globs:
//!
//! ```text
//! external, 10.0.0.0/8, *.ci.example.com
//! ```

use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;
use thiserror::Error;

/// Every host and address.
pub const MATCH_ALL: &str = "*";
/// Loopback addresses.
pub const MATCH_LOOPBACK: &str = "loopback";
/// Private address ranges (RFC 1918, unique local IPv6).
pub const MATCH_PRIVATE: &str = "private";
/// Global unicast addresses that are not private.
pub const MATCH_EXTERNAL: &str = "external";

#[derive(Debug, Error)]
#[error("invalid host pattern '{pattern}' in {setting}: {source}")]
pub struct HostMatchError {
    pub setting: String,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    All,
    Loopback,
    Private,
    External,
}

/// A parsed allow-list.
#[derive(Debug, Clone)]
pub struct HostMatchList {
    setting_key: String,
    builtins: Vec<Builtin>,
    networks: Vec<IpNet>,
    patterns: Vec<Regex>,
}

impl HostMatchList {
    /// Parses the comma separated `value`, attributing errors to `setting_key`.
    ///
    /// An empty value allows external hosts only.
    ///
    /// # Errors
    ///
    /// Returns [`HostMatchError`] for a glob that cannot be compiled.
    pub fn parse(setting_key: impl Into<String>, value: &str) -> Result<Self, HostMatchError> {
        let mut list = Self {
            setting_key: setting_key.into(),
            builtins: Vec::new(),
            networks: Vec::new(),
            patterns: Vec::new(),
        };

        for entry in value.split(',') {
            let entry = entry.trim().to_ascii_lowercase();
            match entry.as_str() {
                "" => {}
                MATCH_ALL => list.builtins.push(Builtin::All),
                MATCH_LOOPBACK => list.builtins.push(Builtin::Loopback),
                MATCH_PRIVATE => list.builtins.push(Builtin::Private),
                MATCH_EXTERNAL => list.builtins.push(Builtin::External),
                other => {
                    if let Ok(net) = other.parse::<IpNet>() {
                        list.networks.push(net);
                        continue;
                    }
                    let pattern = glob_to_regex(other).map_err(|source| HostMatchError {
                        setting: list.setting_key.clone(),
                        pattern: other.to_string(),
                        source,
                    })?;
                    list.patterns.push(pattern);
                }
            }
        }

        if list.builtins.is_empty() && list.networks.is_empty() && list.patterns.is_empty() {
            list.builtins.push(Builtin::External);
        }
        Ok(list)
    }

    /// Name of the setting this list came from, used in denial messages.
    #[must_use]
    pub fn setting_key(&self) -> &str {
        &self.setting_key
    }

    /// Matches a host, optionally with a port, by name and then by address
    /// when the host is a literal IP.
    #[must_use]
    pub fn match_host_name(&self, host: &str) -> bool {
        let host = strip_port(host);
        if self.builtins.contains(&Builtin::All) {
            return true;
        }
        if self.patterns.iter().any(|p| p.is_match(host)) {
            return true;
        }
        host.parse::<IpAddr>().is_ok_and(|ip| self.match_ip(ip))
    }

    /// Host name globs only, without address rules.
    #[must_use]
    pub fn match_pattern(&self, host: &str) -> bool {
        let host = strip_port(host);
        self.builtins.contains(&Builtin::All) || self.patterns.iter().any(|p| p.is_match(host))
    }

    /// Matches a resolved address against builtins and CIDR blocks.
    #[must_use]
    pub fn match_ip(&self, ip: IpAddr) -> bool {
        let ip = canonical_ip(ip);
        let builtin = self.builtins.iter().any(|b| match b {
            Builtin::All => true,
            Builtin::Loopback => ip.is_loopback(),
            Builtin::Private => is_private(ip),
            Builtin::External => is_global_unicast(ip) && !is_private(ip),
        });
        builtin || self.networks.iter().any(|net| net.contains(&ip))
    }
}

/// Compiles a host glob into an anchored, case-insensitive regex.
///
/// `*` matches any run of characters (dots included), `?` one character,
/// and `{a,b}` either alternative.
///
/// # Errors
///
/// Returns the regex error for unbalanced braces.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("(?i)^");
    let mut depth = 0usize;
    let mut buf = [0u8; 4];
    for ch in glob.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '{' => {
                depth += 1;
                re.push_str("(?:");
            }
            '}' if depth > 0 => {
                depth -= 1;
                re.push(')');
            }
            ',' if depth > 0 => re.push('|'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    // An unclosed `{` leaves a group open and fails to compile.
    re.push('$');
    Regex::new(&re)
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}

/// IPv4-mapped IPv6 addresses are classified as IPv4.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            !(v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_multicast()
                || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}
