//! SSRF allow-list, grounded on the teacher's
//! `enterprise/security/protection.rs` pattern-matching-rule shape, retargeted
//! from DLP pattern scanning to outbound-URL admission control.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

/// Ports permitted for outbound requests, beyond each scheme's own default.
const ALLOWED_PORTS: [u16; 4] = [80, 443, 8080, 8443];

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

const BLOCKED_SCHEMES: [&str; 7] = ["file", "ftp", "gopher", "dict", "sftp", "ldap", "jar"];

static WILDCARD_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\.(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsrfViolation {
    BlockedScheme,
    DomainNotAllowed,
    PortNotAllowed,
    PrivateOrReservedAddress,
    DnsRebindDetected,
}

/// Outbound-HTTP admission control: fixed domain allow-list, scheme/port
/// restriction, and a DNS-rebinding cache that re-validates resolved IPs
/// against the block-list for a 5-minute window.
pub struct SsrfGuard {
    allowed_domains: HashSet<String>,
    allowed_wildcard_suffixes: Vec<String>,
    dns_cache: DashMap<String, CachedResolution>,
    dns_cache_ttl: Duration,
}

struct CachedResolution {
    ips: Arc<Vec<IpAddr>>,
    resolved_at: Instant,
}

impl SsrfGuard {
    pub fn new(allow_list: impl IntoIterator<Item = String>) -> Self {
        let mut allowed_domains = HashSet::new();
        let mut allowed_wildcard_suffixes = Vec::new();
        for entry in allow_list {
            if let Some(caps) = WILDCARD_DOMAIN_RE.captures(&entry) {
                allowed_wildcard_suffixes.push(caps[1].to_string());
            } else {
                allowed_domains.insert(entry);
            }
        }
        Self {
            allowed_domains,
            allowed_wildcard_suffixes,
            dns_cache: DashMap::new(),
            dns_cache_ttl: Duration::from_secs(300),
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        self.allowed_domains.contains(host)
            || self
                .allowed_wildcard_suffixes
                .iter()
                .any(|suffix| host == suffix || host.ends_with(&format!(".{suffix}")))
    }

    /// Validates a URL's scheme, host, and port before any request is made.
    /// Resolution and the per-IP block-list check happen in
    /// [`Self::check_resolved_ips`] once the caller has the DNS answer.
    pub fn check_url(&self, url: &Url) -> Result<(), SsrfViolation> {
        let scheme = url.scheme();
        if BLOCKED_SCHEMES.contains(&scheme) || !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(SsrfViolation::BlockedScheme);
        }

        let host = url.host_str().ok_or(SsrfViolation::DomainNotAllowed)?;
        if !self.host_allowed(host) {
            return Err(SsrfViolation::DomainNotAllowed);
        }

        if let Some(port) = url.port() {
            if !ALLOWED_PORTS.contains(&port) {
                return Err(SsrfViolation::PortNotAllowed);
            }
        }

        Ok(())
    }

    /// Validates resolved IPs against reserved/private ranges, caching the
    /// resolution for `dns_cache_ttl` and re-checking cached IPs on every
    /// call so a rebind to a blocked address is caught even within the
    /// cache window.
    pub fn check_resolved_ips(&self, host: &str, ips: Vec<IpAddr>) -> Result<(), SsrfViolation> {
        if ips.iter().any(is_blocked_address) {
            return Err(SsrfViolation::PrivateOrReservedAddress);
        }

        if let Some(cached) = self.dns_cache.get(host) {
            if cached.resolved_at.elapsed() < self.dns_cache_ttl && *cached.ips != ips {
                return Err(SsrfViolation::DnsRebindDetected);
            }
        }

        self.dns_cache.insert(
            host.to_string(),
            CachedResolution {
                ips: Arc::new(ips),
                resolved_at: Instant::now(),
            },
        );
        Ok(())
    }
}

fn is_blocked_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_multicast() || v6.is_unspecified(),
    }
}
