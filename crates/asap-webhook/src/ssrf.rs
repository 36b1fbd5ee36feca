// SPDX-License-Identifier: MIT OR Apache-2.0
//! Asynchronous SSRF guard: every webhook URL is resolved and checked
//! before any delivery is attempted, and again before registration so a
//! malicious URL is rejected synchronously with no outbound request made.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::Url;

/// A webhook URL failed SSRF validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SsrfError {
    /// URL could not be parsed.
    #[error("malformed webhook url: {0}")]
    Malformed(String),
    /// Scheme was not `http` or `https`.
    #[error("unsupported scheme {0:?}, only http and https are allowed")]
    UnsupportedScheme(String),
    /// URL has no host component.
    #[error("webhook url has no host")]
    NoHost,
    /// DNS resolution failed.
    #[error("dns resolution failed: {0}")]
    ResolutionFailed(String),
    /// One or more resolved addresses are disallowed (private, loopback,
    /// link-local, or a cloud metadata endpoint).
    #[error("resolved address {0} is not allowed for webhook delivery")]
    DisallowedAddress(IpAddr),
}

/// Validate `url`: scheme, host presence, and every address it resolves to.
/// Performs DNS resolution, so callers must await this before registering
/// or delivering to a webhook.
pub async fn validate_webhook_url(url: &str) -> Result<(), SsrfError> {
    let parsed = Url::parse(url).map_err(|e| SsrfError::Malformed(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(SsrfError::UnsupportedScheme(other.to_string())),
    }
    let host = parsed.host_str().ok_or(SsrfError::NoHost)?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SsrfError::ResolutionFailed(e.to_string()))?;

    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        let ip = addr.ip();
        if is_disallowed(ip) {
            return Err(SsrfError::DisallowedAddress(ip));
        }
    }
    if !saw_any {
        return Err(SsrfError::ResolutionFailed("no addresses returned".to_string()));
    }
    Ok(())
}

fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_disallowed_v4(mapped);
            }
            is_disallowed_v6(v6)
        }
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() || ip == Ipv4Addr::new(169, 254, 169, 254)
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // fe80::/10, link-local.
    if segments[0] & 0xffc0 == 0xfe80 {
        return true;
    }
    // fc00::/7, unique local.
    if segments[0] & 0xfe00 == 0xfc00 {
        return true;
    }
    false
}
