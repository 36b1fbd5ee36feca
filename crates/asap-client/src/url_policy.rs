// SPDX-License-Identifier: MIT OR Apache-2.0
//! Base URL validation: scheme must be `http`/`https`, and HTTPS is
//! required outside localhost unless explicitly overridden.

use thiserror::Error;
use url::Url;

/// A base URL failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlPolicyError {
    /// URL could not be parsed.
    #[error("malformed base url: {0}")]
    Malformed(String),
    /// Scheme was not `http` or `https`.
    #[error("unsupported scheme {0:?}, only http and https are allowed")]
    UnsupportedScheme(String),
    /// Plain HTTP was used against a non-localhost host.
    #[error("https is required for non-localhost host {0:?}")]
    InsecureNonLocalhost(String),
}

fn is_localhost(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "::1"
}

/// Validate `base_url`. HTTPS is enforced for any host other than
/// localhost unless `allow_insecure_localhost_override` permits plain
/// HTTP regardless of host (intended for test doubles only).
pub fn validate_base_url(base_url: &str, allow_insecure: bool) -> Result<(), UrlPolicyError> {
    let parsed = Url::parse(base_url).map_err(|e| UrlPolicyError::Malformed(e.to_string()))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let host = parsed.host_str().unwrap_or_default();
            if allow_insecure || is_localhost(host) {
                Ok(())
            } else {
                Err(UrlPolicyError::InsecureNonLocalhost(host.to_string()))
            }
        }
        other => Err(UrlPolicyError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_is_always_allowed() {
        assert!(validate_base_url("https://example.com", false).is_ok());
    }

    #[test]
    fn http_localhost_is_allowed() {
        assert!(validate_base_url("http://localhost:8080", false).is_ok());
        assert!(validate_base_url("http://127.0.0.1:8080", false).is_ok());
    }

    #[test]
    fn http_non_localhost_is_rejected_by_default() {
        let err = validate_base_url("http://example.com", false).unwrap_err();
        assert!(matches!(err, UrlPolicyError::InsecureNonLocalhost(_)));
    }

    #[test]
    fn http_non_localhost_allowed_with_explicit_override() {
        assert!(validate_base_url("http://example.com", true).is_ok());
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = validate_base_url("ftp://example.com", false).unwrap_err();
        assert!(matches!(err, UrlPolicyError::UnsupportedScheme(_)));
    }
}
