// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the ASAP protocol
//! runtime.
//!
//! This crate provides [`AsapConfig`] — the top-level runtime settings —
//! together with helpers for loading from TOML files, applying `ASAP_*`
//! environment variable overrides, and producing advisory
//! [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use asap_ratelimit::{RateLimitRule, RateLimiterConfig};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// An `ASAP_*` environment variable held a value that could not be
    /// parsed into its target type.
    #[error("invalid environment override {var}: {reason}")]
    InvalidEnvOverride {
        /// Name of the offending environment variable.
        var: String,
        /// Why it could not be parsed.
        reason: String,
    },
    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Debug mode is enabled, which exposes exception detail in error
    /// bodies; fine in development, risky in production.
    DebugModeEnabled,
    /// No subject mapping is configured, so JWT `sub` must equal the
    /// envelope sender's agent id exactly (no aliasing).
    NoSubjectMapConfigured,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DebugModeEnabled => write!(f, "debug mode is enabled, error bodies expose exception type"),
            Self::NoSubjectMapConfigured => {
                write!(f, "no auth subject map configured, falling back to exact sub == agent_id matching")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Structured log output format, driven by `ASAP_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Newline-delimited JSON, one object per event.
    Json,
    /// Human-readable formatting for local development.
    Console,
}

/// Top-level runtime configuration for the ASAP protocol runtime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AsapConfig {
    /// Rate limit spec, e.g. `"10/second;100/minute"`. Parsed by
    /// [`parse_rate_limit_spec`] into a [`RateLimiterConfig`] at
    /// validation time.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: String,
    /// Maximum accepted request body size, in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size_bytes: u64,
    /// Custom JWT claim holding the caller's agent id.
    #[serde(default = "default_auth_custom_claim")]
    pub auth_custom_claim: String,
    /// Maps an agent id to the set of JWT `sub` values acceptable for it.
    /// Empty means `sub` must equal `agent_id` exactly.
    #[serde(default)]
    pub auth_subject_map: BTreeMap<String, Vec<String>>,
    /// If true, error bodies expose the underlying exception type.
    #[serde(default)]
    pub debug: bool,
    /// Structured log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// JWKS endpoint used to resolve signing keys for inbound bearer
    /// tokens. `None` disables remote key resolution (local/test setups
    /// only).
    #[serde(default)]
    pub auth_jwks_url: Option<String>,
    /// Expected `iss` claim on inbound tokens, if any.
    #[serde(default)]
    pub auth_issuer: Option<String>,
    /// Expected `aud` claim on inbound tokens, if any.
    #[serde(default)]
    pub auth_audience: Option<String>,
    /// This agent's own identifier, published in its manifest and matched
    /// against authenticated callers' identity claims.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    /// Human-readable name published in the manifest.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// This agent's own semantic version, published in the manifest.
    #[serde(default = "default_agent_version")]
    pub agent_version: String,
    /// `Cache-Control: max-age` ceiling applied to the published manifest,
    /// independent of the manifest's own `ttl_seconds`.
    #[serde(default = "default_manifest_ttl_seconds")]
    pub manifest_ttl_seconds: u64,
}

fn default_rate_limit() -> String {
    "10/second;100/minute".to_string()
}

const DEFAULT_MAX_REQUEST_SIZE_BYTES: u64 = 10 * 1024 * 1024;

fn default_max_request_size() -> u64 {
    DEFAULT_MAX_REQUEST_SIZE_BYTES
}

fn default_auth_custom_claim() -> String {
    "https://asap-protocol.com/agent_id".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_agent_id() -> String {
    "urn:asap:agent:local:server".to_string()
}

fn default_agent_name() -> String {
    "ASAP Agent".to_string()
}

fn default_agent_version() -> String {
    "0.1.0".to_string()
}

fn default_manifest_ttl_seconds() -> u64 {
    300
}

impl Default for AsapConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            max_request_size_bytes: default_max_request_size(),
            auth_custom_claim: default_auth_custom_claim(),
            auth_subject_map: BTreeMap::new(),
            debug: false,
            log_format: default_log_format(),
            auth_jwks_url: None,
            auth_issuer: None,
            auth_audience: None,
            agent_id: default_agent_id(),
            agent_name: default_agent_name(),
            agent_version: default_agent_version(),
            manifest_ttl_seconds: default_manifest_ttl_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load an [`AsapConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`AsapConfig::default()`].
///
/// `ASAP_*` environment variable overrides are applied on top in both
/// cases, matching the precedence documented for the runtime's external
/// interfaces.
pub fn load_config(path: Option<&Path>) -> Result<AsapConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .map_err(|_| ConfigError::FileNotFound { path: p.display().to_string() })?;
            parse_toml(&content)?
        }
        None => AsapConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into an [`AsapConfig`].
pub fn parse_toml(content: &str) -> Result<AsapConfig, ConfigError> {
    toml::from_str::<AsapConfig>(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply `ASAP_*` environment variable overrides in place.
///
/// Recognised variables: `ASAP_RATE_LIMIT`, `ASAP_MAX_REQUEST_SIZE`,
/// `ASAP_AUTH_CUSTOM_CLAIM`, `ASAP_AUTH_SUBJECT_MAP`, `ASAP_DEBUG`,
/// `ASAP_LOG_FORMAT`.
pub fn apply_env_overrides(config: &mut AsapConfig) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var("ASAP_RATE_LIMIT") {
        config.rate_limit = val;
    }
    if let Ok(val) = std::env::var("ASAP_MAX_REQUEST_SIZE") {
        config.max_request_size_bytes = val.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            var: "ASAP_MAX_REQUEST_SIZE".to_string(),
            reason: "must be a non-negative integer byte count".to_string(),
        })?;
    }
    if let Ok(val) = std::env::var("ASAP_AUTH_CUSTOM_CLAIM") {
        config.auth_custom_claim = val;
    }
    if let Ok(val) = std::env::var("ASAP_AUTH_SUBJECT_MAP") {
        config.auth_subject_map =
            serde_json::from_str(&val).map_err(|e| ConfigError::InvalidEnvOverride {
                var: "ASAP_AUTH_SUBJECT_MAP".to_string(),
                reason: e.to_string(),
            })?;
    }
    if let Ok(val) = std::env::var("ASAP_DEBUG") {
        config.debug = is_truthy(&val);
    }
    if let Ok(val) = std::env::var("ASAP_LOG_FORMAT") {
        config.log_format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "console" => LogFormat::Console,
            other => {
                return Err(ConfigError::InvalidEnvOverride {
                    var: "ASAP_LOG_FORMAT".to_string(),
                    reason: format!("expected 'json' or 'console', got {other:?}"),
                })
            }
        };
    }
    if let Ok(val) = std::env::var("ASAP_AUTH_JWKS_URL") {
        config.auth_jwks_url = Some(val);
    }
    if let Ok(val) = std::env::var("ASAP_AUTH_ISSUER") {
        config.auth_issuer = Some(val);
    }
    if let Ok(val) = std::env::var("ASAP_AUTH_AUDIENCE") {
        config.auth_audience = Some(val);
    }
    if let Ok(val) = std::env::var("ASAP_AGENT_ID") {
        config.agent_id = val;
    }
    if let Ok(val) = std::env::var("ASAP_AGENT_NAME") {
        config.agent_name = val;
    }
    if let Ok(val) = std::env::var("ASAP_AGENT_VERSION") {
        config.agent_version = val;
    }
    if let Ok(val) = std::env::var("ASAP_MANIFEST_TTL_SECONDS") {
        config.manifest_ttl_seconds = val.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            var: "ASAP_MANIFEST_TTL_SECONDS".to_string(),
            reason: "must be a non-negative integer".to_string(),
        })?;
    }
    Ok(())
}

fn is_truthy(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ---------------------------------------------------------------------------
// Rate limit spec parsing
// ---------------------------------------------------------------------------

/// Parse a spec like `"10/second;100/minute"` into a [`RateLimiterConfig`].
/// Each clause is `<max>/<unit>` where `unit` is `second` or `minute`.
pub fn parse_rate_limit_spec(spec: &str) -> Result<RateLimiterConfig, ConfigError> {
    let mut rules = Vec::new();
    for clause in spec.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (max_str, unit) = clause.split_once('/').ok_or_else(|| ConfigError::InvalidEnvOverride {
            var: "ASAP_RATE_LIMIT".to_string(),
            reason: format!("clause {clause:?} is not in '<max>/<unit>' form"),
        })?;
        let max: u64 = max_str.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
            var: "ASAP_RATE_LIMIT".to_string(),
            reason: format!("clause {clause:?} has a non-numeric max"),
        })?;
        let window = match unit.trim() {
            "second" => Duration::from_secs(1),
            "minute" => Duration::from_secs(60),
            "hour" => Duration::from_secs(3600),
            other => {
                return Err(ConfigError::InvalidEnvOverride {
                    var: "ASAP_RATE_LIMIT".to_string(),
                    reason: format!("unknown unit {other:?}, expected second, minute, or hour"),
                })
            }
        };
        rules.push(RateLimitRule { window, max });
    }
    if rules.is_empty() {
        return Err(ConfigError::InvalidEnvOverride {
            var: "ASAP_RATE_LIMIT".to_string(),
            reason: "at least one clause is required".to_string(),
        });
    }
    Ok(RateLimiterConfig { rules })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (malformed rate limit spec, zero-byte request size) come
/// back as a [`ConfigError::ValidationError`]; soft issues come back as
/// warnings. Identity binding configuration (`auth_custom_claim`,
/// `auth_subject_map`) is parsed and validated here once, at startup,
/// rather than re-parsed on every request.
pub fn validate_config(config: &AsapConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Err(e) = parse_rate_limit_spec(&config.rate_limit) {
        errors.push(e.to_string());
    }

    if config.max_request_size_bytes == 0 {
        errors.push("max_request_size_bytes must be greater than zero".to_string());
    }

    if config.auth_custom_claim.trim().is_empty() {
        errors.push("auth_custom_claim must not be empty".to_string());
    }

    if config.agent_id.trim().is_empty() {
        errors.push("agent_id must not be empty".to_string());
    }

    for (agent_id, subs) in &config.auth_subject_map {
        if agent_id.trim().is_empty() {
            errors.push("auth_subject_map has an empty agent_id key".to_string());
        }
        if subs.is_empty() {
            errors.push(format!("auth_subject_map entry for {agent_id:?} has no acceptable subjects"));
        }
    }

    if config.debug {
        warnings.push(ConfigWarning::DebugModeEnabled);
    }
    if config.auth_subject_map.is_empty() {
        warnings.push(ConfigWarning::NoSubjectMapConfigured);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = AsapConfig::default();
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(warnings.contains(&ConfigWarning::NoSubjectMapConfigured));
    }

    #[test]
    fn default_config_has_sensible_defaults() {
        let cfg = AsapConfig::default();
        assert_eq!(cfg.max_request_size_bytes, DEFAULT_MAX_REQUEST_SIZE_BYTES);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert!(!cfg.debug);
    }

    #[test]
    fn parse_valid_toml_string() {
        let toml = r#"
            rate_limit = "5/second"
            max_request_size_bytes = 2048
            debug = true
            log_format = "console"
        "#;
        let cfg = parse_toml(toml).unwrap();
        assert_eq!(cfg.rate_limit, "5/second");
        assert_eq!(cfg.max_request_size_bytes, 2048);
        assert!(cfg.debug);
        assert_eq!(cfg.log_format, LogFormat::Console);
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let err = parse_toml("this is [not valid toml =").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn rate_limit_spec_parses_multiple_clauses() {
        let parsed = parse_rate_limit_spec("10/second;100/minute").unwrap();
        assert_eq!(parsed.rules.len(), 2);
        assert_eq!(parsed.rules[0].max, 10);
        assert_eq!(parsed.rules[0].window, Duration::from_secs(1));
        assert_eq!(parsed.rules[1].max, 100);
        assert_eq!(parsed.rules[1].window, Duration::from_secs(60));
    }

    #[test]
    fn malformed_rate_limit_spec_is_a_validation_error() {
        let cfg = AsapConfig { rate_limit: "not-a-spec".to_string(), ..Default::default() };
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn empty_auth_custom_claim_is_a_validation_error() {
        let cfg = AsapConfig { auth_custom_claim: String::new(), ..Default::default() };
        let err = validate_config(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("auth_custom_claim")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }
}
