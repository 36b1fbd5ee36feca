// SPDX-License-Identifier: MIT OR Apache-2.0
//! SLA target model. Percentage fields are validated against a strict
//! numeric-percent pattern at construction, so a malformed target rejects
//! the whole model rather than silently disabling a breach check later.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d+)?%?$").expect("pattern is a valid literal"))
}

/// An SLA target rejected at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlaError {
    /// The raw string did not match the numeric-percent pattern.
    #[error("{field} value {value:?} is not a valid percentage")]
    MalformedPercent {
        /// Field name, for error context.
        field: String,
        /// The raw value that was rejected.
        value: String,
    },
    /// The value parsed but was outside `[0, 100]`.
    #[error("{field} value {value} is out of range [0, 100]")]
    OutOfRange {
        /// Field name, for error context.
        field: String,
        /// The parsed value.
        value: f64,
    },
}

/// Parse and validate a percentage field from a raw string such as
/// `"99.9"` or `"99.9%"`.
pub fn parse_percent(field: &str, raw: &str) -> Result<f64, SlaError> {
    if !percent_pattern().is_match(raw) {
        return Err(SlaError::MalformedPercent { field: field.to_string(), value: raw.to_string() });
    }
    let trimmed = raw.trim_end_matches('%');
    let value: f64 = trimmed.parse().map_err(|_| SlaError::MalformedPercent {
        field: field.to_string(),
        value: raw.to_string(),
    })?;
    if !(0.0..=100.0).contains(&value) {
        return Err(SlaError::OutOfRange { field: field.to_string(), value });
    }
    Ok(value)
}

/// Service-level targets for an agent, validated at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaTarget {
    /// Agent these targets apply to.
    pub agent_id: String,
    /// Required uptime percentage, e.g. `99.9`.
    pub uptime_percent: f64,
    /// Required proportion of requests served within the latency budget.
    pub success_rate_percent: f64,
}

impl SlaTarget {
    /// Build a target from raw percentage strings, rejecting the whole
    /// model if either field fails validation.
    pub fn new(agent_id: impl Into<String>, uptime_percent: &str, success_rate_percent: &str) -> Result<Self, SlaError> {
        let uptime = parse_percent("uptime_percent", uptime_percent)?;
        let success_rate = parse_percent("success_rate_percent", success_rate_percent)?;
        Ok(Self { agent_id: agent_id.into(), uptime_percent: uptime, success_rate_percent: success_rate })
    }

    /// Whether an observed uptime percentage breaches this target.
    #[must_use]
    pub fn uptime_breached(&self, observed_percent: f64) -> bool {
        observed_percent < self.uptime_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_percent_suffixed_values() {
        assert_eq!(parse_percent("x", "99.9").unwrap(), 99.9);
        assert_eq!(parse_percent("x", "99.9%").unwrap(), 99.9);
        assert_eq!(parse_percent("x", "100").unwrap(), 100.0);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(parse_percent("x", "almost all").unwrap_err(), SlaError::MalformedPercent { .. }));
        assert!(matches!(parse_percent("x", "-5").unwrap_err(), SlaError::MalformedPercent { .. }));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(parse_percent("x", "150").unwrap_err(), SlaError::OutOfRange { .. }));
    }

    #[test]
    fn whole_model_rejects_if_either_field_is_invalid() {
        assert!(SlaTarget::new("a1", "99.9", "not-a-percent").is_err());
    }

    #[test]
    fn breach_detection_compares_against_the_target() {
        let target = SlaTarget::new("a1", "99.9", "95").unwrap();
        assert!(target.uptime_breached(99.5));
        assert!(!target.uptime_breached(99.95));
    }
}
