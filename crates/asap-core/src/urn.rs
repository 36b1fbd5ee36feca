// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent URNs: `urn:asap:agent:<owner>:<name>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parse error for [`AgentUrn`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid agent urn {0:?}: expected urn:asap:agent:<owner>:<name>")]
pub struct AgentUrnError(String);

/// An agent identity URN of the form `urn:asap:agent:<owner>:<name>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentUrn {
    owner: String,
    name: String,
}

impl AgentUrn {
    /// Construct directly from owner and name components, validating each
    /// is non-empty and contains no `:`.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, AgentUrnError> {
        let owner = owner.into();
        let name = name.into();
        let valid = |s: &str| !s.is_empty() && !s.contains(':');
        if !valid(&owner) || !valid(&name) {
            return Err(AgentUrnError(format!("urn:asap:agent:{owner}:{name}")));
        }
        Ok(Self { owner, name })
    }

    /// The owner segment.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AgentUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:asap:agent:{}:{}", self.owner, self.name)
    }
}

impl FromStr for AgentUrn {
    type Err = AgentUrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("urn:asap:agent:")
            .ok_or_else(|| AgentUrnError(s.to_string()))?;
        let (owner, name) = rest
            .split_once(':')
            .ok_or_else(|| AgentUrnError(s.to_string()))?;
        Self::new(owner, name)
    }
}

impl TryFrom<String> for AgentUrn {
    type Error = AgentUrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentUrn> for String {
    fn from(urn: AgentUrn) -> Self {
        urn.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_urn() {
        let urn: AgentUrn = "urn:asap:agent:acme:billing-bot".parse().unwrap();
        assert_eq!(urn.owner(), "acme");
        assert_eq!(urn.name(), "billing-bot");
        assert_eq!(urn.to_string(), "urn:asap:agent:acme:billing-bot");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!("agent:acme:bot".parse::<AgentUrn>().is_err());
    }

    #[test]
    fn rejects_missing_name_segment() {
        assert!("urn:asap:agent:acme".parse::<AgentUrn>().is_err());
    }

    #[test]
    fn serde_roundtrips_through_string() {
        let urn = AgentUrn::new("acme", "bot").unwrap();
        let json = serde_json::to_string(&urn).unwrap();
        assert_eq!(json, "\"urn:asap:agent:acme:bot\"");
        let back: AgentUrn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, urn);
    }
}
