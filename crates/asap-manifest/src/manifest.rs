// SPDX-License-Identifier: MIT OR Apache-2.0
//! The manifest document published at `/.well-known/asap/manifest.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Logical endpoint names an agent publishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Primary HTTP endpoint, e.g. `https://agent.example.com/asap`.
    pub asap: String,
    /// WebSocket endpoint, when streaming is supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,
}

/// A single skill this agent can execute via `task.request`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Identifier referenced by `task.request.payload.skill_id`.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema the `input` value must satisfy.
    pub input_schema: Value,
    /// JSON Schema the `result` value will satisfy.
    pub output_schema: Value,
}

/// Declared protocol capabilities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// ASAP protocol version this agent speaks, e.g. `"0.1"`.
    pub protocol_version: String,
    /// Skills available via `task.request`.
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// Whether `state.query`/`state.restore` are supported.
    #[serde(default)]
    pub state_persistence: bool,
    /// Whether the `events` WebSocket endpoint is available.
    #[serde(default)]
    pub streaming: bool,
    /// Model Context Protocol tool names exposed via `mcp.tool_call`.
    #[serde(default)]
    pub mcp_tools: Vec<String>,
}

/// Declared authentication schemes for non-public endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted schemes, e.g. `["bearer", "oauth2"]`.
    pub schemes: Vec<String>,
    /// OAuth2 token endpoint, when `oauth2` is offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// OAuth2 authorization endpoint, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    /// Scopes a client may request.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// The self-describing agent document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable identifier for this agent, matched against auth claims.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Agent's own semantic version.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Bounds consumer-side cache freshness; see [`Manifest::effective_ttl`].
    pub ttl_seconds: u64,
    /// Published endpoints.
    pub endpoints: Endpoints,
    /// Declared protocol capabilities.
    pub capabilities: Capabilities,
    /// Authentication requirements for non-public endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// Operator-defined SLA metadata, opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<Value>,
    /// Operator-defined verification metadata, opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Value>,
}

/// Errors validating a decoded [`Manifest`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestValidationError {
    /// `endpoints.asap` was empty.
    #[error("manifest endpoints.asap must not be empty")]
    MissingPrimaryEndpoint,
    /// `ttl_seconds` was zero.
    #[error("manifest ttl_seconds must be greater than zero")]
    ZeroTtl,
    /// `auth` was present but declared no schemes.
    #[error("manifest auth block must declare at least one scheme")]
    EmptyAuthSchemes,
}

impl Manifest {
    /// Structural validation independent of network context. Does not
    /// (and cannot) enforce "every non-public endpoint requires a token":
    /// which endpoints are public is a server-side routing decision, not a
    /// property of the document itself, and is enforced by the request
    /// pipeline (C7/C8) instead.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if self.endpoints.asap.trim().is_empty() {
            return Err(ManifestValidationError::MissingPrimaryEndpoint);
        }
        if self.ttl_seconds == 0 {
            return Err(ManifestValidationError::ZeroTtl);
        }
        if let Some(auth) = &self.auth {
            if auth.schemes.is_empty() {
                return Err(ManifestValidationError::EmptyAuthSchemes);
            }
        }
        Ok(())
    }

    /// Cache freshness bound: the smaller of this manifest's own
    /// `ttl_seconds` and a caller-supplied ceiling (typically the server
    /// `Cache-Control` max-age, if present, and a 5 minute default).
    #[must_use]
    pub fn effective_ttl(&self, ceiling_seconds: u64) -> u64 {
        self.ttl_seconds.min(ceiling_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            id: "urn:asap:agent:acme:billing-bot".to_string(),
            name: "Billing Bot".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            ttl_seconds: 300,
            endpoints: Endpoints { asap: "https://agent.example.com/asap".to_string(), events: None },
            capabilities: Capabilities {
                protocol_version: "0.1".to_string(),
                skills: vec![],
                state_persistence: false,
                streaming: false,
                mcp_tools: vec![],
            },
            auth: None,
            sla: None,
            verification: None,
        }
    }

    #[test]
    fn valid_manifest_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_primary_endpoint_is_rejected() {
        let mut manifest = sample();
        manifest.endpoints.asap = String::new();
        assert_eq!(manifest.validate(), Err(ManifestValidationError::MissingPrimaryEndpoint));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut manifest = sample();
        manifest.ttl_seconds = 0;
        assert_eq!(manifest.validate(), Err(ManifestValidationError::ZeroTtl));
    }

    #[test]
    fn auth_block_requires_a_scheme() {
        let mut manifest = sample();
        manifest.auth = Some(AuthConfig {
            schemes: vec![],
            token_url: None,
            authorization_url: None,
            scopes: vec![],
        });
        assert_eq!(manifest.validate(), Err(ManifestValidationError::EmptyAuthSchemes));
    }

    #[test]
    fn effective_ttl_takes_the_smaller_bound() {
        let manifest = sample();
        assert_eq!(manifest.effective_ttl(60), 60);
        assert_eq!(manifest.effective_ttl(3600), 300);
    }
}
