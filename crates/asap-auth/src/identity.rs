// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identity-binding: map a verified token's claims to an ASAP agent id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::jwks::Claims;
use crate::AuthError;

/// Default custom claim carrying the authenticated agent id.
pub const DEFAULT_IDENTITY_CLAIM: &str = "https://asap-protocol.com/agent_id";

/// Identity-binding configuration, parsed once at startup rather than per
/// request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityBindingConfig {
    /// Claim key carrying the agent id, when the issuer sets one.
    #[serde(default = "default_claim")]
    pub claim_key: String,
    /// Fallback mapping from JWT `sub` to agent id, used when `claim_key`
    /// is absent from the token.
    #[serde(default)]
    pub subject_allowlist: HashMap<String, String>,
}

fn default_claim() -> String {
    DEFAULT_IDENTITY_CLAIM.to_string()
}

impl Default for IdentityBindingConfig {
    fn default() -> Self {
        Self { claim_key: default_claim(), subject_allowlist: HashMap::new() }
    }
}

impl IdentityBindingConfig {
    /// Resolve the authenticated agent id from verified claims: prefer the
    /// configured custom claim, falling back to the subject allowlist.
    pub fn resolve_agent_id(&self, claims: &Claims) -> Result<String, AuthError> {
        if let Some(value) = claims.extra.get(&self.claim_key).and_then(|v| v.as_str()) {
            return Ok(value.to_string());
        }
        let subject = claims
            .sub
            .as_deref()
            .ok_or_else(|| AuthError::AuthInvalid("token has neither identity claim nor subject".to_string()))?;
        self.subject_allowlist
            .get(subject)
            .cloned()
            .ok_or_else(|| AuthError::AuthInvalid(format!("subject {subject:?} is not in the allowlist")))
    }

    /// Enforce that the authenticated identity matches `envelope.sender`;
    /// on mismatch this is a `403 asap:security/identity_mismatch`, not a
    /// `401`, since the credential itself verified fine.
    pub fn require_matches_sender(&self, claims: &Claims, sender: &str) -> Result<(), AuthError> {
        let agent_id = self.resolve_agent_id(claims)?;
        if agent_id == sender {
            Ok(())
        } else {
            Err(AuthError::IdentityMismatch { authenticated: agent_id, sender: sender.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims_with(extra: HashMap<String, serde_json::Value>, sub: Option<&str>) -> Claims {
        Claims { sub: sub.map(str::to_string), iss: None, aud: None, exp: 0, iat: None, extra }
    }

    #[test]
    fn resolves_from_custom_claim_when_present() {
        let config = IdentityBindingConfig::default();
        let mut extra = HashMap::new();
        extra.insert(DEFAULT_IDENTITY_CLAIM.to_string(), json!("urn:asap:agent:acme:bot"));
        let claims = claims_with(extra, None);
        assert_eq!(config.resolve_agent_id(&claims).unwrap(), "urn:asap:agent:acme:bot");
    }

    #[test]
    fn falls_back_to_subject_allowlist() {
        let mut config = IdentityBindingConfig::default();
        config.subject_allowlist.insert("sub-1".to_string(), "urn:asap:agent:acme:bot".to_string());
        let claims = claims_with(HashMap::new(), Some("sub-1"));
        assert_eq!(config.resolve_agent_id(&claims).unwrap(), "urn:asap:agent:acme:bot");
    }

    #[test]
    fn unmapped_subject_is_rejected() {
        let config = IdentityBindingConfig::default();
        let claims = claims_with(HashMap::new(), Some("sub-1"));
        assert!(config.resolve_agent_id(&claims).is_err());
    }

    #[test]
    fn matching_sender_passes() {
        let mut config = IdentityBindingConfig::default();
        config.subject_allowlist.insert("sub-1".to_string(), "urn:asap:agent:acme:bot".to_string());
        let claims = claims_with(HashMap::new(), Some("sub-1"));
        assert!(config.require_matches_sender(&claims, "urn:asap:agent:acme:bot").is_ok());
    }

    #[test]
    fn mismatched_sender_is_identity_mismatch() {
        let mut config = IdentityBindingConfig::default();
        config.subject_allowlist.insert("sub-1".to_string(), "urn:asap:agent:acme:bot".to_string());
        let claims = claims_with(HashMap::new(), Some("sub-1"));
        let err = config.require_matches_sender(&claims, "urn:asap:agent:acme:other").unwrap_err();
        assert!(matches!(err, AuthError::IdentityMismatch { .. }));
    }
}
