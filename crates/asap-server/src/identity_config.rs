//! Builds an [`IdentityBindingConfig`] from [`AsapConfig`] at startup.
//!
//! `AsapConfig::auth_subject_map` is keyed `agent_id -> [sub, ...]`, the
//! natural shape for an operator to author (one agent, many acceptable
//! subjects). `IdentityBindingConfig::subject_allowlist` is keyed the
//! other way, `sub -> agent_id`, since that is the direction a lookup
//! actually runs in at verification time. This flattens one into the
//! other, once, rather than inverting it on every request.

use asap_auth::IdentityBindingConfig;
use asap_config::AsapConfig;
use std::collections::HashMap;

/// Build the identity-binding config this server verifies tokens
/// against, from its runtime configuration.
#[must_use]
pub fn identity_binding_config(config: &AsapConfig) -> IdentityBindingConfig {
    let mut subject_allowlist = HashMap::new();
    for (agent_id, subs) in &config.auth_subject_map {
        for sub in subs {
            subject_allowlist.insert(sub.clone(), agent_id.clone());
        }
    }
    IdentityBindingConfig { claim_key: config.auth_custom_claim.clone(), subject_allowlist }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_agent_to_subs_into_sub_to_agent() {
        let mut config = AsapConfig::default();
        config
            .auth_subject_map
            .insert("urn:asap:agent:acme:bot".to_string(), vec!["sub-a".to_string(), "sub-b".to_string()]);

        let binding = identity_binding_config(&config);
        assert_eq!(binding.subject_allowlist.get("sub-a").map(String::as_str), Some("urn:asap:agent:acme:bot"));
        assert_eq!(binding.subject_allowlist.get("sub-b").map(String::as_str), Some("urn:asap:agent:acme:bot"));
    }

    #[test]
    fn carries_over_the_custom_claim_key() {
        let mut config = AsapConfig::default();
        config.auth_custom_claim = "https://example.com/agent".to_string();
        assert_eq!(identity_binding_config(&config).claim_key, "https://example.com/agent");
    }
}
