// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server-side JWKS fetch/cache and JWT signature verification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::AuthError;

const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// Algorithms ASAP servers accept. `none` is never included: `jsonwebtoken`
/// has no variant for it at all, which is the whitelist this requirement
/// describes.
const ALLOWED_ALGORITHMS: &[Algorithm] =
    &[Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA];

/// Standard and pass-through claims of a verified bearer token.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
    /// Subject claim.
    #[serde(default)]
    pub sub: Option<String>,
    /// Issuer claim.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience claim; may be a string or an array of strings.
    #[serde(default)]
    pub aud: Option<Value>,
    /// Expiry, seconds since epoch.
    pub exp: u64,
    /// Issued-at, seconds since epoch.
    #[serde(default)]
    pub iat: Option<u64>,
    /// Every other claim, including any configured identity-binding claim.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

struct CachedJwks {
    jwk_set: JwkSet,
    fetched_at: Instant,
}

/// Fetches and caches a JWKS document per signing authority, re-fetching
/// at most once per verification attempt on a signature failure (to pick
/// up key rotation) rather than on every request.
pub struct JwksCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<CachedJwks>>>>>,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl JwksCache {
    /// Build a cache around an existing HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, entries: Mutex::new(HashMap::new()) }
    }

    fn slot(&self, jwks_url: &str) -> Arc<tokio::sync::Mutex<Option<CachedJwks>>> {
        let mut entries = self.entries.lock().expect("jwks cache lock map poisoned");
        entries
            .entry(jwks_url.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Fetch the JWKS at `jwks_url`, serving a cached copy unless `force`
    /// is set (used after a signature verification failure, to pick up a
    /// rotated key) or the cache has expired.
    pub async fn fetch(&self, jwks_url: &str, force: bool) -> Result<JwkSet, AuthError> {
        let slot = self.slot(jwks_url);
        let mut guard = slot.lock().await;

        if !force {
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    return Ok(cached.jwk_set.clone());
                }
            }
        }

        let response = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::JwksUnavailable(format!("jwks endpoint returned {}", response.status())));
        }
        let jwk_set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;
        debug!(target: "asap.auth", %jwks_url, keys = jwk_set.keys.len(), "fetched jwks");
        *guard = Some(CachedJwks { jwk_set: jwk_set.clone(), fetched_at: Instant::now() });
        Ok(jwk_set)
    }
}

/// Verify `token`'s signature and standard claims against the JWKS at
/// `jwks_url`, re-fetching once on a signature failure before giving up
/// (handles key rotation without requiring a cache invalidation signal).
pub async fn verify_token(
    jwks: &JwksCache,
    jwks_url: &str,
    token: &str,
    issuer: Option<&str>,
    audience: Option<&str>,
) -> Result<Claims, AuthError> {
    let header = decode_header(token).map_err(|e| AuthError::AuthInvalid(e.to_string()))?;

    match try_verify(jwks, jwks_url, token, &header, issuer, audience, false).await {
        Ok(claims) => Ok(claims),
        Err(AuthError::AuthInvalid(_)) => {
            try_verify(jwks, jwks_url, token, &header, issuer, audience, true).await
        }
        Err(other) => Err(other),
    }
}

async fn try_verify(
    jwks: &JwksCache,
    jwks_url: &str,
    token: &str,
    header: &jsonwebtoken::Header,
    issuer: Option<&str>,
    audience: Option<&str>,
    force_refetch: bool,
) -> Result<Claims, AuthError> {
    let jwk_set = jwks.fetch(jwks_url, force_refetch).await?;
    let kid = header.kid.as_deref();
    let jwk = kid
        .and_then(|kid| jwk_set.find(kid))
        .or_else(|| jwk_set.keys.first())
        .ok_or_else(|| AuthError::AuthInvalid("no matching signing key in jwks".to_string()))?;

    let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::AuthInvalid(e.to_string()))?;

    if !ALLOWED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::AuthInvalid(format!("algorithm {:?} is not allowed", header.alg)));
    }
    let mut validation = Validation::new(header.alg);
    validation.algorithms = ALLOWED_ALGORITHMS.to_vec();
    if let Some(iss) = issuer {
        validation.set_issuer(&[iss]);
    }
    if let Some(aud) = audience {
        validation.set_audience(&[aud]);
    } else {
        validation.validate_aud = false;
    }

    let data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| AuthError::AuthInvalid(e.to_string()))?;
    Ok(data.claims)
}
