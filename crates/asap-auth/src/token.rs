// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client-side OAuth2 client-credentials token acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::AuthError;

/// Leeway subtracted from a token's expiry before it is considered stale,
/// so a token is never handed out moments before the server rejects it.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Caches client-credentials access tokens per `(token_url, client_id)`,
/// refreshing under a per-key lock so concurrent callers for the same
/// credentials share a single refresh instead of stampeding the token
/// endpoint.
pub struct TokenCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<CachedToken>>>>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl TokenCache {
    /// Build a cache around an existing HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, entries: Mutex::new(HashMap::new()) }
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<Option<CachedToken>>> {
        let mut entries = self.entries.lock().expect("token cache lock map poisoned");
        entries.entry(key.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None))).clone()
    }

    /// Obtain a bearer token for `client_id`/`client_secret` at
    /// `token_url`, serving a cached token until it is within
    /// [`EXPIRY_LEEWAY`] of expiring.
    pub async fn obtain_token(
        &self,
        client_id: &str,
        client_secret: &str,
        token_url: &str,
        scopes: &[String],
    ) -> Result<String, AuthError> {
        let key = format!("{token_url}|{client_id}");
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        // Double-check: another caller may have refreshed while we waited
        // for the lock.
        if let Some(cached) = guard.as_ref() {
            if Instant::now() + EXPIRY_LEEWAY < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", &scopes.join(" ")),
        ];
        let response = self
            .client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::TokenRequestFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;
        let ttl = Duration::from_secs(body.expires_in.unwrap_or(3600));
        let cached = CachedToken { access_token: body.access_token.clone(), expires_at: Instant::now() + ttl };
        *guard = Some(cached);
        Ok(body.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = TokenCache::default();
        let url = format!("{}/token", server.uri());
        let first = cache.obtain_token("client", "secret", &url, &[]).await.unwrap();
        let second = cache.obtain_token("client", "secret", &url, &[]).await.unwrap();
        assert_eq!(first, "tok-1");
        assert_eq!(second, "tok-1");
    }

    #[tokio::test]
    async fn refetches_once_the_cached_token_is_near_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-short",
                "expires_in": 1,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let cache = TokenCache::default();
        let url = format!("{}/token", server.uri());
        cache.obtain_token("client", "secret", &url, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.obtain_token("client", "secret", &url, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let cache = TokenCache::default();
        let url = format!("{}/token", server.uri());
        let err = cache.obtain_token("client", "secret", &url, &[]).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRequestFailed(_)));
    }
}
