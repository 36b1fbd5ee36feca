// SPDX-License-Identifier: MIT OR Apache-2.0
//! Singleflight, conditional-GET discovery cache for manifests (C3).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::manifest::Manifest;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const MAX_ENTRIES: usize = 1000;

/// Failures fetching or decoding a manifest.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP request itself failed.
    #[error("manifest fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server responded with neither 200 nor 304.
    #[error("unexpected manifest status {0}")]
    UnexpectedStatus(u16),
    /// The body was not a well-formed manifest document.
    #[error("manifest body invalid: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

#[derive(Clone)]
struct CacheEntry {
    manifest: Manifest,
    etag: Option<String>,
    expires_at: Instant,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl CacheState {
    fn touch(&mut self, url: &str) {
        self.order.retain(|u| u != url);
        self.order.push_back(url.to_string());
    }

    fn evict_if_over_capacity(&mut self) {
        while self.entries.len() > MAX_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

/// Fetches and caches manifest documents, sharing one in-flight request
/// per URL across concurrent callers (singleflight) and honoring
/// conditional GET via `ETag`/`If-None-Match`.
pub struct ManifestCache {
    client: reqwest::Client,
    state: Mutex<CacheState>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ManifestCache {
    /// Build a cache around an existing HTTP client (so callers can share a
    /// connection pool with the rest of the ASAP client stack).
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            state: Mutex::new(CacheState { entries: HashMap::new(), order: VecDeque::new() }),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn per_url_lock(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("manifest cache lock map poisoned");
        locks.entry(url.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    fn cached_fresh(&self, url: &str) -> Option<Manifest> {
        let state = self.state.lock().expect("manifest cache state poisoned");
        state.entries.get(url).filter(|e| e.expires_at > Instant::now()).map(|e| e.manifest.clone())
    }

    /// Fetch the manifest at `url`, serving a cached copy when fresh.
    /// Concurrent callers for the same URL share a single in-flight
    /// request; a failed fetch invalidates any existing cache entry for
    /// that URL rather than serving stale data silently.
    pub async fn get_manifest(&self, url: &str) -> Result<Manifest, FetchError> {
        if let Some(manifest) = self.cached_fresh(url) {
            return Ok(manifest);
        }

        let url_lock = self.per_url_lock(url);
        let _guard = url_lock.lock().await;

        // Double-check: another caller may have populated the cache while
        // we waited for the lock.
        if let Some(manifest) = self.cached_fresh(url) {
            return Ok(manifest);
        }

        let prior_etag = {
            let state = self.state.lock().expect("manifest cache state poisoned");
            state.entries.get(url).and_then(|e| e.etag.clone())
        };

        let mut request = self.client.get(url);
        if let Some(etag) = &prior_etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.invalidate(url);
                return Err(FetchError::Transport(e));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            let mut state = self.state.lock().expect("manifest cache state poisoned");
            if let Some(entry) = state.entries.get_mut(url) {
                entry.expires_at = Instant::now() + DEFAULT_TTL.min(Duration::from_secs(entry.manifest.ttl_seconds));
                let manifest = entry.manifest.clone();
                state.touch(url);
                debug!(target: "asap.manifest", %url, "manifest not modified, refreshed ttl");
                return Ok(manifest);
            }
            // We had no entry to refresh (e.g. evicted under us); treat as
            // a cache miss and fall through to an unconditional refetch.
        } else if !status.is_success() {
            self.invalidate(url);
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let ceiling = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                self.invalidate(url);
                return Err(FetchError::Transport(e));
            }
        };
        let manifest: Manifest = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                self.invalidate(url);
                return Err(FetchError::InvalidBody(e));
            }
        };

        let ttl = DEFAULT_TTL.min(ceiling).min(Duration::from_secs(manifest.ttl_seconds.max(1)));
        let mut state = self.state.lock().expect("manifest cache state poisoned");
        state.entries.insert(
            url.to_string(),
            CacheEntry { manifest: manifest.clone(), etag, expires_at: Instant::now() + ttl },
        );
        state.touch(url);
        state.evict_if_over_capacity();
        Ok(manifest)
    }

    fn invalidate(&self, url: &str) {
        let mut state = self.state.lock().expect("manifest cache state poisoned");
        state.entries.remove(url);
        state.order.retain(|u| u != url);
    }

    /// Number of entries currently cached, for tests and metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().expect("manifest cache state poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Capabilities, Endpoints};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manifest_body() -> serde_json::Value {
        let manifest = Manifest {
            id: "urn:asap:agent:acme:bot".to_string(),
            name: "Bot".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            ttl_seconds: 60,
            endpoints: Endpoints { asap: "https://bot.example.com/asap".to_string(), events: None },
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
        };
        serde_json::to_value(manifest).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_caches_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/asap/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()).insert_header("etag", "v1"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = ManifestCache::new(reqwest::Client::new());
        let url = format!("{}/.well-known/asap/manifest.json", server.uri());
        let first = cache.get_manifest(&url).await.unwrap();
        let second = cache.get_manifest(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn sends_if_none_match_after_expiry_and_handles_304() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/asap/manifest.json"))
            .and(header("if-none-match", "v1"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/asap/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()).insert_header("etag", "v1"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = ManifestCache::new(reqwest::Client::new());
        let url = format!("{}/.well-known/asap/manifest.json", server.uri());
        cache.get_manifest(&url).await.unwrap();
        {
            let mut state = cache.state.lock().unwrap();
            let entry = state.entries.get_mut(&url).unwrap();
            entry.expires_at = Instant::now() - Duration::from_secs(1);
        }
        cache.get_manifest(&url).await.unwrap();
    }

    #[tokio::test]
    async fn failed_fetch_invalidates_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/asap/manifest.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = ManifestCache::new(reqwest::Client::new());
        let url = format!("{}/.well-known/asap/manifest.json", server.uri());
        let err = cache.get_manifest(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedStatus(500)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/asap/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()).insert_header("etag", "v1"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(ManifestCache::new(reqwest::Client::new()));
        let url = format!("{}/.well-known/asap/manifest.json", server.uri());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move { cache.get_manifest(&url).await.unwrap() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
