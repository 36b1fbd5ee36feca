// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local-network advertisement of this agent's manifest.

use async_trait::async_trait;

/// Broadcasts this agent's presence on the local subnet so peers can
/// resolve its manifest URL without prior configuration.
///
/// No implementation ships in this crate: the corpus this runtime is
/// built from carries no mDNS responder dependency, and pulling one in
/// for a single optional feature would be exactly the kind of fabricated
/// dependency this codebase avoids. Deployments that need it provide
/// their own [`Advertiser`], constructed outside any `new()` path — per
/// the wire contract, hostname resolution and subnet broadcast must
/// happen asynchronously, never during construction.
#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Start broadcasting `manifest_url` on the local subnet. Returns once
    /// the advertisement is registered with the local network stack, not
    /// once every peer has seen it.
    async fn advertise(&self, manifest_url: &str) -> Result<(), AdvertiseError>;

    /// Stop broadcasting.
    async fn withdraw(&self) -> Result<(), AdvertiseError>;
}

/// Failure advertising or withdrawing a manifest URL.
#[derive(Debug, thiserror::Error)]
pub enum AdvertiseError {
    /// The local network stack rejected the advertisement.
    #[error("advertisement failed: {0}")]
    Failed(String),
}
