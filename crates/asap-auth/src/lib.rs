// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth2 client-credentials acquisition and JWT/JWKS verification with
//! identity binding (C7).
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod identity;
pub mod jwks;
pub mod token;

use asap_error::{AsapError, ErrorCode};
use thiserror::Error;

pub use identity::{IdentityBindingConfig, DEFAULT_IDENTITY_CLAIM};
pub use jwks::{verify_token, Claims, JwksCache};
pub use token::TokenCache;

/// Failures from either side of the auth pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented and auth is required.
    #[error("authentication required")]
    AuthRequired,
    /// Token failed signature or standard-claim verification.
    #[error("token invalid: {0}")]
    AuthInvalid(String),
    /// Token verified but lacks the required scope.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Authenticated identity does not match `envelope.sender`.
    #[error("identity mismatch: authenticated as {authenticated}, envelope sender is {sender}")]
    IdentityMismatch {
        /// Agent id resolved from the verified token.
        authenticated: String,
        /// `envelope.sender` from the request.
        sender: String,
    },
    /// The JWKS endpoint could not be reached or returned a bad response.
    /// Distinct from [`AuthError::AuthInvalid`]: this is the server's
    /// problem, not the caller's, and maps to `503` rather than `401`.
    #[error("jwks unavailable: {0}")]
    JwksUnavailable(String),
    /// The client-credentials token endpoint could not be reached or
    /// returned a bad response.
    #[error("token request failed: {0}")]
    TokenRequestFailed(String),
}

impl AuthError {
    /// HTTP status this failure should surface as, per §4.7's concurrency
    /// note: JWKS network errors are `503`, verification errors `401`,
    /// scope/identity shortfalls `403`.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthInvalid(_) => 401,
            Self::PermissionDenied(_) | Self::IdentityMismatch { .. } => 403,
            Self::JwksUnavailable(_) => 503,
            Self::TokenRequestFailed(_) => 502,
        }
    }

    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::AuthRequired => AsapError::new(ErrorCode::AuthRequired, "authentication required"),
            Self::AuthInvalid(reason) => AsapError::new(ErrorCode::AuthInvalid, reason),
            Self::PermissionDenied(reason) => AsapError::new(ErrorCode::PermissionDenied, reason),
            Self::IdentityMismatch { authenticated, sender } => {
                AsapError::new(ErrorCode::IdentityMismatch, "authenticated identity does not match envelope sender")
                    .with_context("authenticated", authenticated)
                    .with_context("sender", sender)
            }
            Self::JwksUnavailable(reason) => AsapError::new(ErrorCode::InternalError, reason),
            Self::TokenRequestFailed(reason) => AsapError::new(ErrorCode::InternalError, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_matches_auth_concurrency_table() {
        assert_eq!(AuthError::AuthRequired.http_status(), 401);
        assert_eq!(AuthError::AuthInvalid("x".into()).http_status(), 401);
        assert_eq!(
            AuthError::IdentityMismatch { authenticated: "a".into(), sender: "b".into() }.http_status(),
            403
        );
        assert_eq!(AuthError::JwksUnavailable("x".into()).http_status(), 503);
    }
}
