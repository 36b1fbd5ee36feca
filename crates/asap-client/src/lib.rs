// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP client (C9): scoped connection pool, retry with the shared
//! backoff policy, and a per-base-URL circuit breaker.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod url_policy;

pub use client::{AsapClient, ClientConfig, ClientError};
pub use url_policy::{validate_base_url, UrlPolicyError};
