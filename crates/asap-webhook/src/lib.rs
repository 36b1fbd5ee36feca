// SPDX-License-Identifier: MIT OR Apache-2.0
//! SSRF-guarded webhook dispatcher (C13).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod dispatcher;
mod sign;
mod ssrf;

pub use bucket::{UrlBucketMap, MAX_ENTRIES};
pub use dispatcher::{DeadLetter, WebhookDispatcher, WebhookError, WebhookRegistration, MAX_DEAD_LETTERS};
pub use sign::{sign_body, verify_signature, SIGNATURE_HEADER};
pub use ssrf::{validate_webhook_url, SsrfError};
