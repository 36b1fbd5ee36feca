// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backoff and circuit breaker policy shared by the HTTP client (C9) and
//! webhook dispatcher (C13).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod circuit;

pub use backoff::{backoff_delay, Retriable};
pub use circuit::{CircuitBreakerRegistry, CircuitState};
