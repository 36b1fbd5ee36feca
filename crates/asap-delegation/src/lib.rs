// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ed25519 delegation tokens and cycle-safe cascade revocation (C14).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod revocation;
mod token;

pub use revocation::{RevocationEntry, RevocationGraph, MAX_CASCADE_DEPTH};
pub use token::{issue_token, verify_token, DelegationClaims, DelegationError};
