// SPDX-License-Identifier: MIT OR Apache-2.0
//! Metering and SLA recording (C15): an append-only event log with
//! engine-level pagination, and SLA targets validated at construction.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod log;
mod sla;

pub use log::{MeteringEvent, MeteringError, MeteringLog};
pub use sla::{parse_percent, SlaError, SlaTarget};
