// SPDX-License-Identifier: MIT OR Apache-2.0
//! The manifest document (C3): data model, singleflight discovery cache
//! with conditional GET, health reporting, and the local-advertisement
//! seam.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod advertise;
pub mod cache;
pub mod health;
pub mod manifest;

pub use advertise::{AdvertiseError, Advertiser};
pub use cache::{FetchError, ManifestCache};
pub use health::HealthReport;
pub use manifest::{AuthConfig, Capabilities, Endpoints, Manifest, ManifestValidationError, Skill};
