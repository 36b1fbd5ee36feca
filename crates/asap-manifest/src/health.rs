// SPDX-License-Identifier: MIT OR Apache-2.0
//! `/.well-known/asap/health` reporting.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Body returned by `GET /.well-known/asap/health`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"healthy"` or `"unhealthy"`.
    pub status: String,
    /// Seconds since process start, derived from a monotonic clock so it
    /// is never affected by wall-clock adjustments.
    pub uptime_seconds: u64,
}

impl HealthReport {
    /// Build a healthy report measuring uptime since `started_at`.
    #[must_use]
    pub fn healthy(started_at: Instant) -> Self {
        Self { status: "healthy".to_string(), uptime_seconds: started_at.elapsed().as_secs() }
    }

    /// Build an unhealthy report measuring uptime since `started_at`.
    #[must_use]
    pub fn unhealthy(started_at: Instant) -> Self {
        Self { status: "unhealthy".to_string(), uptime_seconds: started_at.elapsed().as_secs() }
    }

    /// HTTP status the report should be served with: `200` healthy, `503`
    /// otherwise.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.status == "healthy" {
            200
        } else {
            503
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn healthy_report_has_200_status() {
        let report = HealthReport::healthy(Instant::now());
        assert_eq!(report.http_status(), 200);
        assert_eq!(report.status, "healthy");
    }

    #[test]
    fn unhealthy_report_has_503_status() {
        let report = HealthReport::unhealthy(Instant::now());
        assert_eq!(report.http_status(), 503);
    }

    #[test]
    fn uptime_advances_monotonically() {
        let start = Instant::now();
        sleep(Duration::from_millis(10));
        let report = HealthReport::healthy(start);
        assert!(report.uptime_seconds < 60);
    }
}
