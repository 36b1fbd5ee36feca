// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delegation graph and cycle-safe, depth-bounded cascade revocation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum traversal depth for cascade revocation, per branch.
pub const MAX_CASCADE_DEPTH: usize = 50;

/// A recorded revocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevocationEntry {
    /// Token revoked.
    pub token_id: String,
    /// When it was revoked.
    pub revoked_at: DateTime<Utc>,
    /// Human-readable reason.
    pub reason: String,
}

#[derive(Default)]
struct GraphState {
    children: HashMap<String, Vec<String>>,
    revoked: HashMap<String, RevocationEntry>,
}

/// Tracks the parent→child delegation graph and revocation state. Safe
/// under concurrent access; a single lock guards both maps since cascade
/// revocation must see a consistent view of the graph.
#[derive(Default)]
pub struct RevocationGraph {
    state: Mutex<GraphState>,
}

impl RevocationGraph {
    /// Construct an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `parent` delegated to `child`.
    pub fn record_delegation(&self, parent: &str, child: &str) {
        let mut state = self.state.lock().expect("revocation graph lock poisoned");
        state.children.entry(parent.to_string()).or_default().push(child.to_string());
    }

    /// Whether `token_id` has been revoked.
    #[must_use]
    pub fn is_revoked(&self, token_id: &str) -> bool {
        let state = self.state.lock().expect("revocation graph lock poisoned");
        state.revoked.contains_key(token_id)
    }

    /// Depth of `token_id` from the nearest ungraphed ancestor, walking
    /// the single registered parent edge per node up to
    /// [`MAX_CASCADE_DEPTH`]. Not required by revocation itself; exposed
    /// for callers that want to reject delegation chains before they
    /// grow unbounded.
    #[must_use]
    pub fn depth_of(&self, token_id: &str) -> Option<usize> {
        let state = self.state.lock().expect("revocation graph lock poisoned");
        let mut current = token_id.to_string();
        for depth in 0..=MAX_CASCADE_DEPTH {
            let parent = state.children.iter().find(|(_, kids)| kids.contains(&current)).map(|(p, _)| p.clone());
            match parent {
                Some(p) => current = p,
                None => return Some(depth),
            }
        }
        None
    }

    /// Revoke `root` and every token reachable from it through recorded
    /// delegations, iteratively and with a visited set so cycles in the
    /// graph terminate instead of looping forever, bounded to
    /// [`MAX_CASCADE_DEPTH`] per branch. Returns every token id marked
    /// revoked by this call, in visitation order.
    pub fn revoke_cascade(&self, root: &str, reason: &str, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock().expect("revocation graph lock poisoned");
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut revoked_now = Vec::new();
        queue.push_back((root.to_string(), 0usize));

        while let Some((token_id, depth)) = queue.pop_front() {
            if depth > MAX_CASCADE_DEPTH || !visited.insert(token_id.clone()) {
                continue;
            }
            state.revoked.insert(
                token_id.clone(),
                RevocationEntry { token_id: token_id.clone(), revoked_at: now, reason: reason.to_string() },
            );
            revoked_now.push(token_id.clone());
            if let Some(children) = state.children.get(&token_id).cloned() {
                for child in children {
                    queue.push_back((child, depth + 1));
                }
            }
        }
        revoked_now
    }

    /// All recorded revocations, for operator inspection.
    #[must_use]
    pub fn revocations(&self) -> Vec<RevocationEntry> {
        let state = self.state.lock().expect("revocation graph lock poisoned");
        state.revoked.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_revokes_every_descendant() {
        let graph = RevocationGraph::new();
        graph.record_delegation("root", "a");
        graph.record_delegation("root", "b");
        graph.record_delegation("a", "a1");

        let revoked = graph.revoke_cascade("root", "compromised", Utc::now());
        assert_eq!(revoked.len(), 4);
        for id in ["root", "a", "b", "a1"] {
            assert!(graph.is_revoked(id), "{id} should be revoked");
        }
    }

    #[test]
    fn cascade_terminates_on_a_cycle() {
        let graph = RevocationGraph::new();
        graph.record_delegation("a", "b");
        graph.record_delegation("b", "c");
        graph.record_delegation("c", "a");

        let revoked = graph.revoke_cascade("a", "cycle", Utc::now());
        assert_eq!(revoked.len(), 3);
    }

    #[test]
    fn cascade_is_bounded_by_max_depth() {
        let graph = RevocationGraph::new();
        let mut prev = "n0".to_string();
        for i in 1..=(MAX_CASCADE_DEPTH + 20) {
            let next = format!("n{i}");
            graph.record_delegation(&prev, &next);
            prev = next;
        }

        let revoked = graph.revoke_cascade("n0", "deep chain", Utc::now());
        assert_eq!(revoked.len(), MAX_CASCADE_DEPTH + 1);
    }

    #[test]
    fn revoking_an_unknown_root_only_revokes_the_root() {
        let graph = RevocationGraph::new();
        let revoked = graph.revoke_cascade("lonely", "no children", Utc::now());
        assert_eq!(revoked, vec!["lonely".to_string()]);
    }

    proptest::proptest! {
        /// For any delegation graph built from a small, arbitrary edge
        /// list — cycles included — `revoke_cascade` both terminates (the
        /// test itself would hang otherwise) and never revokes more nodes
        /// than the distinct token ids that actually appear in the graph.
        #[test]
        fn cascade_terminates_and_never_double_revokes(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..24),
        ) {
            let graph = RevocationGraph::new();
            let mut distinct = HashSet::new();
            distinct.insert("n0".to_string());
            for (p, c) in &edges {
                let parent = format!("n{p}");
                let child = format!("n{c}");
                graph.record_delegation(&parent, &child);
                distinct.insert(parent);
                distinct.insert(child);
            }

            let revoked = graph.revoke_cascade("n0", "fuzzed", Utc::now());
            let unique: HashSet<_> = revoked.iter().cloned().collect();
            prop_assert_eq!(revoked.len(), unique.len());
            prop_assert!(revoked.len() <= distinct.len());
        }
    }
}
