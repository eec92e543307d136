// fraudwall/src/load_shedder.rs
//
// Graceful load shedding in front of the worker channels. Under a traffic
// spike the pipeline sheds low-value work instead of building an unbounded
// queue.
//
// Priority classes (lower number = higher priority):
//   P0: users with a recent SUSPICIOUS / REJECT decision - always process
//   P1: users this process has decided on recently - process below HIGH_WATER
//   P2: unseen users - process below LOW_WATER
//
// The recency map is advisory, process-local state; losing it on restart
// only costs shedding precision, never correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::events::Decision;

const LOW_WATER:  usize = 4_096;
const HIGH_WATER: usize = 12_288;

// Entries older than this stop informing priority.
const RECENCY_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority { P0Flagged, P1Known, P2New }

pub struct LoadShedder {
    pub shed_total: AtomicU64,
    recent:         DashMap<String, (Decision, Instant)>,
}

impl LoadShedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shed_total: AtomicU64::new(0),
            recent:     DashMap::new(),
        })
    }

    /// True if this event should be processed; false if shed.
    /// queue_depth is the current worker-channel backlog.
    pub fn should_process(&self, user_id: &str, queue_depth: usize) -> bool {
        let accept = match self.classify(user_id) {
            Priority::P0Flagged => true,
            Priority::P1Known   => queue_depth < HIGH_WATER,
            Priority::P2New     => queue_depth < LOW_WATER,
        };
        if !accept {
            self.shed_total.fetch_add(1, Ordering::Relaxed);
        }
        accept
    }

    pub fn classify(&self, user_id: &str) -> Priority {
        match self.recent.get(user_id) {
            Some(entry) if entry.1.elapsed() < RECENCY_WINDOW => match entry.0 {
                Decision::Suspicious | Decision::Reject => Priority::P0Flagged,
                Decision::Approve                       => Priority::P1Known,
            },
            _ => Priority::P2New,
        }
    }

    pub fn record_decision(&self, user_id: &str, decision: Decision) {
        self.recent.insert(user_id.to_string(), (decision, Instant::now()));
    }

    /// Drop stale entries; called from the housekeeping loop.
    pub fn expire(&self) {
        self.recent.retain(|_, (_, at)| at.elapsed() < RECENCY_WINDOW);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagged_users_survive_any_backlog() {
        let shedder = LoadShedder::new();
        shedder.record_decision("mule", Decision::Reject);
        assert!(shedder.should_process("mule", usize::MAX - 1));
        assert_eq!(shedder.classify("mule"), Priority::P0Flagged);
    }

    #[test]
    fn known_users_outrank_new_ones() {
        let shedder = LoadShedder::new();
        shedder.record_decision("regular", Decision::Approve);

        // Between LOW and HIGH water: known passes, new is shed.
        let depth = LOW_WATER + 1;
        assert!(shedder.should_process("regular", depth));
        assert!(!shedder.should_process("stranger", depth));
        assert_eq!(shedder.shed_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn everyone_passes_when_quiet() {
        let shedder = LoadShedder::new();
        assert!(shedder.should_process("anyone", 0));
        assert_eq!(shedder.shed_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn known_users_shed_above_high_water() {
        let shedder = LoadShedder::new();
        shedder.record_decision("regular", Decision::Approve);
        assert!(!shedder.should_process("regular", HIGH_WATER));
    }
}
