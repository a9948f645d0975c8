//! Bookkeeping for "recently joined" regulars announcements.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use seedbot_db::Binding;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RegularsTracker {
    timeout: TimeDelta,
    /// Recently seen or announced regulars and when they may be announced again
    known: HashMap<u32, DateTime<Utc>>,
    /// Newly seen regulars waiting for the batched announcement
    pending: Vec<Binding>,
    present: Vec<String>,
}

impl RegularsTracker {
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            timeout,
            known: HashMap::new(),
            pending: Vec::new(),
            present: Vec::new(),
        }
    }

    /// Names of the regulars seen in the latest sample.
    pub fn present(&self) -> &[String] {
        &self.present
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Record the regulars currently connected.
    pub fn observe(&mut self, regulars: &[Binding], now: DateTime<Utc>) {
        self.known.retain(|_, expiry| now <= *expiry);
        self.present = regulars.iter().map(|r| r.identity.clone()).collect();

        for regular in regulars {
            if self.pending.iter().any(|p| p.player_id == regular.player_id) {
                continue;
            }
            if self.known.contains_key(&regular.player_id) {
                self.known.insert(regular.player_id, now + self.timeout);
            } else {
                info!(identity = %regular.identity, "Adding regular to announce");
                self.pending.push(regular.clone());
            }
        }
    }

    /// Drain the pending set, returning the names of those still connected.
    /// Announced regulars won't be announced again until they expire.
    pub fn take_announcement(&mut self, connected: &[u32], now: DateTime<Utc>) -> Vec<String> {
        let connected: HashSet<u32> = connected.iter().copied().collect();
        let mut names = Vec::new();
        for regular in self.pending.drain(..) {
            if connected.contains(&regular.player_id) {
                self.known.insert(regular.player_id, now + self.timeout);
                names.push(regular.identity);
            }
        }
        names
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn alice() -> Binding {
        Binding::new("Alice", 1)
    }

    fn bob() -> Binding {
        Binding::new("Bob", 2)
    }

    #[test]
    fn test_new_regulars_are_batched_once() {
        let mut tracker = RegularsTracker::new(TimeDelta::seconds(3600));

        tracker.observe(&[alice()], t(0));
        tracker.observe(&[alice(), bob()], t(10));
        assert!(tracker.has_pending());
        assert_eq!(tracker.present(), ["Alice", "Bob"]);

        let names = tracker.take_announcement(&[1, 2, 99], t(300));
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert!(!tracker.has_pending());

        // Still around: refreshed, not re-queued
        tracker.observe(&[alice(), bob()], t(400));
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_departed_regulars_are_not_announced() {
        let mut tracker = RegularsTracker::new(TimeDelta::seconds(3600));
        tracker.observe(&[alice(), bob()], t(0));

        let names = tracker.take_announcement(&[2], t(300));
        assert_eq!(names, vec!["Bob"]);

        // Alice was never announced, so she queues again on return
        tracker.observe(&[alice()], t(400));
        assert!(tracker.has_pending());
    }

    #[test]
    fn test_regular_reannounced_after_expiry() {
        let mut tracker = RegularsTracker::new(TimeDelta::seconds(60));
        tracker.observe(&[alice()], t(0));
        tracker.take_announcement(&[1], t(10));

        tracker.observe(&[], t(50));
        tracker.observe(&[alice()], t(100));
        assert!(tracker.has_pending());
        assert!(tracker.present().contains(&"Alice".to_string()));
    }
}
