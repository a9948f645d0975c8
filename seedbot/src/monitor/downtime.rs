use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowntimeEvent {
    Down,
    Up { since: DateTime<Utc> },
}

/// Consecutive failed cycles and the moment the server was declared down.
#[derive(Debug, Clone)]
pub struct DowntimeTracker {
    limit: u32,
    failures: u32,
    down_since: Option<DateTime<Utc>>,
}

impl DowntimeTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            failures: 0,
            down_since: None,
        }
    }

    pub fn down_since(&self) -> Option<DateTime<Utc>> {
        self.down_since
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Option<DowntimeEvent> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.limit && self.down_since.is_none() {
            self.down_since = Some(now);
            return Some(DowntimeEvent::Down);
        }
        None
    }

    pub fn record_success(&mut self) -> Option<DowntimeEvent> {
        self.failures = 0;
        self.down_since
            .take()
            .map(|since| DowntimeEvent::Up { since })
    }
}
