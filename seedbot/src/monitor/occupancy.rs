//! Occupancy tiers and the hysteresis machine that decides when a tier
//! change is worth announcing.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Server fullness, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyState {
    Empty,
    SeedingStarted,
    AlmostFull,
    SpectatorsOnly,
    Full,
}

impl OccupancyState {
    /// Key under which a role to mention is configured.
    pub fn ping_key(self) -> Option<&'static str> {
        match self {
            OccupancyState::SeedingStarted => Some("seeding"),
            OccupancyState::AlmostFull => Some("almost_full"),
            OccupancyState::SpectatorsOnly => Some("full"),
            OccupancyState::Empty | OccupancyState::Full => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub seeding: usize,
    pub almost_full: usize,
    pub player_slots: usize,
    pub spec_slots: usize,
}

impl Thresholds {
    pub fn classify(&self, players: usize) -> OccupancyState {
        if players < self.seeding {
            OccupancyState::Empty
        } else if players < self.almost_full {
            OccupancyState::SeedingStarted
        } else if players < self.player_slots {
            OccupancyState::AlmostFull
        } else if players < self.player_slots + self.spec_slots {
            OccupancyState::SpectatorsOnly
        } else {
            OccupancyState::Full
        }
    }
}

/// Something the machine wants announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A tier was entered and has not been announced since the last reset.
    Announce(OccupancyState),
    /// The server emptied after a session that reached almost-full.
    SessionOver(TimeDelta),
}

/// Per-server occupancy state machine.
///
/// Upward moves are committed immediately but only announced up to the
/// `max_to_message` ceiling; downward moves wait for the cooldown since the
/// last promotion.
#[derive(Debug, Clone)]
pub struct OccupancyMachine {
    thresholds: Thresholds,
    cooldown: TimeDelta,
    notify_empty: bool,
    state: OccupancyState,
    max_to_message: OccupancyState,
    last_announced: OccupancyState,
    last_promotion: Option<DateTime<Utc>>,
    session_start: Option<DateTime<Utc>>,
}

impl OccupancyMachine {
    pub fn new(thresholds: Thresholds, cooldown: TimeDelta, notify_empty: bool) -> Self {
        Self {
            thresholds,
            cooldown,
            notify_empty,
            state: OccupancyState::Empty,
            max_to_message: OccupancyState::Full,
            last_announced: OccupancyState::Empty,
            last_promotion: None,
            session_start: None,
        }
    }

    pub fn state(&self) -> OccupancyState {
        self.state
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Feed one player count sample taken at `now`.
    pub fn observe(&mut self, players: usize, now: DateTime<Utc>) -> Option<Transition> {
        let target = self.thresholds.classify(players);

        if target > self.state && target <= self.max_to_message {
            self.last_promotion = Some(now);
            self.state = target;
            if self.last_announced == target {
                return None;
            }
            self.last_announced = target;
            match target {
                OccupancyState::SeedingStarted => {
                    self.max_to_message = OccupancyState::SpectatorsOnly;
                }
                OccupancyState::AlmostFull => self.session_start = Some(now),
                OccupancyState::SpectatorsOnly => {
                    self.max_to_message = OccupancyState::SeedingStarted;
                }
                OccupancyState::Empty | OccupancyState::Full => return None,
            }
            return Some(Transition::Announce(target));
        }

        if !self.cooldown_elapsed(now) {
            return None;
        }
        self.state = target;
        if target != OccupancyState::Empty {
            return None;
        }
        // Allow seeding announcements on the next upswing
        self.last_announced = OccupancyState::Empty;
        let session_start = self.session_start.take()?;
        self.notify_empty
            .then(|| Transition::SessionOver(now - session_start))
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_promotion
            .is_none_or(|promoted| now - promoted > self.cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    use OccupancyState::*;

    const THRESHOLDS: Thresholds = Thresholds {
        seeding: 4,
        almost_full: 12,
        player_slots: 20,
        spec_slots: 6,
    };

    struct Harness {
        machine: OccupancyMachine,
        clock: ManualClock,
    }

    impl Harness {
        fn new(notify_empty: bool) -> Self {
            Self {
                machine: OccupancyMachine::new(THRESHOLDS, TimeDelta::seconds(60), notify_empty),
                clock: ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
            }
        }

        fn pass_time(&self) {
            self.clock.advance(TimeDelta::seconds(61));
        }

        fn observe(&mut self, players: usize) -> Option<Transition> {
            self.machine.observe(players, self.clock.now())
        }

        #[track_caller]
        fn expect(&mut self, players: usize, expected: Option<OccupancyState>) {
            let got = self.observe(players);
            assert_eq!(
                got,
                expected.map(Transition::Announce),
                "unexpected outcome for {players} players"
            );
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(THRESHOLDS.classify(0), Empty);
        assert_eq!(THRESHOLDS.classify(3), Empty);
        assert_eq!(THRESHOLDS.classify(4), SeedingStarted);
        assert_eq!(THRESHOLDS.classify(12), AlmostFull);
        assert_eq!(THRESHOLDS.classify(20), SpectatorsOnly);
        assert_eq!(THRESHOLDS.classify(25), SpectatorsOnly);
        assert_eq!(THRESHOLDS.classify(26), Full);
    }

    #[test]
    fn test_below_seeding_never_announces() {
        let mut h = Harness::new(false);
        for n in 0..4 {
            h.expect(n, None);
        }
        assert_eq!(h.machine.state(), Empty);
    }

    #[test]
    fn test_filling_up_announces_each_tier_once() {
        let mut h = Harness::new(false);
        h.expect(0, None);
        h.expect(4, Some(SeedingStarted));
        h.expect(13, Some(AlmostFull));
        h.expect(21, Some(SpectatorsOnly));
        h.expect(26, None);
        assert_eq!(h.machine.state(), SpectatorsOnly);
    }

    #[test]
    fn test_full_oscillation_is_quiet() {
        let mut h = Harness::new(false);
        h.expect(4, Some(SeedingStarted));
        h.expect(13, Some(AlmostFull));
        h.expect(21, Some(SpectatorsOnly));
        for n in [26, 21, 26, 20, 26, 25] {
            h.expect(n, None);
        }
    }

    #[test]
    fn test_full_transition_sequence() {
        let mut h = Harness::new(false);
        h.expect(0, None);
        h.expect(4, Some(SeedingStarted));
        // Quick demotion is held back by the cooldown
        h.expect(3, None);
        h.expect(5, None);
        h.pass_time();
        h.expect(5, None);
        h.expect(13, Some(AlmostFull));
        h.expect(21, Some(SpectatorsOnly));
        h.expect(26, None);
        h.expect(19, None);
        h.pass_time();
        h.expect(21, None);
        h.pass_time();
        h.expect(13, None);
        h.pass_time();
        // Empty re-arms seeding
        h.expect(3, None);
        assert_eq!(h.machine.state(), Empty);
        h.pass_time();
        h.expect(7, Some(SeedingStarted));
        h.expect(12, Some(AlmostFull));
        h.pass_time();
        h.expect(6, None);
        // No duplicate even after the cooldown
        h.expect(12, None);
        h.pass_time();
        h.expect(3, None);
        h.expect(4, Some(SeedingStarted));
        h.pass_time();
        h.expect(3, None);
        h.expect(4, Some(SeedingStarted));
    }

    #[test]
    fn test_seeding_not_reannounced_within_cooldown() {
        let mut h = Harness::new(false);
        h.expect(4, Some(SeedingStarted));
        h.expect(0, None);
        h.expect(4, None);
        h.pass_time();
        h.expect(0, None);
        h.expect(4, Some(SeedingStarted));
    }

    #[test]
    fn test_session_over_after_almost_full() {
        let mut h = Harness::new(true);
        h.expect(4, Some(SeedingStarted));
        h.expect(12, Some(AlmostFull));
        h.clock.advance(TimeDelta::seconds(3600));
        assert_eq!(
            h.observe(0),
            Some(Transition::SessionOver(TimeDelta::seconds(3600)))
        );
        // Only once per session
        h.pass_time();
        assert_eq!(h.observe(0), None);
    }

    #[test]
    fn test_session_over_needs_opt_in() {
        let mut h = Harness::new(false);
        h.expect(12, Some(AlmostFull));
        h.pass_time();
        assert_eq!(h.observe(0), None);
    }
}
