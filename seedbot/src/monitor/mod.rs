//! Per-server monitoring: a status loop (occupancy and downtime) and a roster
//! loop (regulars), spawned as two independent tasks per server.
//!
//! The loops share no mutable state. Each publishes what it owns through a
//! `watch` channel: the status loop its latest [`StatusSnapshot`], the roster
//! loop the names of the regulars present. Each reads the other's channel
//! when composing messages.

mod downtime;
pub mod messages;
mod occupancy;
mod regulars;
mod roster;
mod status;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use seedbot_db::Registry;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use downtime::{DowntimeEvent, DowntimeTracker};
pub use occupancy::{OccupancyMachine, OccupancyState, Thresholds, Transition};
pub use regulars::RegularsTracker;
pub use roster::RosterLoop;
pub use status::StatusLoop;

use crate::clock::Clock;
use crate::config::{MonitorConfig, ServerConfig};
use crate::feed::IdentityFeed;
use crate::notifier::Notifier;
use crate::query::QueryClient;
use crate::restart::RestartSignal;

/// Latest observed facts about one server. Overwritten every status cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub name: String,
    pub map: String,
    pub players: Vec<String>,
    pub average_skill: i32,
    pub state: OccupancyState,
    pub down_since: Option<DateTime<Utc>>,
    pub thresholds: Thresholds,
}

impl StatusSnapshot {
    pub fn new(name: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            name: name.into(),
            map: "<unknown>".to_string(),
            players: Vec::new(),
            average_skill: 0,
            state: OccupancyState::Empty,
            down_since: None,
            thresholds,
        }
    }
}

/// Handles shared by every monitor task.
#[derive(Clone)]
pub struct SharedHandles {
    pub registry: Registry,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
    pub restart: RestartSignal,
}

#[derive(Debug, Clone)]
pub struct RosterSettings {
    pub interval: Duration,
    pub announce_delay: Duration,
    pub regular_timeout: TimeDelta,
    /// Channel for regulars announcements; `None` uses the default channel
    pub channel_id: Option<u64>,
}

/// Static settings of one monitored server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub name: String,
    pub thresholds: Thresholds,
    pub cooldown: TimeDelta,
    pub notify_empty: bool,
    pub failure_limit: u32,
    pub query_interval: Duration,
    pub ping_roles: HashMap<String, u64>,
    pub down_notify_ids: Vec<u64>,
    pub up_notify_ids: Vec<u64>,
    pub roster: RosterSettings,
}

impl ServerSettings {
    pub fn from_config(server: &ServerConfig, monitor: &MonitorConfig) -> Self {
        Self {
            name: server.name.clone(),
            thresholds: Thresholds {
                seeding: monitor.seeding.seeding,
                almost_full: monitor.seeding.almost_full,
                player_slots: server.player_slots,
                spec_slots: server.spec_slots,
            },
            cooldown: to_delta(monitor.cooldown()),
            notify_empty: monitor.seeding.notify_empty,
            failure_limit: monitor.failure_limit,
            query_interval: monitor.query_interval(),
            ping_roles: monitor.seeding.ping_roles.clone(),
            down_notify_ids: server.down_notify_ids.clone(),
            up_notify_ids: server.up_notify_ids.clone(),
            roster: RosterSettings {
                interval: server.query_id_interval(monitor.query_interval()),
                announce_delay: server.announce_delay(),
                regular_timeout: to_delta(server.regular_timeout()),
                channel_id: server.regular_channel_id.filter(|id| *id != 0),
            },
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Read side of one server's published state.
#[derive(Debug, Clone)]
pub struct ServerView {
    status: watch::Receiver<StatusSnapshot>,
    regulars: watch::Receiver<Vec<String>>,
}

impl ServerView {
    pub fn new(
        status: watch::Receiver<StatusSnapshot>,
        regulars: watch::Receiver<Vec<String>>,
    ) -> Self {
        Self { status, regulars }
    }

    pub fn name(&self) -> String {
        self.status.borrow().name.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn regulars(&self) -> Vec<String> {
        self.regulars.borrow().clone()
    }
}

/// A running monitor: its published view and its tasks.
pub struct ServerMonitor {
    pub view: ServerView,
    pub tasks: Vec<JoinHandle<()>>,
}

impl ServerMonitor {
    /// Spawn the status loop and, when a feed is given, the roster loop.
    pub fn spawn<Q, F>(
        settings: ServerSettings,
        client: Q,
        feed: Option<F>,
        handles: SharedHandles,
    ) -> Self
    where
        Q: QueryClient,
        F: IdentityFeed,
    {
        let (status_tx, status_rx) =
            watch::channel(StatusSnapshot::new(&settings.name, settings.thresholds));
        let (regulars_tx, regulars_rx) = watch::channel(Vec::new());

        let mut tasks = Vec::with_capacity(2);
        if let Some(feed) = feed {
            let roster = RosterLoop::new(
                &settings,
                feed,
                handles.clone(),
                status_rx.clone(),
                regulars_tx,
            );
            tasks.push(tokio::spawn(roster.run(handles.restart.clone())));
        }
        let restart = handles.restart.clone();
        let status = StatusLoop::new(settings, client, handles, status_tx, regulars_rx.clone());
        tasks.push(tokio::spawn(status.run(restart)));

        Self {
            view: ServerView {
                status: status_rx,
                regulars: regulars_rx,
            },
            tasks,
        }
    }
}
