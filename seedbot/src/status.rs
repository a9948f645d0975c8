//! Read-only view over every monitored server, for the `status` command and
//! the HTTP surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitor::{OccupancyState, ServerView, messages};
use crate::notifier::Embed;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub map: String,
    pub players: usize,
    pub player_names: Vec<String>,
    pub player_slots: usize,
    pub spec_slots: usize,
    pub average_skill: i32,
    pub state: OccupancyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_since: Option<DateTime<Utc>>,
    pub regulars: Vec<String>,
}

#[derive(Clone, Default)]
pub struct StatusBoard {
    servers: Arc<Vec<ServerView>>,
}

impl StatusBoard {
    pub fn new(servers: Vec<ServerView>) -> Self {
        Self {
            servers: Arc::new(servers),
        }
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.servers.iter().map(status_of).collect()
    }

    /// Status of the server with this exact name.
    pub fn get(&self, name: &str) -> Option<ServerStatus> {
        self.servers
            .iter()
            .find(|view| view.name() == name)
            .map(status_of)
    }

    pub fn embeds(&self) -> Vec<Embed> {
        self.servers
            .iter()
            .map(|view| messages::status_embed(&view.snapshot(), &view.regulars()))
            .collect()
    }
}

fn status_of(view: &ServerView) -> ServerStatus {
    let snapshot = view.snapshot();
    ServerStatus {
        players: snapshot.players.len(),
        player_slots: snapshot.thresholds.player_slots,
        spec_slots: snapshot.thresholds.spec_slots,
        name: snapshot.name,
        map: snapshot.map,
        player_names: snapshot.players,
        average_skill: snapshot.average_skill,
        state: snapshot.state,
        down_since: snapshot.down_since,
        regulars: view.regulars(),
    }
}
