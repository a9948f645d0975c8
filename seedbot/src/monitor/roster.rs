use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::messages;
use super::{RegularsTracker, ServerSettings, SharedHandles, StatusSnapshot};
use crate::error::RosterError;
use crate::feed::IdentityFeed;
use crate::notifier::Notification;
use crate::restart::RestartSignal;

/// Polls the identity feed of one server and announces regulars in batches.
pub struct RosterLoop<F> {
    name: String,
    feed: F,
    handles: SharedHandles,
    tracker: RegularsTracker,
    interval: Duration,
    announce_delay: Duration,
    channel_id: Option<u64>,
    status: watch::Receiver<StatusSnapshot>,
    regulars_tx: watch::Sender<Vec<String>>,
}

impl<F: IdentityFeed> RosterLoop<F> {
    pub fn new(
        settings: &ServerSettings,
        feed: F,
        handles: SharedHandles,
        status: watch::Receiver<StatusSnapshot>,
        regulars_tx: watch::Sender<Vec<String>>,
    ) -> Self {
        Self {
            name: settings.name.clone(),
            feed,
            handles,
            tracker: RegularsTracker::new(settings.roster.regular_timeout),
            interval: settings.roster.interval,
            announce_delay: settings.roster.announce_delay,
            channel_id: settings.roster.channel_id,
            status,
            regulars_tx,
        }
    }

    pub fn tracker(&self) -> &RegularsTracker {
        &self.tracker
    }

    /// Fetch connected ids, resolve the regulars among them and publish
    /// their names.
    pub async fn poll(&mut self) -> Result<(), RosterError> {
        let ids = self.feed.connected_ids().await?;
        let regulars = self.handles.registry.find_regulars(ids).await?;
        self.tracker.observe(&regulars, self.handles.clock.now());
        self.regulars_tx
            .send_replace(self.tracker.present().to_vec());
        Ok(())
    }

    /// Announce the pending regulars that are still connected.
    pub async fn announce(&mut self) {
        let connected = match self.feed.connected_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(server = %self.name, error = %e, "Error getting IDs, dropping pending regulars");
                self.tracker.discard_pending();
                return;
            }
        };
        let names = self
            .tracker
            .take_announcement(&connected, self.handles.clock.now());
        if names.is_empty() {
            debug!(server = %self.name, "pending regulars left before the announcement");
            return;
        }

        info!(server = %self.name, count = names.len(), "announcing regulars");
        let map = self.status.borrow().map.clone();
        let notification = Notification::embed(messages::regulars_joined(&self.name, &map, &names))
            .to_channel(self.channel_id);
        if let Err(e) = self.handles.notifier.send(notification).await {
            warn!(server = %self.name, error = %e, "dropping regulars announcement");
        }
    }

    /// Poll until the restart signal fires.
    ///
    /// A failed poll skips the cycle. The announcement timer is armed once
    /// when regulars become pending and disarmed when nothing is pending.
    pub async fn run(mut self, mut restart: RestartSignal) {
        info!(server = %self.name, interval = ?self.interval, "steam ids polling started");
        let mut announce_at: Option<Instant> = None;
        loop {
            if let Err(e) = self.poll().await {
                warn!(server = %self.name, error = %e, "roster cycle skipped");
            }
            if !self.tracker.has_pending() {
                announce_at = None;
            } else if announce_at.is_none() {
                announce_at = Some(Instant::now() + self.announce_delay);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = sleep_until_armed(announce_at) => {
                    self.announce().await;
                    announce_at = None;
                }
                _ = restart.fired() => {
                    info!(server = %self.name, "Restart request received, stopping steam ids polling");
                    return;
                }
            }
        }
    }
}

async fn sleep_until_armed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
