use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::messages;
use super::{
    DowntimeEvent, DowntimeTracker, OccupancyMachine, ServerSettings, SharedHandles,
    StatusSnapshot, Transition,
};
use crate::error::CycleError;
use crate::notifier::Notification;
use crate::query::{CycleResult, QueryClient};
use crate::restart::RestartSignal;

/// Polls one game server, drives its occupancy machine and downtime tracker.
pub struct StatusLoop<Q> {
    client: Q,
    handles: SharedHandles,
    machine: OccupancyMachine,
    downtime: DowntimeTracker,
    snapshot: StatusSnapshot,
    interval: Duration,
    ping_roles: HashMap<String, u64>,
    down_notify_ids: Vec<u64>,
    up_notify_ids: Vec<u64>,
    status_tx: watch::Sender<StatusSnapshot>,
    regulars: watch::Receiver<Vec<String>>,
}

impl<Q: QueryClient> StatusLoop<Q> {
    pub fn new(
        settings: ServerSettings,
        client: Q,
        handles: SharedHandles,
        status_tx: watch::Sender<StatusSnapshot>,
        regulars: watch::Receiver<Vec<String>>,
    ) -> Self {
        Self {
            client,
            handles,
            machine: OccupancyMachine::new(
                settings.thresholds,
                settings.cooldown,
                settings.notify_empty,
            ),
            downtime: DowntimeTracker::new(settings.failure_limit),
            snapshot: StatusSnapshot::new(settings.name, settings.thresholds),
            interval: settings.query_interval,
            ping_roles: settings.ping_roles,
            down_notify_ids: settings.down_notify_ids,
            up_notify_ids: settings.up_notify_ids,
            status_tx,
            regulars,
        }
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Run one poll cycle: query, update the snapshot, evaluate occupancy and
    /// downtime, publish.
    ///
    /// Returns `CycleError::Transport` when the query could not even be sent;
    /// the caller must stop and request a restart.
    pub async fn run_cycle(&mut self) -> Result<(), CycleError> {
        let result = CycleResult::collect(&self.client)
            .await
            .into_checked()
            .map_err(CycleError::Transport)?;
        let all_failed = result.all_failed();
        self.apply(result);

        let now = self.handles.clock.now();
        let transition = self.machine.observe(self.snapshot.players.len(), now);
        self.snapshot.state = self.machine.state();
        if let Some(transition) = transition {
            self.announce(transition).await;
        }

        let event = if all_failed {
            self.downtime.record_failure(now)
        } else {
            self.downtime.record_success()
        };
        if let Some(event) = event {
            self.notify(messages::downtime(
                &self.snapshot.name,
                event,
                &self.down_notify_ids,
                &self.up_notify_ids,
            ))
            .await;
        }
        self.snapshot.down_since = self.downtime.down_since();
        self.status_tx.send_replace(self.snapshot.clone());

        if all_failed {
            Err(CycleError::AllQueriesFailed)
        } else {
            Ok(())
        }
    }

    fn apply(&mut self, result: CycleResult) {
        let name = &self.snapshot.name;
        let average_skill = result.average_skill();
        match result.info {
            Ok(info) => self.snapshot.map = info.map,
            Err(e) => warn!(server = %name, error = %e, "server info query failed"),
        }
        match (result.rules, average_skill) {
            (Ok(_), Some(skill)) => self.snapshot.average_skill = skill,
            (Err(e), _) => warn!(server = %name, error = %e, "rules query failed"),
            (Ok(_), None) => {}
        }
        match result.players {
            Ok(players) => self.snapshot.players = players,
            Err(e) => warn!(server = %name, error = %e, "player query failed"),
        }
    }

    async fn announce(&self, transition: Transition) {
        let regulars = self.regulars.borrow().clone();
        let notification = match transition {
            Transition::Announce(state) => {
                info!(server = %self.snapshot.name, ?state, "occupancy announcement");
                messages::announcement(&self.snapshot, &regulars, state, &self.ping_roles)
            }
            Transition::SessionOver(total) => {
                info!(server = %self.snapshot.name, %total, "session over");
                Some(messages::session_over(&self.snapshot, &regulars, total))
            }
        };
        if let Some(notification) = notification {
            self.notify(notification).await;
        }
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.handles.notifier.send(notification).await {
            warn!(server = %self.snapshot.name, error = %e, "dropping notification");
        }
    }

    /// Poll until the restart signal fires or a transport failure requests one.
    pub async fn run(mut self, mut restart: RestartSignal) {
        info!(server = %self.snapshot.name, interval = ?self.interval, "status polling started");
        loop {
            match self.run_cycle().await {
                Ok(()) => debug!(server = %self.snapshot.name, "status cycle complete"),
                Err(CycleError::Transport(e)) => {
                    error!(server = %self.snapshot.name, error = %e, "Error during sending data (our IP changed?), restarting myself");
                    restart.fire();
                    return;
                }
                Err(e) => warn!(server = %self.snapshot.name, error = %e, "status cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = restart.fired() => {
                    info!(server = %self.snapshot.name, "Restart request received, stopping server polling");
                    return;
                }
            }
        }
    }
}
