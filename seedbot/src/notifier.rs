//! Outbound notification queue.
//!
//! Monitors and commands push [`Notification`]s into a bounded mpsc channel;
//! a single dispatcher drains it in order and hands each message to a
//! [`NotificationSink`], sleeping a fixed interval between deliveries.
//! Producers block when the queue is full.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::QueueClosed;
use crate::restart::RestartSignal;

/// A platform-agnostic rich message body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub color: u32,
    pub footer: Option<String>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// One outbound message. `channel_id = None` means the default channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub channel_id: Option<u64>,
}

impl Notification {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    /// Attach mention text. Empty mentions are dropped.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.content = (!content.is_empty()).then_some(content);
        self
    }

    pub fn to_channel(mut self, channel_id: Option<u64>) -> Self {
        self.channel_id = channel_id;
        self
    }
}

/// Producer handle for the notification queue. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Create a queue holding at most `capacity` undelivered notifications.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a notification, waiting for room if the queue is full.
    pub async fn send(&self, notification: Notification) -> Result<(), QueueClosed> {
        self.tx.send(notification).await.map_err(|_| QueueClosed)
    }
}

/// Where notifications end up (a chat channel in production).
pub trait NotificationSink: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    fn deliver(
        &self,
        channel_id: u64,
        notification: Notification,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Drain the queue into `sink` until every producer is gone or a restart is requested.
///
/// Delivery failures are logged and dropped; notifications are best-effort.
pub async fn run_dispatcher<S: NotificationSink>(
    mut rx: mpsc::Receiver<Notification>,
    sink: S,
    default_channel: u64,
    min_interval: Duration,
    mut restart: RestartSignal,
) {
    info!(default_channel, ?min_interval, "notification dispatcher started");
    loop {
        let notification = tokio::select! {
            next = rx.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
            _ = restart.fired() => {
                info!("Restart request received, stopping notification dispatcher");
                return;
            }
        };

        let channel_id = notification.channel_id.unwrap_or(default_channel);
        match sink.deliver(channel_id, notification).await {
            Ok(()) => debug!(channel_id, "notification delivered"),
            Err(e) => warn!(channel_id, error = %e, "failed to deliver notification"),
        }
        tokio::select! {
            _ = tokio::time::sleep(min_interval) => {}
            _ = restart.fired() => {
                info!("Restart request received, stopping notification dispatcher");
                return;
            }
        }
    }
    info!("notification queue closed, dispatcher stopped");
}
