//! Bot presence line: one short rendering per populated server, refreshed on
//! the status interval.
//!
//! Templates use `{{.Field}}` placeholders over the fields of
//! [`TemplateField`]. Everything else is copied verbatim.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::restart::RestartSignal;
use crate::status::{ServerStatus, StatusBoard};

/// Shown when no templated server has players
pub const DEFAULT_PRESENCE: &str = "Natural Selection 2";

const SEPARATOR: &str = " | ";

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),

    #[error("unknown placeholder '{0}'")]
    UnknownField(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateField {
    ServerName,
    Players,
    PlayerSlots,
    SpecSlots,
    FreeSlots,
    TotalSlots,
    Map,
    Skill,
}

impl TemplateField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "ServerName" => Self::ServerName,
            "Players" => Self::Players,
            "PlayerSlots" => Self::PlayerSlots,
            "SpecSlots" => Self::SpecSlots,
            "FreeSlots" => Self::FreeSlots,
            "TotalSlots" => Self::TotalSlots,
            "Map" => Self::Map,
            "Skill" => Self::Skill,
            _ => return None,
        })
    }

    fn value(self, status: &ServerStatus) -> String {
        let total = status.player_slots + status.spec_slots;
        match self {
            Self::ServerName => status.name.clone(),
            Self::Players => status.players.to_string(),
            Self::PlayerSlots => status.player_slots.to_string(),
            Self::SpecSlots => status.spec_slots.to_string(),
            Self::FreeSlots => total.saturating_sub(status.players).to_string(),
            Self::TotalSlots => total.to_string(),
            Self::Map => status.map.clone(),
            Self::Skill => status.average_skill.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field(TemplateField),
}

/// A parsed per-server presence template.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTemplate {
    segments: Vec<Segment>,
}

impl StatusTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = raw;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + start))?;
            let name = after[..end].trim();
            let field = name
                .strip_prefix('.')
                .and_then(TemplateField::parse)
                .ok_or_else(|| TemplateError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, status: &ServerStatus) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.clone(),
                Segment::Field(field) => field.value(status),
            })
            .collect()
    }
}

/// Join the templates of every server that has players, in board order.
/// Servers without a template are left out.
pub fn presence_line(
    statuses: &[ServerStatus],
    templates: &HashMap<String, StatusTemplate>,
) -> String {
    let parts: Vec<String> = statuses
        .iter()
        .filter(|status| status.players > 0)
        .filter_map(|status| templates.get(&status.name).map(|t| t.render(status)))
        .collect();

    if parts.is_empty() {
        DEFAULT_PRESENCE.to_string()
    } else {
        parts.join(SEPARATOR)
    }
}

/// Something that can show a one-line activity for the bot.
pub trait PresenceSink: Send + Sync + 'static {
    fn set_presence(&self, text: &str);
}

/// Refresh the presence every `interval` until restart is requested.
pub async fn run_presence<P: PresenceSink>(
    sink: P,
    board: StatusBoard,
    templates: HashMap<String, StatusTemplate>,
    interval: Duration,
    mut restart: RestartSignal,
) {
    let mut current = None;
    loop {
        let line = presence_line(&board.statuses(), &templates);
        if current.as_ref() != Some(&line) {
            debug!(presence = %line, "updating presence");
            sink.set_presence(&line);
            current = Some(line);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = restart.fired() => {
                info!("Restart requested, stopping presence updater");
                return;
            }
        }
    }
}
