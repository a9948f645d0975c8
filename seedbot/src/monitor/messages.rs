//! Message composition for monitor notifications and the status command.

use std::collections::HashMap;

use chrono::TimeDelta;

use super::{DowntimeEvent, OccupancyState, StatusSnapshot};
use crate::helpers::{format_duration, format_timestamp, mention_role, mention_users, players_string};
use crate::notifier::{Embed, EmbedField, Notification};

const GREEN: u32 = 0x009900;
const AMBER: u32 = 0xcc9900;
const RED: u32 = 0xff3300;
const GREY: u32 = 0x666666;
const BLUE: u32 = 0x00aaff;

/// Current status of one server as an embed.
pub fn status_embed(snapshot: &StatusSnapshot, regulars: &[String]) -> Embed {
    let t = &snapshot.thresholds;
    let players = snapshot.players.len();
    let free_players = t.player_slots.saturating_sub(players);
    let free_specs = t
        .spec_slots
        .min((t.player_slots + t.spec_slots).saturating_sub(players));

    let title = match snapshot.down_since {
        Some(since) => format!(
            "{} [{}] currently DOWN since {}",
            snapshot.name,
            snapshot.map,
            format_timestamp(since)
        ),
        None => format!("{} [{}]", snapshot.name, snapshot.map),
    };
    let color = if players < t.almost_full {
        GREEN
    } else if players < t.player_slots {
        AMBER
    } else {
        RED
    };

    let mut fields = vec![
        EmbedField::new("Players", players.to_string(), true),
        EmbedField::new("Player slots", free_players.to_string(), true),
        EmbedField::new("Spectator slots", free_specs.to_string(), true),
    ];
    if !regulars.is_empty() {
        fields.push(EmbedField::new("Regulars", regulars.join(", "), false));
    }

    Embed {
        title,
        description: None,
        color,
        footer: Some(format!("Skill: {}", snapshot.average_skill)),
        fields,
    }
}

/// Announcement for a freshly entered occupancy tier.
pub fn announcement(
    snapshot: &StatusSnapshot,
    regulars: &[String],
    state: OccupancyState,
    ping_roles: &HashMap<String, u64>,
) -> Option<Notification> {
    let description = match state {
        OccupancyState::SeedingStarted => format!(
            "Seeding started! Players on the server: {}",
            players_string(&snapshot.players)
        ),
        OccupancyState::AlmostFull => "Server is almost full!".to_string(),
        OccupancyState::SpectatorsOnly => "Server is full but you can still make it!".to_string(),
        OccupancyState::Empty | OccupancyState::Full => return None,
    };
    let mention = state
        .ping_key()
        .and_then(|key| ping_roles.get(key))
        .map(|role| mention_role(*role))
        .unwrap_or_default();

    let mut embed = status_embed(snapshot, regulars);
    embed.description = Some(description);
    Some(Notification::embed(embed).with_content(mention))
}

pub fn session_over(snapshot: &StatusSnapshot, regulars: &[String], total: TimeDelta) -> Notification {
    let mut embed = status_embed(snapshot, regulars);
    embed.description = Some(format!(
        "Session is now over. Total time: {}",
        format_duration(total)
    ));
    embed.color = GREY;
    Notification::embed(embed)
}

pub fn downtime(name: &str, event: DowntimeEvent, down_ids: &[u64], up_ids: &[u64]) -> Notification {
    let text = match event {
        DowntimeEvent::Down => format!("Server {name} is down! {}", mention_users(down_ids)),
        DowntimeEvent::Up { since } => format!(
            "Server {name} is back up! Was down since: {} {}",
            format_timestamp(since),
            mention_users(up_ids)
        ),
    };
    Notification::text(text.trim_end())
}

/// Batched "recently joined" announcement.
pub fn regulars_joined(name: &str, map: &str, names: &[String]) -> Embed {
    Embed {
        title: format!("{name} [{map}]"),
        description: Some(names.join(", ")),
        color: BLUE,
        footer: Some("Recently joined".to_string()),
        fields: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Thresholds;
    use chrono::DateTime;

    fn snapshot(players: &[&str]) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new(
            "Test",
            Thresholds {
                seeding: 4,
                almost_full: 12,
                player_slots: 20,
                spec_slots: 6,
            },
        );
        snapshot.map = "ns2_veil".to_string();
        snapshot.players = players.iter().map(|p| p.to_string()).collect();
        snapshot.average_skill = 1500;
        snapshot
    }

    fn crowd(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_status_embed_slots_and_color() {
        let embed = status_embed(&snapshot(&["a", "b"]), &[]);
        assert_eq!(embed.title, "Test [ns2_veil]");
        assert_eq!(embed.color, GREEN);
        assert_eq!(embed.footer.as_deref(), Some("Skill: 1500"));
        let values: Vec<&str> = embed.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["2", "18", "6"]);

        let mut crowded = snapshot(&[]);
        crowded.players = crowd(23);
        let embed = status_embed(&crowded, &["Alice".to_string()]);
        assert_eq!(embed.color, RED);
        let values: Vec<&str> = embed.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["23", "0", "3", "Alice"]);

        crowded.players = crowd(15);
        assert_eq!(status_embed(&crowded, &[]).color, AMBER);
    }

    #[test]
    fn test_status_embed_when_down() {
        let mut down = snapshot(&[]);
        down.down_since = DateTime::from_timestamp(1_136_214_245, 0);
        assert_eq!(
            status_embed(&down, &[]).title,
            "Test [ns2_veil] currently DOWN since 2 Jan 2006 15:04:05 +0000"
        );
    }

    #[test]
    fn test_announcement_mentions_role() {
        let roles = HashMap::from([("seeding".to_string(), 42)]);
        let n = announcement(
            &snapshot(&["Alice", "Unknown"]),
            &[],
            OccupancyState::SeedingStarted,
            &roles,
        )
        .unwrap();
        assert_eq!(n.content.as_deref(), Some("<@&42>"));
        assert_eq!(
            n.embed.unwrap().description.as_deref(),
            Some("Seeding started! Players on the server: Alice and 1 connecting player")
        );

        let n = announcement(&snapshot(&[]), &[], OccupancyState::AlmostFull, &roles).unwrap();
        assert_eq!(n.content, None);
        assert!(announcement(&snapshot(&[]), &[], OccupancyState::Full, &roles).is_none());
    }

    #[test]
    fn test_downtime_text() {
        let down = downtime("Test", DowntimeEvent::Down, &[7], &[]);
        assert_eq!(down.content.as_deref(), Some("Server Test is down! <@7>"));

        let since = DateTime::from_timestamp(1_136_214_245, 0).unwrap();
        let up = downtime("Test", DowntimeEvent::Up { since }, &[7], &[]);
        assert_eq!(
            up.content.as_deref(),
            Some("Server Test is back up! Was down since: 2 Jan 2006 15:04:05 +0000")
        );
    }

    #[test]
    fn test_session_over_is_grey() {
        let n = session_over(&snapshot(&[]), &[], TimeDelta::seconds(5400));
        let embed = n.embed.unwrap();
        assert_eq!(embed.color, GREY);
        assert_eq!(
            embed.description.as_deref(),
            Some("Session is now over. Total time: 1h30m0s")
        );
    }
}
