use chrono::{DateTime, TimeDelta, Utc};

const TIME_FORMAT: &str = "%-d %b %Y %H:%M:%S %z";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
  at.format(TIME_FORMAT).to_string()
}

/// Whole-second duration as `1h2m3s`, `4m0s` or `12s`.
pub fn format_duration(duration: TimeDelta) -> String {
  let total = duration.num_seconds().max(0);
  let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
  if hours > 0 {
    format!("{hours}h{minutes}m{seconds}s")
  } else if minutes > 0 {
    format!("{minutes}m{seconds}s")
  } else {
    format!("{seconds}s")
  }
}

/// Comma-separated player names; `Unknown` entries are counted as connecting players.
pub fn players_string(players: &[String]) -> String {
  let (unknown, named): (Vec<&String>, Vec<&String>) =
    players.iter().partition(|p| p.as_str() == "Unknown");
  let named = named
    .iter()
    .map(|p| p.as_str())
    .collect::<Vec<_>>()
    .join(", ");
  if unknown.is_empty() {
    return named;
  }
  let suffix = if unknown.len() > 1 { "s" } else { "" };
  if named.is_empty() {
    format!("{} connecting player{suffix}", unknown.len())
  } else {
    format!("{named} and {} connecting player{suffix}", unknown.len())
  }
}

pub fn mention_users(ids: &[u64]) -> String {
  ids.iter().map(|id| format!("<@{id}>")).collect()
}

pub fn mention_role(role_id: u64) -> String {
  format!("<@&{role_id}>")
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_players_string() {
    assert_eq!(players_string(&names(&["Alice", "Bob"])), "Alice, Bob");
    assert_eq!(players_string(&names(&["Unknown"])), "1 connecting player");
    assert_eq!(
      players_string(&names(&["Unknown", "Alice", "Unknown"])),
      "Alice and 2 connecting players"
    );
    assert_eq!(players_string(&[]), "");
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(TimeDelta::seconds(12)), "12s");
    assert_eq!(format_duration(TimeDelta::seconds(240)), "4m0s");
    assert_eq!(format_duration(TimeDelta::seconds(3723)), "1h2m3s");
    assert_eq!(format_duration(TimeDelta::milliseconds(-5)), "0s");
  }

  #[test]
  fn test_format_timestamp() {
    let at = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
    assert_eq!(format_timestamp(at), "2 Jan 2006 15:04:05 +0000");
  }

  #[test]
  fn test_mentions() {
    assert_eq!(mention_users(&[1, 22]), "<@1><@22>");
    assert_eq!(mention_users(&[]), "");
    assert_eq!(mention_role(5), "<@&5>");
  }
}
