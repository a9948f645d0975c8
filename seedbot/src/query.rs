//! Game-server query collaborator and the per-cycle result record.

use std::collections::HashMap;
use std::future::Future;

use crate::error::QueryError;

/// Server info reply; only the map is consumed by the monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub map: String,
    pub players: u8,
    pub max_players: u8,
}

pub type Rules = HashMap<String, String>;

/// Black-box query client for one game server. Every call may fail independently.
pub trait QueryClient: Send + Sync + 'static {
    fn query_info(&self) -> impl Future<Output = Result<ServerInfo, QueryError>> + Send;

    fn query_rules(&self) -> impl Future<Output = Result<Rules, QueryError>> + Send;

    /// Names of the connected players.
    fn query_players(&self) -> impl Future<Output = Result<Vec<String>, QueryError>> + Send;
}

/// Outcome of the three sub-queries of one status cycle.
#[derive(Debug)]
pub struct CycleResult {
    pub info: Result<ServerInfo, QueryError>,
    pub rules: Result<Rules, QueryError>,
    pub players: Result<Vec<String>, QueryError>,
}

impl CycleResult {
    /// Run all three sub-queries, sequentially, keeping every outcome.
    pub async fn collect<Q: QueryClient>(client: &Q) -> Self {
        let info = client.query_info().await;
        let rules = client.query_rules().await;
        let players = client.query_players().await;
        Self {
            info,
            rules,
            players,
        }
    }

    pub fn all_failed(&self) -> bool {
        self.info.is_err() && self.rules.is_err() && self.players.is_err()
    }

    /// Fail with the first send-path error, if any sub-query hit one.
    pub fn into_checked(self) -> Result<Self, QueryError> {
        match self {
            Self { info: Err(e), .. } if e.is_transport() => Err(e),
            Self { rules: Err(e), .. } if e.is_transport() => Err(e),
            Self { players: Err(e), .. } if e.is_transport() => Err(e),
            checked => Ok(checked),
        }
    }

    /// Average skill from the `AverageSkill` rule. `None` if the rules query failed.
    pub fn average_skill(&self) -> Option<i32> {
        let rules = self.rules.as_ref().ok()?;
        let skill = match rules.get("AverageSkill").map(String::as_str) {
            None | Some("") | Some("nan") => 0,
            Some(raw) => match raw.parse::<f32>() {
                Ok(value) if value.is_finite() => value as i32,
                Ok(_) => 0,
                Err(e) => {
                    tracing::warn!(raw, error = %e, "parsing avg skill");
                    0
                }
            },
        };
        Some(skill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(skill: &str) -> CycleResult {
        CycleResult {
            info: Err(QueryError::Timeout),
            rules: Ok(Rules::from([("AverageSkill".to_string(), skill.to_string())])),
            players: Err(QueryError::Timeout),
        }
    }

    #[test]
    fn test_average_skill_parsing() {
        assert_eq!(rules("1534.7").average_skill(), Some(1534));
        assert_eq!(rules("nan").average_skill(), Some(0));
        assert_eq!(rules("").average_skill(), Some(0));
        assert_eq!(rules("garbage").average_skill(), Some(0));

        let mut failed = rules("1");
        failed.rules = Err(QueryError::Timeout);
        assert_eq!(failed.average_skill(), None);
    }

    #[test]
    fn test_all_failed_and_transport_check() {
        let partial = rules("1");
        assert!(!partial.all_failed());
        assert!(partial.into_checked().is_ok());

        let failed = CycleResult {
            info: Err(QueryError::Timeout),
            rules: Err(QueryError::Malformed("short".to_string())),
            players: Err(QueryError::Transport(std::io::Error::other("no route"))),
        };
        assert!(failed.all_failed());
        assert!(failed.into_checked().unwrap_err().is_transport());
    }
}
