//! Bind/unbind/resolve operations behind the chat commands.

use seedbot_db::{Binding, Registry};
use thiserror::Error;
use tracing::info;

use crate::error::CommandError;

/// Offset between a 64-bit community id and its 32-bit account id.
const ID64_BASE: u64 = 0x0110_0001_0000_0000;
const PROFILE_URL: &str = "https://steamcommunity.com/profiles/";
const VANITY_URL: &str = "https://steamcommunity.com/id/";

#[derive(Debug, Error, PartialEq)]
pub enum IdentifierError {
    #[error("Steam ID cannot be empty")]
    Empty,

    #[error("Vanity name '{0}' can't be resolved here, use your numeric Steam ID or profile URL")]
    Vanity(String),

    #[error("Steam ID {0} not found")]
    Invalid(String),
}

/// Parse a player identifier into a 32-bit account id.
///
/// Accepted forms:
/// - 64-bit community id (`76561197960287930`)
/// - profile URL (`https://steamcommunity.com/profiles/<id64>`)
/// - `STEAM_X:Y:Z`
/// - `[U:1:N]`
/// - bare 32-bit account id
pub fn parse_player_id(raw: &str) -> Result<u32, IdentifierError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let invalid = || IdentifierError::Invalid(raw.to_string());

    if let Some(rest) = raw.strip_prefix(VANITY_URL) {
        return Err(IdentifierError::Vanity(rest.trim_end_matches('/').to_string()));
    }
    let raw = raw
        .strip_prefix(PROFILE_URL)
        .map(|rest| rest.trim_end_matches('/'))
        .unwrap_or(raw);

    if let Some(rest) = raw.strip_prefix("STEAM_") {
        let mut parts = rest.split(':');
        let (Some(_universe), Some(y), Some(z), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let y: u32 = y.parse().ok().filter(|y| *y <= 1).ok_or_else(invalid)?;
        let z: u32 = z.parse().map_err(|_| invalid())?;
        return z
            .checked_mul(2)
            .and_then(|z| z.checked_add(y))
            .ok_or_else(invalid);
    }

    if let Some(rest) = raw.strip_prefix("[U:1:") {
        let account = rest.strip_suffix(']').ok_or_else(invalid)?;
        return account.parse().map_err(|_| invalid());
    }

    match raw.parse::<u64>() {
        Ok(id) if id <= u64::from(u32::MAX) => Ok(id as u32),
        Ok(id) if id >= ID64_BASE && id - ID64_BASE <= u64::from(u32::MAX) => {
            Ok((id - ID64_BASE) as u32)
        }
        Ok(_) => Err(invalid()),
        Err(_) if raw.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') => {
            Err(IdentifierError::Vanity(raw.to_string()))
        }
        Err(_) => Err(invalid()),
    }
}

/// Bind `identity` to the player named by `raw`, replacing any earlier binding.
pub async fn bind(registry: &Registry, raw: &str, identity: &str) -> Result<u32, CommandError> {
    let player_id = parse_player_id(raw)?;
    let previous = registry.rebind(identity.to_string(), player_id).await?;
    info!(identity, player_id, ?previous, "identity bound");
    Ok(player_id)
}

/// Remove the binding of `identity`; succeeds when nothing was bound.
pub async fn unbind(registry: &Registry, identity: &str) -> Result<(), CommandError> {
    let existed = registry.unbind(identity.to_string()).await?;
    info!(identity, existed, "identity unbound");
    Ok(())
}

/// Resolve a partial, case-insensitive identity to its binding.
pub async fn resolve(registry: &Registry, prefix: &str) -> Result<Binding, CommandError> {
    Ok(registry.resolve_prefix(prefix.to_string()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_player_id_forms() {
        assert_eq!(parse_player_id("76561197960287930"), Ok(22202));
        assert_eq!(
            parse_player_id("https://steamcommunity.com/profiles/76561197960287930/"),
            Ok(22202)
        );
        assert_eq!(parse_player_id("STEAM_0:0:11101"), Ok(22202));
        assert_eq!(parse_player_id("STEAM_1:1:11101"), Ok(22203));
        assert_eq!(parse_player_id("[U:1:22202]"), Ok(22202));
        assert_eq!(parse_player_id(" 22202 "), Ok(22202));
    }

    #[test]
    fn test_parse_player_id_rejects() {
        assert_eq!(parse_player_id(""), Err(IdentifierError::Empty));
        assert_eq!(
            parse_player_id("https://steamcommunity.com/id/gabelogannewell/"),
            Err(IdentifierError::Vanity("gabelogannewell".to_string()))
        );
        assert_eq!(
            parse_player_id("gabelogannewell"),
            Err(IdentifierError::Vanity("gabelogannewell".to_string()))
        );
        assert!(matches!(
            parse_player_id("STEAM_0:2:5"),
            Err(IdentifierError::Invalid(_))
        ));
        assert!(matches!(
            parse_player_id("[U:1:abc]"),
            Err(IdentifierError::Invalid(_))
        ));
        // Between the 32-bit range and the 64-bit base
        assert!(matches!(
            parse_player_id("9999999999"),
            Err(IdentifierError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_resolve_unbind() {
        let registry = Registry::open_in_memory().await.unwrap();

        let id = bind(&registry, "STEAM_0:1:100", "Alice#0001").await.unwrap();
        assert_eq!(id, 201);

        let found = resolve(&registry, "ali").await.unwrap();
        assert_eq!(found, Binding::new("Alice#0001", 201));

        // Rebinding releases the old reverse entry
        bind(&registry, "[U:1:300]", "Alice#0001").await.unwrap();
        assert!(registry.find_by_player_id(201).await.is_err());

        unbind(&registry, "Alice#0001").await.unwrap();
        unbind(&registry, "Alice#0001").await.unwrap();
        let err = resolve(&registry, "ali").await.unwrap_err();
        assert!(err.user_message().contains("'ali'"));
    }

    #[tokio::test]
    async fn test_bind_bad_identifier_touches_nothing() {
        let registry = Registry::open_in_memory().await.unwrap();
        let err = bind(&registry, "STEAM_x", "Bob").await.unwrap_err();
        assert!(matches!(err, CommandError::Identifier(_)));
        assert!(registry.lookup("Bob".to_string()).await.is_err());
    }
}
