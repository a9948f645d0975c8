mod error;
mod models;
mod store;

pub use error::{DbError, Result};
pub use models::Binding;
pub use tokio_rusqlite::rusqlite::Error as SqliteError;

use std::path::Path;
use store::{FORWARD, LOWERCASE, NameKey, PlayerKey, REVERSE, SCHEMA};
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;
use tracing::{debug, info};

/// Identity registry: community identity <-> player id, plus a lowercase
/// index for case-insensitive prefix search.
///
/// Every mutation runs in a single SQLite transaction, so readers see either
/// the state before or after it, never a half-written binding.
#[derive(Clone)]
pub struct Registry {
  conn: Connection,
}

impl Registry {
  /// Open or create a registry at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let registry = Self { conn };
    registry.initialize().await?;
    Ok(registry)
  }

  /// Create an in-memory registry (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let registry = Self { conn };
    registry.initialize().await?;
    Ok(registry)
  }

  async fn initialize(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;

    info!("registry initialized");
    Ok(())
  }

  // ========================================================================
  // Mutations
  // ========================================================================

  /// Bind `identity` to `player_id`.
  ///
  /// Writes the forward entry, overwrites the reverse entry for `player_id`
  /// and writes the lowercase index entry. A reverse entry left behind by a
  /// previous player id of this identity is not touched; use [`Registry::rebind`]
  /// for that.
  pub async fn bind(&self, identity: String, player_id: u32) -> Result<()> {
    let identity_log = identity.clone();

    self
      .conn
      .call(move |conn| put_binding(conn, &identity, player_id, false))
      .await?;

    debug!(identity = %identity_log, player_id, "bound identity");
    Ok(())
  }

  /// Bind `identity` to `player_id`, releasing the reverse entry of the
  /// player id it was previously bound to (if that entry still points here).
  /// Returns the previous player id, if any.
  pub async fn rebind(&self, identity: String, player_id: u32) -> Result<Option<u32>> {
    let identity_log = identity.clone();

    let previous = self
      .conn
      .call(move |conn| put_binding(conn, &identity, player_id, true))
      .await?;

    debug!(identity = %identity_log, player_id, ?previous, "rebound identity");
    Ok(previous)
  }

  /// Remove the binding of `identity`. Safe to call when nothing is bound.
  /// Returns true if a forward binding existed.
  pub async fn unbind(&self, identity: String) -> Result<bool> {
    let identity_log = identity.clone();

    let existed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let name = NameKey::from(identity.as_str());

        let previous = FORWARD.get(&tx, &name)?;
        FORWARD.delete(&tx, &name)?;
        if let Some(player) = previous {
          release_reverse(&tx, player, &identity)?;
        }
        release_lowercase(&tx, &identity)?;

        tx.commit()?;
        Ok(previous.is_some())
      })
      .await?;

    debug!(identity = %identity_log, existed, "unbound identity");
    Ok(existed)
  }

  /// Rebuild the reverse index from the forward index.
  ///
  /// Clears the reverse namespace and rewrites it in one transaction, so it is
  /// idempotent and safe against a live registry. Returns the number of
  /// reverse entries written.
  pub async fn reindex(&self) -> Result<u64> {
    let written = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        REVERSE.clear(&tx)?;

        let bindings = FORWARD.entries(&tx)?;
        for (name, player) in &bindings {
          REVERSE.put(&tx, player, name)?;
        }

        tx.commit()?;
        Ok(bindings.len() as u64)
      })
      .await?;

    info!(written, "rebuilt reverse index");
    Ok(written)
  }

  // ========================================================================
  // Lookups
  // ========================================================================

  /// Player id bound to `identity`.
  pub async fn lookup(&self, identity: String) -> Result<u32> {
    let name = NameKey::from(identity.as_str());

    let player = self
      .conn
      .call(move |conn| FORWARD.get(conn, &name))
      .await?;

    player
      .map(|p| p.0)
      .ok_or(DbError::IdentityNotFound(identity))
  }

  /// Identity bound to `player_id` (reverse lookup).
  pub async fn find_by_player_id(&self, player_id: u32) -> Result<String> {
    let name = self
      .conn
      .call(move |conn| REVERSE.get(conn, &PlayerKey(player_id)))
      .await?;

    name
      .map(|n| n.0)
      .ok_or(DbError::PlayerNotFound(player_id))
  }

  /// Lexicographically first identity whose lowercase form starts with `prefix`.
  pub async fn find_first_by_prefix(&self, prefix: String) -> Result<String> {
    let lowercase = prefix.to_lowercase();

    let name = self
      .conn
      .call(move |conn| LOWERCASE.first_with_prefix(conn, lowercase.as_bytes()))
      .await?;

    name.map(|n| n.0).ok_or(DbError::PrefixNotFound(prefix))
  }

  /// Resolve a partial identity to its full binding.
  pub async fn resolve_prefix(&self, prefix: String) -> Result<Binding> {
    let lowercase = prefix.to_lowercase();

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(name) = LOWERCASE.first_with_prefix(&tx, lowercase.as_bytes())? else {
          return Ok(None);
        };
        let player = FORWARD.get(&tx, &name)?;
        Ok(Some((name.0, player.map(|p| p.0))))
      })
      .await?;

    match found {
      None => Err(DbError::PrefixNotFound(prefix)),
      Some((identity, None)) => Err(DbError::IdentityNotFound(identity)),
      Some((identity, Some(player_id))) => Ok(Binding {
        identity,
        player_id,
      }),
    }
  }

  /// Reverse-look-up a batch of player ids in one read transaction.
  /// Unknown ids are skipped; input order is preserved.
  pub async fn find_regulars(&self, player_ids: Vec<u32>) -> Result<Vec<Binding>> {
    let bindings = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut found = Vec::with_capacity(player_ids.len());
        for player_id in player_ids {
          if let Some(name) = REVERSE.get(&tx, &PlayerKey(player_id))? {
            found.push(Binding {
              identity: name.0,
              player_id,
            });
          }
        }
        Ok(found)
      })
      .await?;

    Ok(bindings)
  }
}

/// Write all three index entries for a binding in one transaction.
/// Returns the player id the identity was bound to before.
fn put_binding(
  conn: &mut rusqlite::Connection,
  identity: &str,
  player_id: u32,
  release_previous: bool,
) -> rusqlite::Result<Option<u32>> {
  let tx = conn.transaction()?;
  let name = NameKey::from(identity);
  let player = PlayerKey(player_id);

  let previous = FORWARD.get(&tx, &name)?;
  if release_previous {
    if let Some(old) = previous.filter(|old| *old != player) {
      release_reverse(&tx, old, identity)?;
    }
  }

  FORWARD.put(&tx, &name, &player)?;
  REVERSE.put(&tx, &player, &name)?;
  LOWERCASE.put(&tx, &NameKey(identity.to_lowercase()), &name)?;

  tx.commit()?;
  Ok(previous.map(|p| p.0))
}

/// Delete the reverse entry of `player` only if it still points at `identity`.
fn release_reverse(
  conn: &rusqlite::Connection,
  player: PlayerKey,
  identity: &str,
) -> rusqlite::Result<bool> {
  match REVERSE.get(conn, &player)? {
    Some(owner) if owner.0 == identity => REVERSE.delete(conn, &player),
    _ => Ok(false),
  }
}

/// Drop the lowercase entry of `identity` if it owns it. When another bound
/// identity folds to the same lowercase key, the entry moves to that one.
fn release_lowercase(conn: &rusqlite::Connection, identity: &str) -> rusqlite::Result<()> {
  let lower = NameKey(identity.to_lowercase());
  match LOWERCASE.get(conn, &lower)? {
    Some(owner) if owner.0 == identity => {}
    _ => return Ok(()),
  }

  let survivor = FORWARD
    .entries(conn)?
    .into_iter()
    .map(|(name, _)| name)
    .find(|name| name.0 != identity && name.0.to_lowercase() == lower.0);
  match survivor {
    Some(name) => LOWERCASE.put(conn, &lower, &name),
    None => LOWERCASE.delete(conn, &lower).map(|_| ()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn setup() -> Registry {
    Registry::open_in_memory().await.unwrap()
  }

  #[tokio::test]
  async fn test_bind_lookup_unbind() {
    let registry = setup().await;

    registry.bind("Alice#0001".to_string(), 42).await.unwrap();
    assert_eq!(registry.lookup("Alice#0001".to_string()).await.unwrap(), 42);
    assert_eq!(
      registry.find_by_player_id(42).await.unwrap(),
      "Alice#0001"
    );

    assert!(registry.unbind("Alice#0001".to_string()).await.unwrap());
    let err = registry.lookup("Alice#0001".to_string()).await.unwrap_err();
    assert!(matches!(err, DbError::IdentityNotFound(_)));
    assert!(err.is_not_found());

    // Reverse and lowercase entries are gone too
    assert!(matches!(
      registry.find_by_player_id(42).await,
      Err(DbError::PlayerNotFound(42))
    ));
    assert!(matches!(
      registry.find_first_by_prefix("alice".to_string()).await,
      Err(DbError::PrefixNotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_unbind_is_idempotent() {
    let registry = setup().await;

    assert!(!registry.unbind("nobody#0000".to_string()).await.unwrap());

    registry.bind("Bob#0002".to_string(), 7).await.unwrap();
    assert!(registry.unbind("Bob#0002".to_string()).await.unwrap());
    assert!(!registry.unbind("Bob#0002".to_string()).await.unwrap());
  }

  #[tokio::test]
  async fn test_plain_bind_keeps_old_reverse_entry() {
    let registry = setup().await;

    registry.bind("Alice#0001".to_string(), 1).await.unwrap();
    registry.bind("Alice#0001".to_string(), 2).await.unwrap();

    assert_eq!(registry.lookup("Alice#0001".to_string()).await.unwrap(), 2);
    // bind alone leaves the previous reverse entry behind
    assert_eq!(registry.find_by_player_id(1).await.unwrap(), "Alice#0001");
    assert_eq!(registry.find_by_player_id(2).await.unwrap(), "Alice#0001");
  }

  #[tokio::test]
  async fn test_rebind_removes_stale_reverse_entry() {
    let registry = setup().await;

    assert_eq!(
      registry.rebind("Alice#0001".to_string(), 1).await.unwrap(),
      None
    );
    assert_eq!(
      registry.rebind("Alice#0001".to_string(), 2).await.unwrap(),
      Some(1)
    );

    assert_eq!(registry.lookup("Alice#0001".to_string()).await.unwrap(), 2);
    assert!(matches!(
      registry.find_by_player_id(1).await,
      Err(DbError::PlayerNotFound(1))
    ));
    assert_eq!(registry.find_by_player_id(2).await.unwrap(), "Alice#0001");
  }

  #[tokio::test]
  async fn test_rebind_does_not_steal_foreign_reverse_entry() {
    let registry = setup().await;

    registry.rebind("Alice#0001".to_string(), 1).await.unwrap();
    // Bob takes over player 1's reverse entry
    registry.rebind("Bob#0002".to_string(), 1).await.unwrap();
    // Alice moves on; player 1 still belongs to Bob
    registry.rebind("Alice#0001".to_string(), 2).await.unwrap();

    assert_eq!(registry.find_by_player_id(1).await.unwrap(), "Bob#0002");
    assert_eq!(registry.find_by_player_id(2).await.unwrap(), "Alice#0001");
  }

  #[tokio::test]
  async fn test_unbind_keeps_reverse_entry_owned_by_someone_else() {
    let registry = setup().await;

    registry.bind("Alice#0001".to_string(), 1).await.unwrap();
    registry.bind("Bob#0002".to_string(), 1).await.unwrap();

    registry.unbind("Alice#0001".to_string()).await.unwrap();
    assert_eq!(registry.find_by_player_id(1).await.unwrap(), "Bob#0002");
  }

  #[tokio::test]
  async fn test_unbind_keeps_case_variant_searchable() {
    let registry = setup().await;

    registry.bind("Alice".to_string(), 1).await.unwrap();
    registry.bind("alice".to_string(), 2).await.unwrap();
    registry.unbind("alice".to_string()).await.unwrap();

    assert_eq!(registry.lookup("Alice".to_string()).await.unwrap(), 1);
    assert_eq!(
      registry.find_first_by_prefix("ali".to_string()).await.unwrap(),
      "Alice"
    );
  }

  #[tokio::test]
  async fn test_unbind_leaves_lowercase_entry_owned_by_variant() {
    let registry = setup().await;

    registry.bind("alice".to_string(), 2).await.unwrap();
    registry.bind("Alice".to_string(), 1).await.unwrap();
    registry.unbind("alice".to_string()).await.unwrap();

    assert_eq!(
      registry.find_first_by_prefix("ali".to_string()).await.unwrap(),
      "Alice"
    );

    registry.unbind("Alice".to_string()).await.unwrap();
    assert!(matches!(
      registry.find_first_by_prefix("ali".to_string()).await,
      Err(DbError::PrefixNotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_find_first_by_prefix() {
    let registry = setup().await;

    registry.bind("Alina#0003".to_string(), 3).await.unwrap();
    registry.bind("alice#0002".to_string(), 2).await.unwrap();
    registry.bind("ALICE#0001".to_string(), 1).await.unwrap();
    registry.bind("Bob#0004".to_string(), 4).await.unwrap();

    assert_eq!(
      registry.find_first_by_prefix("ali".to_string()).await.unwrap(),
      "ALICE#0001"
    );
    assert_eq!(
      registry.find_first_by_prefix("ALIN".to_string()).await.unwrap(),
      "Alina#0003"
    );
    assert!(matches!(
      registry.find_first_by_prefix("carol".to_string()).await,
      Err(DbError::PrefixNotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_resolve_prefix() {
    let registry = setup().await;

    registry.bind("Steve#1234".to_string(), 99).await.unwrap();

    let binding = registry.resolve_prefix("ste".to_string()).await.unwrap();
    assert_eq!(binding, Binding::new("Steve#1234", 99));

    assert!(
      registry
        .resolve_prefix("x".to_string())
        .await
        .unwrap_err()
        .is_not_found()
    );
  }

  #[tokio::test]
  async fn test_find_regulars_preserves_order_and_skips_unknown() {
    let registry = setup().await;

    registry.bind("Alice#0001".to_string(), 1).await.unwrap();
    registry.bind("Bob#0002".to_string(), 2).await.unwrap();

    let found = registry.find_regulars(vec![2, 5, 1]).await.unwrap();
    assert_eq!(
      found,
      vec![Binding::new("Bob#0002", 2), Binding::new("Alice#0001", 1)]
    );
  }

  #[tokio::test]
  async fn test_reindex_rebuilds_reverse_index() {
    let registry = setup().await;

    registry.bind("Alice#0001".to_string(), 1).await.unwrap();
    registry.bind("Alice#0001".to_string(), 2).await.unwrap();
    registry.bind("Bob#0002".to_string(), 3).await.unwrap();

    // Stale entry for player 1 exists before the rebuild
    assert!(registry.find_by_player_id(1).await.is_ok());

    assert_eq!(registry.reindex().await.unwrap(), 2);
    assert!(registry.find_by_player_id(1).await.is_err());
    assert_eq!(registry.find_by_player_id(2).await.unwrap(), "Alice#0001");
    assert_eq!(registry.find_by_player_id(3).await.unwrap(), "Bob#0002");

    // Running it again changes nothing
    assert_eq!(registry.reindex().await.unwrap(), 2);
    assert_eq!(registry.find_by_player_id(2).await.unwrap(), "Alice#0001");
  }

  #[tokio::test]
  async fn test_registry_persists_across_reopen() {
    let path = std::env::temp_dir().join(format!("seedbot-registry-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    {
      let registry = Registry::open(&path).await.unwrap();
      registry.bind("Alice#0001".to_string(), 5).await.unwrap();
    }

    let registry = Registry::open(&path).await.unwrap();
    assert_eq!(registry.lookup("Alice#0001".to_string()).await.unwrap(), 5);

    drop(registry);
    let _ = std::fs::remove_file(&path);
  }
}
