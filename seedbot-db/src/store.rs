//! Byte-oriented key-value namespaces on top of SQLite.
//!
//! Every namespace is a `WITHOUT ROWID` table keyed by a BLOB, so ordering is
//! plain byte order and prefix scans behave like a sorted KV cursor.

use std::marker::PhantomData;

use tokio_rusqlite::rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension, ToSql, params};

/// Identity string -> player id.
pub(crate) const FORWARD: Bucket<NameKey, PlayerKey> = Bucket::new("forward_bindings");
/// Player id -> identity string.
pub(crate) const REVERSE: Bucket<PlayerKey, NameKey> = Bucket::new("reverse_bindings");
/// Lowercase identity -> canonical identity.
pub(crate) const LOWERCASE: Bucket<NameKey, NameKey> = Bucket::new("lowercase_index");

pub(crate) const SCHEMA: &str = r#"
  CREATE TABLE IF NOT EXISTS forward_bindings (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
  ) WITHOUT ROWID;

  CREATE TABLE IF NOT EXISTS reverse_bindings (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
  ) WITHOUT ROWID;

  CREATE TABLE IF NOT EXISTS lowercase_index (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
  ) WITHOUT ROWID;
"#;

/// Player id stored as 4 little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlayerKey(pub u32);

impl ToSql for PlayerKey {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.0.to_le_bytes().to_vec()))
  }
}

impl FromSql for PlayerKey {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    let blob = value.as_blob()?;
    let bytes: [u8; 4] = blob
      .try_into()
      .map_err(|_| FromSqlError::InvalidBlobSize {
        expected_size: 4,
        blob_size: blob.len(),
      })?;
    Ok(Self(u32::from_le_bytes(bytes)))
  }
}

/// UTF-8 string stored as raw bytes (never as TEXT, so it sorts with the other blobs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NameKey(pub String);

impl From<&str> for NameKey {
  fn from(value: &str) -> Self {
    Self(value.to_owned())
  }
}

impl ToSql for NameKey {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::Borrowed(ValueRef::Blob(self.0.as_bytes())))
  }
}

impl FromSql for NameKey {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    let blob = value.as_blob()?;
    String::from_utf8(blob.to_vec())
      .map(Self)
      .map_err(|e| FromSqlError::Other(Box::new(e)))
  }
}

/// A typed view over one namespace table.
///
/// All methods take a plain connection so they work both inside an open
/// transaction (which derefs to `Connection`) and outside of one.
pub(crate) struct Bucket<K, V> {
  table: &'static str,
  _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Bucket<K, V>
where
  K: ToSql + FromSql,
  V: ToSql + FromSql,
{
  pub(crate) const fn new(table: &'static str) -> Self {
    Self {
      table,
      _marker: PhantomData,
    }
  }

  pub(crate) fn get(&self, conn: &Connection, key: &K) -> rusqlite::Result<Option<V>> {
    conn
      .prepare_cached(&format!("SELECT value FROM {} WHERE key = ?1", self.table))?
      .query_row(params![key], |row| row.get(0))
      .optional()
  }

  pub(crate) fn put(&self, conn: &Connection, key: &K, value: &V) -> rusqlite::Result<()> {
    conn
      .prepare_cached(&format!(
        "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
        self.table
      ))?
      .execute(params![key, value])?;
    Ok(())
  }

  /// Returns true if a row was removed.
  pub(crate) fn delete(&self, conn: &Connection, key: &K) -> rusqlite::Result<bool> {
    let deleted = conn
      .prepare_cached(&format!("DELETE FROM {} WHERE key = ?1", self.table))?
      .execute(params![key])?;
    Ok(deleted > 0)
  }

  /// Seek to the first key >= `prefix` and return its value if the key starts with `prefix`.
  pub(crate) fn first_with_prefix(
    &self,
    conn: &Connection,
    prefix: &[u8],
  ) -> rusqlite::Result<Option<V>> {
    let found: Option<(Vec<u8>, V)> = conn
      .prepare_cached(&format!(
        "SELECT key, value FROM {} WHERE key >= ?1 ORDER BY key LIMIT 1",
        self.table
      ))?
      .query_row(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))
      .optional()?;

    Ok(found.and_then(|(key, value)| key.starts_with(prefix).then_some(value)))
  }

  /// All entries in key order.
  pub(crate) fn entries(&self, conn: &Connection) -> rusqlite::Result<Vec<(K, V)>> {
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT key, value FROM {} ORDER BY key",
      self.table
    ))?;
    let entries = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
  }

  pub(crate) fn clear(&self, conn: &Connection) -> rusqlite::Result<usize> {
    conn
      .prepare_cached(&format!("DELETE FROM {}", self.table))?
      .execute([])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
  }

  #[test]
  fn test_player_key_is_little_endian() {
    let conn = setup();
    REVERSE
      .put(&conn, &PlayerKey(0x0403_0201), &NameKey::from("alice#0001"))
      .unwrap();

    let raw: Vec<u8> = conn
      .query_row("SELECT key FROM reverse_bindings", [], |row| row.get(0))
      .unwrap();
    assert_eq!(raw, vec![1, 2, 3, 4]);
  }

  #[test]
  fn test_first_with_prefix_uses_byte_order() {
    let conn = setup();
    for name in ["bob", "alice#2", "alina", "alice#1"] {
      LOWERCASE
        .put(&conn, &NameKey::from(name), &NameKey(name.to_uppercase()))
        .unwrap();
    }

    let first = LOWERCASE.first_with_prefix(&conn, b"ali").unwrap();
    assert_eq!(first, Some(NameKey("ALICE#1".to_string())));

    let alina = LOWERCASE.first_with_prefix(&conn, b"alin").unwrap();
    assert_eq!(alina, Some(NameKey("ALINA".to_string())));

    // "c" sorts after "bob" but nothing starts with it
    assert_eq!(LOWERCASE.first_with_prefix(&conn, b"c").unwrap(), None);
  }

  #[test]
  fn test_malformed_player_value_is_an_error() {
    let conn = setup();
    conn
      .execute(
        "INSERT INTO forward_bindings (key, value) VALUES (?1, ?2)",
        params![b"broken".as_slice(), vec![1u8, 2, 3]],
      )
      .unwrap();

    let result = FORWARD.get(&conn, &NameKey::from("broken"));
    assert!(result.is_err());
  }

  #[test]
  fn test_delete_and_clear() {
    let conn = setup();
    FORWARD
      .put(&conn, &NameKey::from("a"), &PlayerKey(1))
      .unwrap();
    FORWARD
      .put(&conn, &NameKey::from("b"), &PlayerKey(2))
      .unwrap();

    assert!(FORWARD.delete(&conn, &NameKey::from("a")).unwrap());
    assert!(!FORWARD.delete(&conn, &NameKey::from("a")).unwrap());
    assert_eq!(FORWARD.entries(&conn).unwrap().len(), 1);
    assert_eq!(FORWARD.clear(&conn).unwrap(), 1);
    assert!(FORWARD.entries(&conn).unwrap().is_empty());
  }
}
