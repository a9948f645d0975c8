use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum DbError {
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("database connection error: {0}")]
  Connection(#[from] tokio_rusqlite::Error),

  #[error("{0} isn't bound to any player")]
  IdentityNotFound(String),

  #[error("no identity is bound to player {0}")]
  PlayerNotFound(u32),

  #[error("no identity starting with '{0}'")]
  PrefixNotFound(String),
}

impl DbError {
  /// True for missing keys or bindings, false for storage failures.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      DbError::IdentityNotFound(_) | DbError::PlayerNotFound(_) | DbError::PrefixNotFound(_)
    )
  }
}

pub type Result<T> = std::result::Result<T, DbError>;
