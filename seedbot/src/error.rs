use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::binding::IdentifierError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// HTTP status surface errors
#[derive(Debug)]
pub enum AppError {
  ServerNotFound(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::ServerNotFound(name) => {
        tracing::debug!(server = %name, "status requested for unknown server");
        let error_response = ErrorResponse::with_details("Server not found", name);
        (StatusCode::NOT_FOUND, Json(error_response)).into_response()
      }
    }
  }
}

/// A single game-server sub-query failure.
#[derive(Debug, Error)]
pub enum QueryError {
  /// The request could not be sent at all. Our own network identity may have
  /// changed, so this is fatal for the process.
  #[error("failed to send query: {0}")]
  Transport(#[source] std::io::Error),

  #[error("network error: {0}")]
  Io(#[from] std::io::Error),

  #[error("query timed out")]
  Timeout,

  #[error("malformed response: {0}")]
  Malformed(String),
}

impl QueryError {
  pub fn is_transport(&self) -> bool {
    matches!(self, QueryError::Transport(_))
  }
}

/// Identity feed fetch/decode failure. Never fatal.
#[derive(Debug, Error)]
pub enum FeedError {
  #[error("error querying {url}: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("error decoding player ids: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Outcome of a failed status cycle.
#[derive(Debug, Error)]
pub enum CycleError {
  #[error("all server queries failed")]
  AllQueriesFailed,

  #[error("error during sending data (our IP changed?): {0}")]
  Transport(QueryError),
}

/// A skipped roster cycle.
#[derive(Debug, Error)]
pub enum RosterError {
  #[error(transparent)]
  Feed(#[from] FeedError),

  #[error("error looking up regulars: {0}")]
  Registry(#[from] seedbot_db::DbError),
}

/// The notification dispatcher is gone.
#[derive(Debug, Error)]
#[error("notification queue closed")]
pub struct QueueClosed;

/// Errors surfaced by the bind/unbind command surface.
#[derive(Debug, Error)]
pub enum CommandError {
  #[error(transparent)]
  Identifier(#[from] IdentifierError),

  #[error(transparent)]
  Registry(#[from] seedbot_db::DbError),
}

impl CommandError {
  /// Text safe to show to the user who issued the command.
  pub fn user_message(&self) -> String {
    match self {
      CommandError::Identifier(err) => err.to_string(),
      CommandError::Registry(err) if err.is_not_found() => match err {
        seedbot_db::DbError::IdentityNotFound(identity) => format!(
          "{identity} isn't in the database. Use `/bind <Steam ID>` to register"
        ),
        seedbot_db::DbError::PrefixNotFound(prefix) => {
          format!("No registered user name starts with '{prefix}'")
        }
        other => other.to_string(),
      },
      CommandError::Registry(err) => {
        // Don't expose internal storage errors
        tracing::error!(?err, "registry error while handling command");
        "An internal error occurred. Please try again later.".to_string()
      }
    }
  }
}
