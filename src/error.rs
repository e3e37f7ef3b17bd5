//! Errors surfaced on a producer's error channel.

use thiserror::Error;

/// Result alias used throughout the data layer.
pub type Result<T, E = TaskError> = std::result::Result<T, E>;

/// Failure of a single read or write operation.
///
/// Cloneable so that one in-flight fetch can hand the same outcome to every
/// subscriber that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
  /// The remote service answered with a non-success status.
  #[error("remote request failed with status {status}: {message}")]
  Remote { status: u16, message: String },

  /// The request never produced a response (connect, timeout, TLS...).
  #[error("transport error: {message}")]
  Transport { message: String },

  /// A payload could not be decoded into the expected shape.
  #[error("failed to decode {what}: {message}")]
  Decode { what: String, message: String },

  /// The cache store rejected a merge (e.g. malformed key).
  #[error("cache merge rejected: {message}")]
  Merge { message: String },

  /// The cache backend itself failed.
  #[error("cache storage error: {message}")]
  Storage { message: String },

  /// The producer completed without emitting the value the caller awaited.
  #[error("producer completed without emitting a value")]
  Empty,
}

impl TaskError {
  pub fn remote(status: u16, message: impl Into<String>) -> Self {
    Self::Remote {
      status,
      message: message.into(),
    }
  }

  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport {
      message: message.into(),
    }
  }

  pub fn decode(what: impl Into<String>, message: impl ToString) -> Self {
    Self::Decode {
      what: what.into(),
      message: message.to_string(),
    }
  }

  pub fn merge(message: impl Into<String>) -> Self {
    Self::Merge {
      message: message.into(),
    }
  }

  pub fn storage(message: impl ToString) -> Self {
    Self::Storage {
      message: message.to_string(),
    }
  }

  /// Short category label, used in logs.
  pub fn category(&self) -> &'static str {
    match self {
      Self::Remote { .. } => "remote",
      Self::Transport { .. } => "transport",
      Self::Decode { .. } => "decode",
      Self::Merge { .. } => "merge",
      Self::Storage { .. } => "storage",
      Self::Empty => "empty",
    }
  }

  /// HTTP status of a remote failure, if there was one.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Remote { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<rusqlite::Error> for TaskError {
  fn from(e: rusqlite::Error) -> Self {
    Self::storage(e)
  }
}
