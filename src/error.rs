use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the planning engine.
///
/// Only `InvalidRequest`, `NotFound` and `InvalidTransition` reach callers as
/// hard failures; the others are recovered or logged by the loops.
#[derive(Error, Debug)]
pub enum EngineError {
  #[error("Generation failed: {0}")]
  Generation(String),

  #[error("Persistence error: {0}")]
  Persistence(String),

  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("Notification delivery failed: {0}")]
  NotificationDelivery(String),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Invalid transition: {0}")]
  InvalidTransition(String),
}

impl Serialize for EngineError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

impl From<sqlx::Error> for EngineError {
  fn from(e: sqlx::Error) -> Self {
    EngineError::Persistence(e.to_string())
  }
}

impl From<serde_json::Error> for EngineError {
  fn from(e: serde_json::Error) -> Self {
    EngineError::Persistence(format!("corrupt stored payload: {}", e))
  }
}
