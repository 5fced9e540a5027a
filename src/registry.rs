//! Users enrolled in daily regeneration.
//!
//! Written by plan generation and explicit user actions, read by the
//! midnight loop. Writes are last-write-wins per user.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::models::{PlanCandidate, UserProfile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredPlan {
  pub user_id: String,
  pub plan: PlanCandidate,
  pub profile: UserProfile,
  /// Last calendar day a schedule was produced for
  pub last_update: Option<NaiveDate>,
  pub registered_at: DateTime<Utc>,
}

impl RegisteredPlan {
  pub fn new(plan: PlanCandidate, profile: UserProfile, last_update: Option<NaiveDate>) -> Self {
    Self {
      user_id: profile.id.clone(),
      plan,
      profile,
      last_update,
      registered_at: Utc::now(),
    }
  }
}

#[async_trait]
pub trait PlanRegistry: Send + Sync {
  /// Insert or replace the user's entry
  async fn register(&self, entry: RegisteredPlan) -> Result<(), EngineError>;

  /// Returns whether an entry existed
  async fn unregister(&self, user_id: &str) -> Result<bool, EngineError>;

  async fn get(&self, user_id: &str) -> Result<Option<RegisteredPlan>, EngineError>;

  async fn list(&self) -> Result<Vec<RegisteredPlan>, EngineError>;

  async fn mark_updated(&self, user_id: &str, date: NaiveDate) -> Result<(), EngineError>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
  entries: RwLock<HashMap<String, RegisteredPlan>>,
}

impl InMemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl PlanRegistry for InMemoryRegistry {
  async fn register(&self, entry: RegisteredPlan) -> Result<(), EngineError> {
    self.entries.write().await.insert(entry.user_id.clone(), entry);
    Ok(())
  }

  async fn unregister(&self, user_id: &str) -> Result<bool, EngineError> {
    Ok(self.entries.write().await.remove(user_id).is_some())
  }

  async fn get(&self, user_id: &str) -> Result<Option<RegisteredPlan>, EngineError> {
    Ok(self.entries.read().await.get(user_id).cloned())
  }

  async fn list(&self) -> Result<Vec<RegisteredPlan>, EngineError> {
    let mut entries: Vec<RegisteredPlan> = self.entries.read().await.values().cloned().collect();
    entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    Ok(entries)
  }

  async fn mark_updated(&self, user_id: &str, date: NaiveDate) -> Result<(), EngineError> {
    match self.entries.write().await.get_mut(user_id) {
      Some(entry) => {
        entry.last_update = Some(date);
        Ok(())
      }
      None => Err(EngineError::NotFound(format!("registered user {}", user_id))),
    }
  }
}
