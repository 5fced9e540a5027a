//! Notification lifecycle and delivery channels
//!
//! ```text
//! pending --deliver--> sent --ack--> acknowledged
//!    ^                  |  \--dismiss--> missed (action required) / acknowledged
//!    |                  |
//!    +--requeue-- snoozed <--snooze (budget left)
//!                       \--snooze (budget spent)--> missed
//! ```
//! Open notifications can also expire, be cancelled, or be cleared.

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::EngineError;
use crate::models::{HealthNotification, NotificationSettings, NotificationStatus};

pub const DEFAULT_SNOOZE_MINUTES: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckAction {
  Open,
  PrimaryAction,
  Taken,
  Done,
}

impl AckAction {
  /// Confirms the underlying activity actually happened
  pub fn completes_activity(self) -> bool {
    matches!(self, AckAction::Taken | AckAction::Done)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
  Deliver,
  Acknowledge { action: AckAction },
  Snooze {
    #[serde(default)]
    minutes: Option<u32>,
  },
  Dismiss,
  Expire,
  Requeue,
  Cancel,
  Clear,
}

fn invalid(n: &HealthNotification, event: &NotificationEvent) -> EngineError {
  EngineError::InvalidTransition(format!("{:?} not allowed for notification {} in state {}", event, n.id, n.status))
}

/// Snooze length: the requested duration when the user's settings offer it, otherwise the default
pub fn snooze_minutes(requested: Option<u32>, settings: &NotificationSettings) -> u32 {
  requested
    .filter(|m| settings.snooze_options.contains(m))
    .unwrap_or(DEFAULT_SNOOZE_MINUTES)
}

/// Apply one lifecycle event, returning the new status
pub fn apply(
  n: &mut HealthNotification,
  event: NotificationEvent,
  now: NaiveDateTime,
  settings: &NotificationSettings,
) -> Result<NotificationStatus, EngineError> {
  use NotificationEvent::*;
  use NotificationStatus as S;

  let next = match (n.status, event) {
    (S::Pending, Deliver) => {
      if now < n.scheduled_time {
        return Err(EngineError::InvalidTransition(format!(
          "notification {} is not due until {}",
          n.id, n.scheduled_time
        )));
      }
      n.sent_at = Some(now);
      S::Sent
    }
    (S::Snoozed, Requeue) => S::Pending,
    (S::Sent, Acknowledge { .. }) => {
      n.responded_at = Some(now);
      S::Acknowledged
    }
    (S::Sent, Snooze { minutes }) => {
      n.responded_at = Some(now);
      if n.snooze_count >= n.max_snoozes {
        S::Missed
      } else {
        n.snooze_count += 1;
        n.scheduled_time = now + Duration::minutes(i64::from(snooze_minutes(minutes, settings)));
        S::Snoozed
      }
    }
    (S::Sent, Dismiss) => {
      n.responded_at = Some(now);
      if n.action_required {
        S::Missed
      } else {
        S::Acknowledged
      }
    }
    (S::Pending | S::Sent | S::Snoozed, Expire) => S::Missed,
    (S::Pending | S::Sent | S::Snoozed, Cancel) => S::Cancelled,
    (S::Pending | S::Sent | S::Snoozed, Clear) => S::Cleared,
    _ => return Err(invalid(n, &event)),
  };

  n.status = next;
  Ok(next)
}

/// ---------------------------------------------------------------------------
/// Channels
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationSink: Send + Sync {
  fn channel(&self) -> &str;

  async fn present(&self, notification: &HealthNotification, settings: &NotificationSettings) -> Result<(), EngineError>;
}

/// Local presentation; the host app picks these up from the log stream
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
  fn channel(&self) -> &str {
    "local"
  }

  async fn present(&self, n: &HealthNotification, settings: &NotificationSettings) -> Result<(), EngineError> {
    log::info!(
      "[notify:{}] {} - {} (priority {:?}, sound {}, vibration {})",
      n.user_id,
      n.title,
      n.message,
      n.priority,
      settings.sound_enabled,
      settings.vibration_enabled
    );
    Ok(())
  }
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
  id: &'a str,
  user_id: &'a str,
  title: &'a str,
  body: &'a str,
  category: &'a str,
  priority: crate::models::Priority,
  action_required: bool,
  sound: bool,
  vibration: bool,
}

/// Push delivery through an HTTP webhook
pub struct WebhookPush {
  client: Client,
  url: Url,
}

impl WebhookPush {
  pub fn new(url: Url) -> Self {
    Self { client: Client::new(), url }
  }
}

#[async_trait]
impl NotificationSink for WebhookPush {
  fn channel(&self) -> &str {
    "push"
  }

  async fn present(&self, n: &HealthNotification, settings: &NotificationSettings) -> Result<(), EngineError> {
    let payload = PushPayload {
      id: &n.id,
      user_id: &n.user_id,
      title: &n.title,
      body: &n.message,
      category: &n.category,
      priority: n.priority,
      action_required: n.action_required,
      sound: settings.sound_enabled,
      vibration: settings.vibration_enabled,
    };

    let response = self
      .client
      .post(self.url.clone())
      .json(&payload)
      .send()
      .await
      .map_err(|e| EngineError::NotificationDelivery(e.to_string()))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(EngineError::NotificationDelivery(format!("push HTTP {}: {}", status, body)));
    }
    Ok(())
  }
}

/// Present locally, then push when allowed at `now`.
/// Only a local failure is an error; push failures are logged.
pub async fn present(
  n: &HealthNotification,
  settings: &NotificationSettings,
  local: &dyn NotificationSink,
  push: Option<&dyn NotificationSink>,
  now: NaiveDateTime,
) -> Result<(), EngineError> {
  local.present(n, settings).await?;
  if let Some(push) = push {
    if settings.push_allowed_at(now.time()) {
      if let Err(e) = push.present(n, settings).await {
        log::warn!("push via {} failed for notification {}: {}", push.channel(), n.id, e);
      }
    } else {
      log::debug!("push suppressed for notification {}", n.id);
    }
  }
  Ok(())
}
