//! Reminder generation, lifecycle and delivery.

pub mod delivery;
pub mod dispatcher;
pub mod scheduler;

pub use delivery::{apply, AckAction, LogSink, NotificationEvent, NotificationSink, WebhookPush};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use scheduler::schedule_notifications;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::PlanStore;
use crate::error::EngineError;
use crate::models::schedule::{ActivityStatus, ActivityUpdate};
use crate::models::{HealthNotification, NotificationStatus};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationSummary {
  pub total: usize,
  pub pending: usize,
  pub sent: usize,
  pub acknowledged: usize,
  pub snoozed: usize,
  pub missed: usize,
  /// Earliest open notification still to be delivered
  pub next: Option<HealthNotification>,
}

/// Apply a user response to one notification and persist it.
///
/// Acknowledging with `done`/`taken` also marks the linked schedule activity completed.
pub async fn respond(
  store: &dyn PlanStore,
  notification_id: &str,
  event: NotificationEvent,
  now: NaiveDateTime,
) -> Result<HealthNotification, EngineError> {
  let mut n = store
    .load_notification(notification_id)
    .await?
    .ok_or_else(|| EngineError::NotFound(format!("notification {}", notification_id)))?;
  let settings = store.load_settings(&n.user_id).await?;

  let loaded = n.status;
  apply(&mut n, event, now, &settings)?;
  store.update_notification(&n, loaded).await?;

  if let NotificationEvent::Acknowledge { action } = event {
    if action.completes_activity() {
      if let Some(activity_id) = n.metadata.activity_id.as_deref() {
        complete_activity(store, &n, activity_id).await;
      }
    }
  }

  Ok(n)
}

async fn complete_activity(store: &dyn PlanStore, n: &HealthNotification, activity_id: &str) {
  let result: Result<(), EngineError> = async {
    let Some(mut schedule) = store.load_schedule(&n.user_id, &n.plan_id, n.metadata.date).await? else {
      return Ok(());
    };
    schedule.record_activity(
      activity_id,
      ActivityUpdate {
        status: ActivityStatus::Completed,
        ..Default::default()
      },
    )?;
    store.save_schedule(&schedule).await
  }
  .await;

  if let Err(e) = result {
    log::warn!("could not complete activity {} from notification {}: {}", activity_id, n.id, e);
  }
}

/// Cancel every open notification tied to `plan_id`, e.g. when the plan is replaced
pub async fn cancel_plan_notifications(
  store: &dyn PlanStore,
  user_id: &str,
  plan_id: &str,
  now: NaiveDateTime,
) -> Result<usize, EngineError> {
  close_open(store, user_id, Some(plan_id), NotificationEvent::Cancel, now).await
}

/// Clear every open notification for the user
pub async fn clear_all(store: &dyn PlanStore, user_id: &str, now: NaiveDateTime) -> Result<usize, EngineError> {
  close_open(store, user_id, None, NotificationEvent::Clear, now).await
}

async fn close_open(
  store: &dyn PlanStore,
  user_id: &str,
  plan_id: Option<&str>,
  event: NotificationEvent,
  now: NaiveDateTime,
) -> Result<usize, EngineError> {
  let settings = store.load_settings(user_id).await?;
  let mut closed = 0;
  for mut n in store.notifications_for_user(user_id).await? {
    if n.status.is_terminal() || plan_id.is_some_and(|p| p != n.plan_id) {
      continue;
    }
    let loaded = n.status;
    apply(&mut n, event, now, &settings)?;
    match store.update_notification(&n, loaded).await {
      Ok(()) => closed += 1,
      // Closed or answered concurrently
      Err(EngineError::InvalidTransition(_)) => {}
      Err(e) => return Err(e),
    }
  }
  Ok(closed)
}

/// Counts for one plan's notifications plus the next one due
pub async fn summary(store: &dyn PlanStore, user_id: &str, plan_id: &str) -> Result<NotificationSummary, EngineError> {
  let mut all = store.notifications_for_user(user_id).await?;
  all.retain(|n| n.plan_id == plan_id);
  let count = |status: NotificationStatus| all.iter().filter(|n| n.status == status).count();

  let next = all
    .iter()
    .filter(|n| matches!(n.status, NotificationStatus::Pending | NotificationStatus::Snoozed))
    .min_by_key(|n| n.scheduled_time)
    .cloned();

  Ok(NotificationSummary {
    total: all.len(),
    pending: count(NotificationStatus::Pending),
    sent: count(NotificationStatus::Sent),
    acknowledged: count(NotificationStatus::Acknowledged),
    snoozed: count(NotificationStatus::Snoozed),
    missed: count(NotificationStatus::Missed),
    next,
  })
}
