use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::{now, registered, SharedState};
use crate::error::EngineError;
use crate::models::{HealthNotification, NotificationSettings};
use crate::notifications::{self, NotificationEvent, NotificationSummary};

/// Get the user's notification settings, or defaults when none were saved
pub async fn get_settings(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<NotificationSettings>, EngineError> {
  Ok(Json(state.store.load_settings(&user_id).await?))
}

/// Save the user's notification settings
pub async fn save_settings(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
  Json(settings): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>, EngineError> {
  settings.validate().map_err(EngineError::InvalidRequest)?;
  state.store.save_settings(&user_id, &settings).await?;
  Ok(Json(settings))
}

/// Summary of the notifications for the user's active plan
pub async fn get_summary(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<NotificationSummary>, EngineError> {
  let entry = registered(&state, &user_id).await?;
  Ok(Json(notifications::summary(state.store.as_ref(), &user_id, &entry.plan.id).await?))
}

/// Clear every open notification for the user
pub async fn clear_notifications(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<Value>, EngineError> {
  let cleared = notifications::clear_all(state.store.as_ref(), &user_id, now()).await?;
  Ok(Json(json!({ "cleared": cleared })))
}

/// Acknowledge, snooze or dismiss a delivered notification
pub async fn respond(
  State(state): State<SharedState>,
  Path(id): Path<String>,
  Json(event): Json<NotificationEvent>,
) -> Result<Json<HealthNotification>, EngineError> {
  if !matches!(
    event,
    NotificationEvent::Acknowledge { .. } | NotificationEvent::Snooze { .. } | NotificationEvent::Dismiss
  ) {
    return Err(EngineError::InvalidRequest(format!("{:?} is not a user response", event)));
  }
  Ok(Json(notifications::respond(state.store.as_ref(), &id, event, now()).await?))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::http::StatusCode;
  use chrono::{Duration, Local};
  use serde_json::json;

  use crate::commands::router;
  use crate::commands::tests::call;
  use crate::models::NotificationStatus;
  use crate::test_utils::{mock_notification, test_state, StaticGenerator};

  #[tokio::test]
  async fn test_settings_roundtrip_and_validation() {
    let (state, _) = test_state(StaticGenerator::failing()).await;
    let app = router(Arc::new(state));

    let (status, defaults) = call(app.clone(), "GET", "/api/users/user-1/notification-settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["push_enabled"], true);

    let mut changed = defaults.clone();
    changed["push_enabled"] = json!(false);
    let (status, _) = call(app.clone(), "PUT", "/api/users/user-1/notification-settings", Some(changed)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stored) = call(app.clone(), "GET", "/api/users/user-1/notification-settings", None).await;
    assert_eq!(stored["push_enabled"], false);

    let mut invalid = defaults;
    invalid["quiet_hours"]["start"] = json!("25:99");
    let (status, _) = call(app, "PUT", "/api/users/user-1/notification-settings", Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn test_respond_snooze_and_reject_internal_events() {
    // Arrange: a notification that was delivered a minute ago
    let (state, _) = test_state(StaticGenerator::failing()).await;
    let mut n = mock_notification("user-1", Local::now().naive_local() - Duration::minutes(1));
    n.status = NotificationStatus::Sent;
    state.store.save_notifications(&[n.clone()]).await.unwrap();
    let app = router(Arc::new(state));
    let uri = format!("/api/notifications/{}/respond", n.id);

    // Act / Assert
    let (status, _) = call(app.clone(), "POST", &uri, Some(json!({ "event": "deliver" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(app.clone(), "POST", &uri, Some(json!({ "event": "snooze", "minutes": 30 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "snoozed");
    assert_eq!(body["snooze_count"], 1);

    let (status, _) = call(app, "POST", &uri, Some(json!({ "event": "dismiss" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn test_summary_requires_registration() {
    let (state, _) = test_state(StaticGenerator::failing()).await;
    let app = router(Arc::new(state));

    let (status, _) = call(app.clone(), "GET", "/api/users/user-1/notifications/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(app, "DELETE", "/api/users/user-1/notifications", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 0);
  }
}
