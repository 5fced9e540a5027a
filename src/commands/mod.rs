//! HTTP handlers for the planning engine

pub mod notifications;
pub mod plans;
pub mod users;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::error::EngineError;
use crate::registry::RegisteredPlan;
use crate::scheduler::SchedulerStatus;
use crate::state::AppState;

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
  Router::new()
    .route("/api/plans/generate", post(plans::generate_plan))
    .route("/api/users/:user_id", delete(users::unregister_user))
    .route("/api/users/:user_id/progress", get(users::get_progress))
    .route("/api/users/:user_id/schedules/:date", get(users::get_schedule))
    .route(
      "/api/users/:user_id/schedules/:date/activities/:activity_id",
      post(users::record_activity),
    )
    .route("/api/users/:user_id/force-update", post(users::force_update))
    .route("/api/users/:user_id/profile", put(users::update_profile))
    .route(
      "/api/users/:user_id/notification-settings",
      get(notifications::get_settings).put(notifications::save_settings),
    )
    .route("/api/users/:user_id/notifications", delete(notifications::clear_notifications))
    .route("/api/users/:user_id/notifications/summary", get(notifications::get_summary))
    .route("/api/notifications/:id/respond", post(notifications::respond))
    .route("/api/scheduler/status", get(scheduler_status))
    .with_state(state)
}

/// Get the midnight loop's status
async fn scheduler_status(State(state): State<SharedState>) -> Json<SchedulerStatus> {
  Json(state.scheduler.status().await)
}

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let status = match &self {
      EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      EngineError::NotFound(_) => StatusCode::NOT_FOUND,
      EngineError::InvalidTransition(_) => StatusCode::CONFLICT,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      log::error!("request failed: {}", self);
    }
    (status, Json(serde_json::json!({ "error": self }))).into_response()
  }
}

/// ---------------------------------------------------------------------------
/// Shared helpers
/// ---------------------------------------------------------------------------

fn now() -> NaiveDateTime {
  Local::now().naive_local()
}

fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map_err(|_| EngineError::InvalidRequest(format!("date must be YYYY-MM-DD, got {}", raw)))
}

async fn registered(state: &AppState, user_id: &str) -> Result<RegisteredPlan, EngineError> {
  state
    .registry
    .get(user_id)
    .await?
    .ok_or_else(|| EngineError::NotFound(format!("no active plan for user {}", user_id)))
}
