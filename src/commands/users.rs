use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{now, parse_date, registered, SharedState};
use crate::error::EngineError;
use crate::models::schedule::{ActivityUpdate, ScheduledActivity};
use crate::models::{DailySchedule, UserProfile};
use crate::notifications::cancel_plan_notifications;
use crate::progress::PlanProgress;
use crate::registry::RegisteredPlan;
use crate::scheduler::UpdateOutcome;

/// Get progress for the user's active plan
pub async fn get_progress(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<PlanProgress>, EngineError> {
  let entry = registered(&state, &user_id).await?;
  state
    .store
    .load_progress(&user_id, &entry.plan.id)
    .await?
    .map(Json)
    .ok_or_else(|| EngineError::NotFound(format!("progress for {}", user_id)))
}

/// Get the stored schedule for one day of the active plan
pub async fn get_schedule(
  State(state): State<SharedState>,
  Path((user_id, date)): Path<(String, String)>,
) -> Result<Json<DailySchedule>, EngineError> {
  let date = parse_date(&date)?;
  let entry = registered(&state, &user_id).await?;
  state
    .store
    .load_schedule(&user_id, &entry.plan.id, date)
    .await?
    .map(Json)
    .ok_or_else(|| EngineError::NotFound(format!("schedule for {} on {}", user_id, date)))
}

/// Record status and ratings for one scheduled activity
pub async fn record_activity(
  State(state): State<SharedState>,
  Path((user_id, date, activity_id)): Path<(String, String, String)>,
  Json(update): Json<ActivityUpdate>,
) -> Result<Json<ScheduledActivity>, EngineError> {
  let date = parse_date(&date)?;
  let entry = registered(&state, &user_id).await?;
  let mut schedule = state
    .store
    .load_schedule(&user_id, &entry.plan.id, date)
    .await?
    .ok_or_else(|| EngineError::NotFound(format!("schedule for {} on {}", user_id, date)))?;

  let activity = schedule.record_activity(&activity_id, update)?.clone();
  state.store.save_schedule(&schedule).await?;
  Ok(Json(activity))
}

#[derive(Debug, Serialize)]
pub struct ForceUpdateResponse {
  #[serde(flatten)]
  pub outcome: UpdateOutcome,
  pub schedule: Option<DailySchedule>,
}

/// Regenerate today's schedule now instead of waiting for midnight
pub async fn force_update(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<ForceUpdateResponse>, EngineError> {
  let now = now();
  let outcome = state.scheduler.force_update(&user_id, now).await?;
  let entry = registered(&state, &user_id).await?;
  let schedule = state.store.load_schedule(&user_id, &entry.plan.id, now.date()).await?;
  Ok(Json(ForceUpdateResponse { outcome, schedule }))
}

/// Replace the profile behind the active plan; applies from the next regeneration
pub async fn update_profile(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
  Json(profile): Json<UserProfile>,
) -> Result<Json<RegisteredPlan>, EngineError> {
  if profile.id != user_id {
    return Err(EngineError::InvalidRequest(format!(
      "profile id {} does not match path user {}",
      profile.id, user_id
    )));
  }
  let problems = profile.validate();
  if !problems.is_empty() {
    return Err(EngineError::InvalidRequest(problems.join("; ")));
  }

  let previous = registered(&state, &user_id).await?;
  let entry = RegisteredPlan::new(previous.plan, profile, previous.last_update);
  state.registry.register(entry.clone()).await?;
  log::info!("re-registered {} after profile edit", user_id);
  Ok(Json(entry))
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
  pub removed: bool,
  pub cancelled_notifications: usize,
}

/// Stop daily regeneration for the user and cancel their open reminders
pub async fn unregister_user(
  State(state): State<SharedState>,
  Path(user_id): Path<String>,
) -> Result<Json<UnregisterResponse>, EngineError> {
  let previous = state.registry.get(&user_id).await?;
  let removed = state.registry.unregister(&user_id).await?;
  let cancelled_notifications = match previous {
    Some(entry) => cancel_plan_notifications(state.store.as_ref(), &user_id, &entry.plan.id, now()).await?,
    None => 0,
  };
  Ok(Json(UnregisterResponse {
    removed,
    cancelled_notifications,
  }))
}
