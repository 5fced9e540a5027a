//! Complete plan generation: candidates, selection, first day, progress and reminders.

use std::time::Instant;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fallback::fallback_plans;
use crate::llm::{GenerationOutcome, PlanPrompt, SchedulePrompt};
use crate::models::{DailySchedule, Difficulty, PlanCandidate, UserProfile};
use crate::notifications::{cancel_plan_notifications, schedule_notifications};
use crate::progress::PlanProgress;
use crate::registry::RegisteredPlan;
use crate::scheduler::build_schedule;
use crate::selector::{select_plan, CustomizationPreferences, SelectionContext};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanGenerationRequest {
  pub user_profile: UserProfile,
  pub health_score: f64,
  #[serde(default)]
  pub health_analysis: serde_json::Value,
  #[serde(default)]
  pub recommendations: Vec<String>,
  #[serde(default)]
  pub selected_plan_type: Option<String>,
  #[serde(default)]
  pub customization_preferences: Option<CustomizationPreferences>,
}

impl PlanGenerationRequest {
  /// Reject requests the engine cannot plan for; returns the parsed plan type
  pub fn validate(&self) -> Result<Option<Difficulty>, EngineError> {
    let mut problems = self.user_profile.validate();
    if !self.health_score.is_finite() || !(0.0..=100.0).contains(&self.health_score) {
      problems.push(format!("healthScore must be between 0 and 100, got {}", self.health_score));
    }

    let plan_type = match self.selected_plan_type.as_deref().map(str::trim) {
      None | Some("") => None,
      Some(raw) => match raw.parse::<Difficulty>() {
        Ok(tier) => Some(tier),
        Err(e) => {
          problems.push(e);
          None
        }
      },
    };

    if problems.is_empty() {
      Ok(plan_type)
    } else {
      Err(EngineError::InvalidRequest(problems.join("; ")))
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanBundle {
  pub plans: Vec<PlanCandidate>,
  pub selected_plan: PlanCandidate,
  pub initial_schedule: DailySchedule,
  pub progress_tracking: PlanProgress,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<PlanBundle>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Milliseconds
  #[serde(rename = "processingTime")]
  pub processing_time: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider: Option<String>,
}

impl PlanResponse {
  fn failure(error: &EngineError, started: Instant) -> Self {
    Self {
      success: false,
      data: None,
      error: Some(error.to_string()),
      processing_time: started.elapsed().as_millis() as u64,
      provider: None,
    }
  }
}

/// Run the full flow and wrap the outcome in the response envelope.
/// Only an invalid request is an error; everything else degrades to fallback content.
pub async fn generate_complete_plan(
  state: &AppState,
  request: PlanGenerationRequest,
  now: NaiveDateTime,
) -> Result<PlanResponse, (EngineError, PlanResponse)> {
  let started = Instant::now();
  match build_plan(state, request, now).await {
    Ok((bundle, provider)) => Ok(PlanResponse {
      success: true,
      data: Some(bundle),
      error: None,
      processing_time: started.elapsed().as_millis() as u64,
      provider: Some(provider),
    }),
    Err(e) => {
      let response = PlanResponse::failure(&e, started);
      Err((e, response))
    }
  }
}

async fn build_plan(
  state: &AppState,
  request: PlanGenerationRequest,
  now: NaiveDateTime,
) -> Result<(PlanBundle, String), EngineError> {
  let selected_plan_type = request.validate()?;
  let profile = &request.user_profile;
  let today = now.date();

  // 1. Candidates
  let prompt = PlanPrompt {
    profile,
    health_score: request.health_score,
    health_analysis: &request.health_analysis,
    recommendations: &request.recommendations,
  };
  let (plans, provider) = match state.generator.generate_plans(&prompt).await {
    GenerationOutcome::Generated(plans) => (plans, state.generator.provider().to_string()),
    GenerationOutcome::Failed { reason } => {
      log::warn!("plan generation for {} failed, using fallback plans: {}", profile.id, reason);
      (fallback_plans(profile), "fallback".to_string())
    }
  };

  // 2. Selection
  let ctx = SelectionContext {
    profile,
    health_score: request.health_score,
    preferences: request.customization_preferences.as_ref(),
    selected_plan_type,
  };
  let selected = select_plan(&plans, &ctx)
    .cloned()
    .ok_or_else(|| EngineError::Generation("no plan candidates to select from".to_string()))?;
  log::info!("selected {} plan {} for {}", selected.difficulty, selected.id, profile.id);

  // 3. First day
  let schedule_prompt = SchedulePrompt {
    plan: &selected,
    profile,
    date: today,
    previous_day: None,
    adaptation: None,
  };
  let initial_schedule = build_schedule(state.generator.as_ref(), &schedule_prompt).await;
  let progress = PlanProgress::initial(&selected, &profile.id, profile.plan_start(today));

  // 4. Persist; failures are logged and the response still goes out
  if let Err(e) = state.store.save_plans(&profile.id, &plans).await {
    log::error!("failed to save plans for {}: {}", profile.id, e);
  }
  if let Err(e) = state.store.save_schedule(&initial_schedule).await {
    log::error!("failed to save initial schedule for {}: {}", profile.id, e);
  }
  if let Err(e) = state.store.save_progress(&progress).await {
    log::error!("failed to save progress for {}: {}", profile.id, e);
  }

  // 5. Enrol for daily regeneration, retiring reminders of a replaced plan
  match state.registry.get(&profile.id).await {
    Ok(Some(previous)) if previous.plan.id != selected.id => {
      match cancel_plan_notifications(state.store.as_ref(), &profile.id, &previous.plan.id, now).await {
        Ok(n) if n > 0 => log::info!("cancelled {} reminders of replaced plan {}", n, previous.plan.id),
        Ok(_) => {}
        Err(e) => log::warn!("failed to cancel reminders of {}: {}", previous.plan.id, e),
      }
    }
    Ok(_) => {}
    Err(e) => log::warn!("registry lookup for {} failed: {}", profile.id, e),
  }
  let entry = RegisteredPlan::new(selected.clone(), profile.clone(), Some(today));
  if let Err(e) = state.registry.register(entry).await {
    log::error!("failed to register {} for daily updates: {}", profile.id, e);
  }

  // 6. Reminders for the rest of today
  let settings = state.store.load_settings(&profile.id).await.unwrap_or_else(|e| {
    log::warn!("using default notification settings for {}: {}", profile.id, e);
    Default::default()
  });
  let notifications = schedule_notifications(&initial_schedule, profile, &settings, now);
  if let Err(e) = state.store.save_notifications(&notifications).await {
    log::error!("failed to save notifications for {}: {}", profile.id, e);
  }

  Ok((
    PlanBundle {
      plans,
      selected_plan: selected,
      initial_schedule,
      progress_tracking: progress,
    },
    provider,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::schedule::ScheduleSource;
  use crate::test_utils::{at, mock_request, monday, test_state, StaticGenerator};

  #[tokio::test]
  async fn test_low_score_falls_back_to_beginner() {
    // Arrange
    let (state, _generator) = test_state(StaticGenerator::failing()).await;
    let request = mock_request("user-1", 35.0);

    // Act
    let response = generate_complete_plan(&state, request, at(monday(), 5, 0)).await.unwrap();

    // Assert
    assert!(response.success);
    assert_eq!(response.provider.as_deref(), Some("fallback"));
    let data = response.data.unwrap();
    assert_eq!(data.plans.len(), 3);
    assert_eq!(data.selected_plan.difficulty, Difficulty::Beginner);
    assert!(data.selected_plan.duration_weeks >= 1);
    assert_eq!(data.initial_schedule.date, monday());
    assert_eq!(data.initial_schedule.source, ScheduleSource::Fallback);
    assert_eq!(data.progress_tracking.current_week, 1);
  }

  #[tokio::test]
  async fn test_generation_registers_and_schedules() {
    let (state, _generator) = test_state(StaticGenerator::failing()).await;
    let request = mock_request("user-1", 55.0);

    let response = generate_complete_plan(&state, request, at(monday(), 5, 0)).await.unwrap();
    let plan_id = response.data.unwrap().selected_plan.id;

    let entry = state.registry.get("user-1").await.unwrap().unwrap();
    assert_eq!(entry.plan.id, plan_id);
    assert_eq!(entry.last_update, Some(monday()));
    assert!(state.store.load_schedule("user-1", &plan_id, monday()).await.unwrap().is_some());
    assert!(state.store.load_progress("user-1", &plan_id).await.unwrap().is_some());

    let notifications = state.store.notifications_for_user("user-1").await.unwrap();
    assert!(!notifications.is_empty());
    assert!(notifications.iter().all(|n| n.scheduled_time > at(monday(), 5, 0)));
  }

  #[tokio::test]
  async fn test_explicit_plan_type_wins() {
    let (state, _generator) = test_state(StaticGenerator::failing()).await;
    let mut request = mock_request("user-1", 20.0);
    request.selected_plan_type = Some("advanced".to_string());

    let response = generate_complete_plan(&state, request, at(monday(), 5, 0)).await.unwrap();

    assert_eq!(response.data.unwrap().selected_plan.difficulty, Difficulty::Advanced);
  }

  #[tokio::test]
  async fn test_replacing_plan_cancels_old_reminders() {
    // Arrange
    let (state, _generator) = test_state(StaticGenerator::failing()).await;
    let first = generate_complete_plan(&state, mock_request("user-1", 20.0), at(monday(), 5, 0))
      .await
      .unwrap();
    let old_plan = first.data.unwrap().selected_plan.id;

    // Act
    let mut replacement = mock_request("user-1", 20.0);
    replacement.selected_plan_type = Some("advanced".to_string());
    generate_complete_plan(&state, replacement, at(monday(), 5, 30)).await.unwrap();

    // Assert
    let old_open = state
      .store
      .notifications_for_user("user-1")
      .await
      .unwrap()
      .into_iter()
      .filter(|n| n.plan_id == old_plan && !n.status.is_terminal())
      .count();
    assert_eq!(old_open, 0);
  }

  #[tokio::test]
  async fn test_invalid_request_is_rejected() {
    let (state, _generator) = test_state(StaticGenerator::failing()).await;
    let mut request = mock_request("user-1", 150.0);
    request.user_profile.age = 0;

    let (error, response) = generate_complete_plan(&state, request, at(monday(), 5, 0)).await.unwrap_err();

    assert!(matches!(error, EngineError::InvalidRequest(_)));
    assert!(!response.success);
    assert!(response.error.unwrap().contains("healthScore"));
    assert!(state.registry.get("user-1").await.unwrap().is_none());
  }

  #[test]
  fn test_request_json_shape() {
    let json = serde_json::json!({
      "userProfile": serde_json::to_value(crate::test_utils::mock_profile("user-1")).unwrap(),
      "healthScore": 72,
      "selectedPlanType": "Intermediate",
      "customizationPreferences": { "equipment_access": ["dumbbells"] }
    });

    let request: PlanGenerationRequest = serde_json::from_value(json).unwrap();

    assert_eq!(request.validate().unwrap(), Some(Difficulty::Intermediate));
    assert!(request.recommendations.is_empty());
  }
}
