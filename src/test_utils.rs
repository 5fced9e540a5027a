//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock data factories
//! - Stub generator and delivery channel
//! - Helper assertions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::config::{DispatchConfig, SchedulerConfig};
use crate::db::{PlanStore, SqliteStore};
use crate::error::EngineError;
use crate::fallback::{fallback_plans, instantiate_day, schedule_id};
use crate::llm::{ContentGenerator, GenerationOutcome, PlanPrompt, SchedulePrompt};
use crate::models::notification::NotificationMetadata;
use crate::models::profile::{ActivityLevel, Sex, TimelinePreferences};
use crate::models::{
  DailySchedule, HealthNotification, NotificationSettings, NotificationStatus, NotificationType, PlanCandidate,
  Priority, UserProfile,
};
use crate::notifications::{LogSink, NotificationDispatcher, NotificationSink};
use crate::planner::PlanGenerationRequest;
use crate::registry::PlanRegistry;
use crate::scheduler::{MidnightScheduler, StoredPerformance};
use crate::state::AppState;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Full application state over an in-memory database
pub async fn test_state(generator: StaticGenerator) -> (AppState, Arc<StaticGenerator>) {
  let pool = setup_test_db().await;
  let sqlite = Arc::new(SqliteStore::new(pool));
  let store: Arc<dyn PlanStore> = sqlite.clone();
  let registry: Arc<dyn PlanRegistry> = sqlite;
  let generator = Arc::new(generator);

  let scheduler = Arc::new(MidnightScheduler::new(
    registry.clone(),
    store.clone(),
    generator.clone(),
    Arc::new(StoredPerformance::new(store.clone())),
    SchedulerConfig::default(),
  ));
  let dispatcher = Arc::new(NotificationDispatcher::new(
    store.clone(),
    Arc::new(LogSink),
    None,
    DispatchConfig::default(),
  ));

  let state = AppState {
    store,
    registry,
    generator: generator.clone(),
    scheduler,
    dispatcher,
  };
  (state, generator)
}

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

/// A fixed Monday so weekday-dependent templates are predictable
pub fn monday() -> NaiveDate {
  NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
  date.and_hms_opt(hour, minute, 0).unwrap()
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// 35-year-old, lightly active, no medications, eight-week timeline starting on [`monday`]
pub fn mock_profile(user_id: &str) -> UserProfile {
  UserProfile {
    id: user_id.to_string(),
    full_name: Some("Test User".to_string()),
    age: 35,
    sex: Some(Sex::Female),
    height_cm: Some(165.0),
    weight_kg: Some(65.0),
    activity_level: ActivityLevel::Light,
    stress_level: Some(5),
    sleep_time: "22:30".to_string(),
    wake_time: "06:30".to_string(),
    work_start: Some("09:00".to_string()),
    work_end: Some("17:00".to_string()),
    diet_type: None,
    dietary_restrictions: Vec::new(),
    allergies: Vec::new(),
    chronic_conditions: Vec::new(),
    medications: Vec::new(),
    health_goals: vec!["Improve sleep".to_string(), "Build strength".to_string()],
    timeline_preferences: TimelinePreferences {
      start_date: Some(monday()),
      duration_weeks: 8,
      preferred_workout_days: Vec::new(),
      preferred_rest_days: Vec::new(),
      intensity_preference: None,
    },
  }
}

/// The Intermediate fallback schedule for [`mock_profile`] on [`monday`]
pub fn mock_schedule(user_id: &str, plan_id: &str) -> DailySchedule {
  let profile = mock_profile(user_id);
  let plan = fallback_plans(&profile).remove(1);
  let mut schedule = instantiate_day(&plan, &profile, monday(), None);
  schedule.plan_id = plan_id.to_string();
  schedule.id = schedule_id(user_id, plan_id, monday());
  schedule
}

/// A pending exercise reminder for `plan-1`, fifteen minutes ahead of its event
pub fn mock_notification(user_id: &str, scheduled_time: NaiveDateTime) -> HealthNotification {
  HealthNotification {
    id: uuid::Uuid::new_v4().to_string(),
    user_id: user_id.to_string(),
    plan_id: "plan-1".to_string(),
    notification_type: NotificationType::Exercise,
    title: "Time to move".to_string(),
    message: "Your workout starts in 15 minutes".to_string(),
    scheduled_time,
    event_time: scheduled_time + Duration::minutes(15),
    category: "cardio".to_string(),
    priority: Priority::Medium,
    action_required: true,
    snooze_count: 0,
    max_snoozes: 3,
    status: NotificationStatus::Pending,
    metadata: NotificationMetadata {
      date: scheduled_time.date(),
      activity_id: None,
      event: "mock".to_string(),
      rule: "event".to_string(),
      amount_ml: None,
    },
    dedupe_key: "mock".to_string(),
    sent_at: None,
    responded_at: None,
  }
}

pub fn mock_request(user_id: &str, health_score: f64) -> PlanGenerationRequest {
  PlanGenerationRequest {
    user_profile: mock_profile(user_id),
    health_score,
    health_analysis: serde_json::json!({ "summary": "baseline" }),
    recommendations: vec!["Walk daily".to_string()],
    selected_plan_type: None,
    customization_preferences: None,
  }
}

/// ---------------------------------------------------------------------------
/// Stubs
/// ---------------------------------------------------------------------------

/// Generator returning canned content, counting calls
pub struct StaticGenerator {
  plans: Option<Vec<PlanCandidate>>,
  schedule: Option<DailySchedule>,
  plan_calls: AtomicUsize,
  schedule_calls: AtomicUsize,
}

impl StaticGenerator {
  /// Every call fails, forcing the fallback path
  pub fn failing() -> Self {
    Self {
      plans: None,
      schedule: None,
      plan_calls: AtomicUsize::new(0),
      schedule_calls: AtomicUsize::new(0),
    }
  }

  pub fn with_schedule(schedule: DailySchedule) -> Self {
    Self {
      schedule: Some(schedule),
      ..Self::failing()
    }
  }

  pub fn schedule_calls(&self) -> usize {
    self.schedule_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ContentGenerator for StaticGenerator {
  fn provider(&self) -> &str {
    "static"
  }

  async fn generate_plans(&self, _prompt: &PlanPrompt<'_>) -> GenerationOutcome<Vec<PlanCandidate>> {
    self.plan_calls.fetch_add(1, Ordering::SeqCst);
    match &self.plans {
      Some(plans) => GenerationOutcome::Generated(plans.clone()),
      None => GenerationOutcome::failed("static generator has no plans"),
    }
  }

  async fn generate_schedule(&self, _prompt: &SchedulePrompt<'_>) -> GenerationOutcome<DailySchedule> {
    self.schedule_calls.fetch_add(1, Ordering::SeqCst);
    match &self.schedule {
      Some(schedule) => GenerationOutcome::Generated(schedule.clone()),
      None => GenerationOutcome::failed("static generator has no schedule"),
    }
  }
}

/// Delivery channel that always fails
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
  fn channel(&self) -> &str {
    "failing"
  }

  async fn present(&self, n: &HealthNotification, _settings: &NotificationSettings) -> Result<(), EngineError> {
    Err(EngineError::NotificationDelivery(format!("channel down for {}", n.id)))
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Datelike, Weekday};

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('plans', 'daily_schedules', 'plan_progress', 'health_notifications', 'notification_settings', 'registered_plans')"
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 6, "Expected 6 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    assert_eq!(monday().weekday(), Weekday::Mon);
    assert!(mock_profile("user-1").validate().is_empty());

    let schedule = mock_schedule("user-1", "plan-1");
    assert_eq!(schedule.plan_id, "plan-1");
    assert_eq!(schedule.date, monday());
    assert!(!schedule.activities.is_empty());

    let n = mock_notification("user-1", at(monday(), 9, 0));
    assert!(n.event_time > n.scheduled_time);
    assert_eq!(n.metadata.date, monday());
  }

  #[tokio::test]
  async fn test_static_generator_counts_calls() {
    let generator = StaticGenerator::failing();
    let profile = mock_profile("user-1");
    let plan = fallback_plans(&profile).remove(0);
    let prompt = SchedulePrompt {
      plan: &plan,
      profile: &profile,
      date: monday(),
      previous_day: None,
      adaptation: None,
    };

    assert!(generator.generate_schedule(&prompt).await.ok().is_none());
    assert_eq!(generator.schedule_calls(), 1);
  }
}
