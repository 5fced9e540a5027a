use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::plan::{ActivityCategory, ActivityIntensity, DayType};
use super::profile::{parse_clock, DayOfWeek};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
  #[default]
  Pending,
  InProgress,
  Completed,
  Skipped,
}

impl std::fmt::Display for ActivityStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ActivityStatus::Pending => write!(f, "pending"),
      ActivityStatus::InProgress => write!(f, "in_progress"),
      ActivityStatus::Completed => write!(f, "completed"),
      ActivityStatus::Skipped => write!(f, "skipped"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivity {
  pub id: String,
  pub title: String,
  pub category: ActivityCategory,
  /// `"HH:MM"`
  pub time: String,
  pub duration_minutes: u32,
  pub intensity: ActivityIntensity,
  #[serde(default)]
  pub instructions: Vec<String>,
  #[serde(default)]
  pub equipment: Vec<String>,
  #[serde(default)]
  pub status: ActivityStatus,
  #[serde(default)]
  pub actual_duration_minutes: Option<u32>,
  /// 1-10, reported after the activity
  #[serde(default)]
  pub difficulty_rating: Option<u8>,
  /// 1-10
  #[serde(default)]
  pub satisfaction: Option<u8>,
  #[serde(default)]
  pub notes: Option<String>,
}

impl ScheduledActivity {
  pub fn has_recorded_progress(&self) -> bool {
    self.status != ActivityStatus::Pending
      || self.actual_duration_minutes.is_some()
      || self.difficulty_rating.is_some()
      || self.satisfaction.is_some()
      || self.notes.is_some()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
  Breakfast,
  Lunch,
  Dinner,
  Snack,
}

impl MealType {
  pub fn from_label(label: &str) -> Self {
    let lower = label.to_lowercase();
    if lower.contains("breakfast") {
      MealType::Breakfast
    } else if lower.contains("lunch") {
      MealType::Lunch
    } else if lower.contains("dinner") || lower.contains("supper") {
      MealType::Dinner
    } else {
      MealType::Snack
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
  pub protein_g: u32,
  pub carbs_g: u32,
  pub fat_g: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
  pub meal_type: MealType,
  pub name: String,
  /// `"HH:MM"`
  pub time: String,
  pub calories: u32,
  #[serde(default)]
  pub macros: Macros,
  #[serde(default)]
  pub ingredients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationPlan {
  pub target_ml: u32,
  #[serde(default = "default_reminder_ml")]
  pub reminder_ml: u32,
  #[serde(default = "default_window_start")]
  pub window_start: String,
  #[serde(default = "default_window_end")]
  pub window_end: String,
}

fn default_reminder_ml() -> u32 {
  500
}

fn default_window_start() -> String {
  "08:00".to_string()
}

fn default_window_end() -> String {
  "20:00".to_string()
}

impl HydrationPlan {
  pub fn with_target(target_ml: u32) -> Self {
    Self {
      target_ml,
      reminder_ml: default_reminder_ml(),
      window_start: default_window_start(),
      window_end: default_window_end(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionPlan {
  pub daily_calories: u32,
  pub meals: Vec<Meal>,
  pub hydration: HydrationPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
  Generated,
  Fallback,
}

impl std::fmt::Display for ScheduleSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ScheduleSource::Generated => write!(f, "generated"),
      ScheduleSource::Fallback => write!(f, "fallback"),
    }
  }
}

/// Adaptation applied while building a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAdaptation {
  pub reason: String,
  pub change: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
  pub id: String,
  pub user_id: String,
  pub plan_id: String,
  pub date: NaiveDate,
  pub day_of_week: DayOfWeek,
  pub day_type: DayType,
  #[serde(default)]
  pub theme: String,
  pub activities: Vec<ScheduledActivity>,
  pub nutrition_plan: NutritionPlan,
  #[serde(default)]
  pub recovery_focus: Vec<String>,
  #[serde(default)]
  pub adaptation: Option<AppliedAdaptation>,
  pub source: ScheduleSource,
  pub created_at: DateTime<Utc>,
}

/// Partial update reported by the client for one activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityUpdate {
  pub status: ActivityStatus,
  #[serde(default)]
  pub actual_duration_minutes: Option<u32>,
  #[serde(default)]
  pub difficulty_rating: Option<u8>,
  #[serde(default)]
  pub satisfaction: Option<u8>,
  #[serde(default)]
  pub notes: Option<String>,
}

impl DailySchedule {
  pub fn activity(&self, activity_id: &str) -> Option<&ScheduledActivity> {
    self.activities.iter().find(|a| a.id == activity_id)
  }

  /// Apply a client-reported update to one activity
  pub fn record_activity(
    &mut self,
    activity_id: &str,
    update: ActivityUpdate,
  ) -> Result<&ScheduledActivity, EngineError> {
    for (name, rating) in [("difficulty_rating", update.difficulty_rating), ("satisfaction", update.satisfaction)] {
      if let Some(r) = rating {
        if !(1..=10).contains(&r) {
          return Err(EngineError::InvalidRequest(format!("{} must be between 1 and 10, got {}", name, r)));
        }
      }
    }

    let activity = self
      .activities
      .iter_mut()
      .find(|a| a.id == activity_id)
      .ok_or_else(|| EngineError::NotFound(format!("activity {} on {}", activity_id, self.date)))?;

    activity.status = update.status;
    if update.actual_duration_minutes.is_some() {
      activity.actual_duration_minutes = update.actual_duration_minutes;
    }
    if update.difficulty_rating.is_some() {
      activity.difficulty_rating = update.difficulty_rating;
    }
    if update.satisfaction.is_some() {
      activity.satisfaction = update.satisfaction;
    }
    if update.notes.is_some() {
      activity.notes = update.notes;
    }

    Ok(activity)
  }

  /// Keep what the user already recorded on `previous`, a superseded schedule for the same day.
  /// Matching activity ids take over status and feedback; recorded activities the new
  /// schedule no longer contains are kept as they were.
  pub fn carry_over_progress(&mut self, previous: &DailySchedule) {
    for old in previous.activities.iter().filter(|a| a.has_recorded_progress()) {
      match self.activities.iter_mut().find(|a| a.id == old.id) {
        Some(activity) => {
          activity.status = old.status;
          activity.actual_duration_minutes = old.actual_duration_minutes;
          activity.difficulty_rating = old.difficulty_rating;
          activity.satisfaction = old.satisfaction;
          activity.notes = old.notes.clone();
        }
        None => self.activities.push(old.clone()),
      }
    }
    self.activities.sort_by_key(|a| parse_clock(&a.time));
  }

  /// Summarise how the day went, for the next day's adaptation
  pub fn performance(&self) -> DayPerformance {
    let total = self.activities.len() as u32;
    let completed = self
      .activities
      .iter()
      .filter(|a| a.status == ActivityStatus::Completed)
      .count() as u32;

    let completion_rate = if total == 0 {
      0.0
    } else {
      f64::from(completed) / f64::from(total) * 100.0
    };

    DayPerformance {
      completion_rate,
      activities_completed: completed,
      total_activities: total,
      difficulty_rating: mean(self.activities.iter().filter_map(|a| a.difficulty_rating)),
      energy_levels: None,
      satisfaction: mean(self.activities.iter().filter_map(|a| a.satisfaction)),
      notes: None,
    }
  }
}

fn mean(values: impl Iterator<Item = u8>) -> Option<f64> {
  let (sum, count) = values.fold((0u32, 0u32), |(s, c), v| (s + u32::from(v), c + 1));
  if count == 0 {
    None
  } else {
    Some(f64::from(sum) / f64::from(count))
  }
}

/// Prior-day performance signals feeding adaptation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayPerformance {
  #[serde(default)]
  pub completion_rate: f64,
  #[serde(default)]
  pub activities_completed: u32,
  #[serde(default)]
  pub total_activities: u32,
  #[serde(default, alias = "difficulty_feedback")]
  pub difficulty_rating: Option<f64>,
  #[serde(default)]
  pub energy_levels: Option<f64>,
  #[serde(default)]
  pub satisfaction: Option<f64>,
  #[serde(default)]
  pub notes: Option<String>,
}

impl DayPerformance {
  /// No data for the day counts as nothing completed
  pub fn missing() -> Self {
    Self::default()
  }

  /// Clamp rates into range and drop ratings that are not numbers
  pub fn sanitized(mut self) -> Self {
    self.completion_rate = if self.completion_rate.is_finite() {
      self.completion_rate.clamp(0.0, 100.0)
    } else {
      0.0
    };
    for rating in [&mut self.difficulty_rating, &mut self.energy_levels, &mut self.satisfaction] {
      if matches!(rating, Some(v) if !v.is_finite()) {
        *rating = None;
      }
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::mock_schedule;

  #[test]
  fn test_performance_counts_completed() {
    // Arrange
    let mut schedule = mock_schedule("user-1", "plan-1");
    let ids: Vec<String> = schedule.activities.iter().map(|a| a.id.clone()).collect();
    assert!(ids.len() >= 2);

    // Act
    schedule
      .record_activity(
        &ids[0],
        ActivityUpdate {
          status: ActivityStatus::Completed,
          difficulty_rating: Some(8),
          satisfaction: Some(4),
          ..Default::default()
        },
      )
      .unwrap();
    let perf = schedule.performance();

    // Assert
    assert_eq!(perf.activities_completed, 1);
    assert_eq!(perf.total_activities, ids.len() as u32);
    crate::assert_approx_eq!(perf.completion_rate, 100.0 / ids.len() as f64, 0.01);
    assert_eq!(perf.difficulty_rating, Some(8.0));
    assert_eq!(perf.satisfaction, Some(4.0));
  }

  #[test]
  fn test_record_activity_rejects_out_of_range_rating() {
    let mut schedule = mock_schedule("user-1", "plan-1");
    let id = schedule.activities[0].id.clone();

    let result = schedule.record_activity(
      &id,
      ActivityUpdate {
        status: ActivityStatus::Completed,
        satisfaction: Some(11),
        ..Default::default()
      },
    );

    assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    assert_eq!(schedule.activities[0].status, ActivityStatus::Pending);
  }

  #[test]
  fn test_carry_over_keeps_recorded_activities() {
    // Arrange: one activity completed on the old schedule, one only on the old schedule
    let mut previous = mock_schedule("user-1", "plan-1");
    let kept_id = previous.activities[0].id.clone();
    previous
      .record_activity(
        &kept_id,
        ActivityUpdate {
          status: ActivityStatus::Completed,
          satisfaction: Some(9),
          notes: Some("felt good".into()),
          ..Default::default()
        },
      )
      .unwrap();
    let mut dropped = previous.activities[0].clone();
    dropped.id = "old-only".into();
    dropped.time = "23:59".into();
    previous.activities.push(dropped);
    let mut untouched = previous.activities[1].clone();
    untouched.id = "old-pending".into();
    previous.activities.push(untouched);
    let mut regenerated = mock_schedule("user-1", "plan-1");
    let count = regenerated.activities.len();

    // Act
    regenerated.carry_over_progress(&previous);

    // Assert
    let kept = regenerated.activity(&kept_id).unwrap();
    assert_eq!(kept.status, ActivityStatus::Completed);
    assert_eq!(kept.satisfaction, Some(9));
    assert_eq!(kept.notes.as_deref(), Some("felt good"));
    assert_eq!(regenerated.activity("old-only").unwrap().status, ActivityStatus::Completed);
    assert!(regenerated.activity("old-pending").is_none());
    assert_eq!(regenerated.activities.len(), count + 1);
    assert_eq!(regenerated.activities.last().unwrap().id, "old-only");
  }

  #[test]
  fn test_record_activity_unknown_id() {
    let mut schedule = mock_schedule("user-1", "plan-1");
    let result = schedule.record_activity("nope", ActivityUpdate::default());
    assert!(matches!(result, Err(EngineError::NotFound(_))));
  }

  #[test]
  fn test_sanitized_handles_malformed_values() {
    let perf = DayPerformance {
      completion_rate: f64::NAN,
      satisfaction: Some(f64::INFINITY),
      difficulty_rating: Some(5.0),
      ..Default::default()
    }
    .sanitized();

    assert_eq!(perf.completion_rate, 0.0);
    assert_eq!(perf.satisfaction, None);
    assert_eq!(perf.difficulty_rating, Some(5.0));
  }

  #[test]
  fn test_performance_accepts_difficulty_feedback_alias() {
    let perf: DayPerformance =
      serde_json::from_str(r#"{"completion_rate": 55, "difficulty_feedback": 6}"#).unwrap();
    assert_eq!(perf.difficulty_rating, Some(6.0));
  }
}
