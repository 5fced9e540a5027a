use serde::{Deserialize, Serialize};

use super::profile::{parse_clock, DayOfWeek, Intensity};

/// ---------------------------------------------------------------------------
/// Difficulty Tier
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Beginner, Difficulty::Intermediate, Difficulty::Advanced];

  /// Tier implied by a 0-100 health score
  pub fn for_health_score(score: f64) -> Self {
    if score < 40.0 {
      Difficulty::Beginner
    } else if score < 70.0 {
      Difficulty::Intermediate
    } else {
      Difficulty::Advanced
    }
  }

  pub fn from_intensity(intensity: Intensity) -> Self {
    match intensity {
      Intensity::Low => Difficulty::Beginner,
      Intensity::Medium => Difficulty::Intermediate,
      Intensity::High => Difficulty::Advanced,
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Difficulty::Beginner => write!(f, "Beginner"),
      Difficulty::Intermediate => write!(f, "Intermediate"),
      Difficulty::Advanced => write!(f, "Advanced"),
    }
  }
}

impl std::str::FromStr for Difficulty {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "beginner" => Ok(Difficulty::Beginner),
      "intermediate" => Ok(Difficulty::Intermediate),
      "advanced" => Ok(Difficulty::Advanced),
      _ => Err(format!("Unknown difficulty: {}", s)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Templates
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
  Workout,
  Rest,
  ActiveRecovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
  Exercise,
  Nutrition,
  Recovery,
  Mindfulness,
  Lifestyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityIntensity {
  Low,
  Moderate,
  High,
}

impl ActivityIntensity {
  pub fn step_down(self) -> Self {
    match self {
      ActivityIntensity::High => ActivityIntensity::Moderate,
      _ => ActivityIntensity::Low,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelModifications {
  #[serde(default)]
  pub beginner: Option<String>,
  #[serde(default)]
  pub intermediate: Option<String>,
  #[serde(default)]
  pub advanced: Option<String>,
}

impl LevelModifications {
  pub fn for_level(&self, level: Difficulty) -> Option<&str> {
    match level {
      Difficulty::Beginner => self.beginner.as_deref(),
      Difficulty::Intermediate => self.intermediate.as_deref(),
      Difficulty::Advanced => self.advanced.as_deref(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTemplate {
  pub id: String,
  pub title: String,
  pub category: ActivityCategory,
  /// `"HH:MM"`
  pub time_slot: String,
  pub duration_minutes: u32,
  pub intensity: ActivityIntensity,
  #[serde(default)]
  pub instructions: Vec<String>,
  #[serde(default)]
  pub equipment: Vec<String>,
  #[serde(default)]
  pub modifications: LevelModifications,
  #[serde(default)]
  pub prerequisites: Vec<String>,
  #[serde(default)]
  pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTemplate {
  pub day_type: DayType,
  pub theme: String,
  pub activities: Vec<ActivityTemplate>,
  #[serde(default)]
  pub nutrition_focus: String,
  #[serde(default)]
  pub recovery_emphasis: String,
}

/// One template per weekday; a structure missing a day does not deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStructure {
  pub monday: DayTemplate,
  pub tuesday: DayTemplate,
  pub wednesday: DayTemplate,
  pub thursday: DayTemplate,
  pub friday: DayTemplate,
  pub saturday: DayTemplate,
  pub sunday: DayTemplate,
}

impl WeeklyStructure {
  pub fn day(&self, day: DayOfWeek) -> &DayTemplate {
    match day {
      DayOfWeek::Monday => &self.monday,
      DayOfWeek::Tuesday => &self.tuesday,
      DayOfWeek::Wednesday => &self.wednesday,
      DayOfWeek::Thursday => &self.thursday,
      DayOfWeek::Friday => &self.friday,
      DayOfWeek::Saturday => &self.saturday,
      DayOfWeek::Sunday => &self.sunday,
    }
  }

  pub fn days(&self) -> impl Iterator<Item = (DayOfWeek, &DayTemplate)> {
    DayOfWeek::ALL.into_iter().map(move |d| (d, self.day(d)))
  }
}

/// ---------------------------------------------------------------------------
/// Guidelines
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroSplit {
  pub protein_pct: u32,
  pub carbs_pct: u32,
  pub fat_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealTiming {
  pub meal: String,
  /// `"HH:MM"`
  pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionGuidelines {
  pub daily_calories: u32,
  pub macros: MacroSplit,
  #[serde(default)]
  pub meal_timing: Vec<MealTiming>,
  pub hydration_goal_ml: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryProtocol {
  pub sleep_hours: f64,
  #[serde(default)]
  pub rest_day_activities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionMilestone {
  pub week: u32,
  pub milestone: String,
  #[serde(default)]
  pub expected_outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRules {
  #[serde(default)]
  pub underperforming: String,
  #[serde(default)]
  pub overperforming: String,
}

/// ---------------------------------------------------------------------------
/// Plan Candidate
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCandidate {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub difficulty: Difficulty,
  pub duration_weeks: u32,
  #[serde(default)]
  pub focus_areas: Vec<String>,
  #[serde(default)]
  pub equipment_needed: Vec<String>,
  pub weekly_structure: WeeklyStructure,
  pub nutrition_guidelines: NutritionGuidelines,
  pub recovery_protocol: RecoveryProtocol,
  pub progression_milestones: Vec<ProgressionMilestone>,
  #[serde(default)]
  pub adaptation_rules: AdaptationRules,
}

impl PlanCandidate {
  pub fn milestone_for_week(&self, week: u32) -> Option<&ProgressionMilestone> {
    self.progression_milestones.iter().find(|m| m.week == week)
  }

  /// Structural checks run before a generated plan enters the engine
  pub fn validate(&self) -> Result<(), String> {
    if self.id.trim().is_empty() {
      return Err("plan id is empty".to_string());
    }
    if self.duration_weeks == 0 {
      return Err(format!("plan {} has zero duration", self.id));
    }
    if self.nutrition_guidelines.daily_calories == 0 {
      return Err(format!("plan {} has no calorie target", self.id));
    }
    for m in &self.progression_milestones {
      if m.week == 0 || m.week > self.duration_weeks {
        return Err(format!("plan {} milestone week {} outside 1..={}", self.id, m.week, self.duration_weeks));
      }
    }
    for meal in &self.nutrition_guidelines.meal_timing {
      if parse_clock(&meal.time).is_none() {
        return Err(format!("plan {} meal {} has invalid time {}", self.id, meal.meal, meal.time));
      }
    }
    for (day, template) in self.weekly_structure.days() {
      for activity in &template.activities {
        if parse_clock(&activity.time_slot).is_none() {
          return Err(format!(
            "plan {} {} activity {} has invalid time slot {}",
            self.id, day, activity.id, activity.time_slot
          ));
        }
        if activity.duration_minutes == 0 {
          return Err(format!("plan {} {} activity {} has zero duration", self.id, day, activity.id));
        }
      }
    }
    Ok(())
  }
}
