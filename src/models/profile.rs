use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Parse an `"HH:MM"` wall-clock time
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
  NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
  Monday,
  Tuesday,
  Wednesday,
  Thursday,
  Friday,
  Saturday,
  Sunday,
}

impl DayOfWeek {
  pub const ALL: [DayOfWeek; 7] = [
    DayOfWeek::Monday,
    DayOfWeek::Tuesday,
    DayOfWeek::Wednesday,
    DayOfWeek::Thursday,
    DayOfWeek::Friday,
    DayOfWeek::Saturday,
    DayOfWeek::Sunday,
  ];
}

impl From<Weekday> for DayOfWeek {
  fn from(day: Weekday) -> Self {
    match day {
      Weekday::Mon => DayOfWeek::Monday,
      Weekday::Tue => DayOfWeek::Tuesday,
      Weekday::Wed => DayOfWeek::Wednesday,
      Weekday::Thu => DayOfWeek::Thursday,
      Weekday::Fri => DayOfWeek::Friday,
      Weekday::Sat => DayOfWeek::Saturday,
      Weekday::Sun => DayOfWeek::Sunday,
    }
  }
}

impl std::fmt::Display for DayOfWeek {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      DayOfWeek::Monday => "monday",
      DayOfWeek::Tuesday => "tuesday",
      DayOfWeek::Wednesday => "wednesday",
      DayOfWeek::Thursday => "thursday",
      DayOfWeek::Friday => "friday",
      DayOfWeek::Saturday => "saturday",
      DayOfWeek::Sunday => "sunday",
    };
    write!(f, "{}", name)
  }
}

/// Self-reported intensity preference from onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
  Low,
  Medium,
  High,
}

impl Intensity {
  /// Parse a free-form label such as "High" or " medium "
  pub fn from_label(label: &str) -> Option<Self> {
    match label.trim().to_lowercase().as_str() {
      "low" => Some(Intensity::Low),
      "medium" | "moderate" => Some(Intensity::Medium),
      "high" => Some(Intensity::High),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
  Male,
  Female,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
  Sedentary,
  #[default]
  Light,
  Moderate,
  Active,
  VeryActive,
}

impl ActivityLevel {
  /// TDEE multiplier applied to BMR
  pub fn factor(&self) -> f64 {
    match self {
      ActivityLevel::Sedentary => 1.2,
      ActivityLevel::Light => 1.375,
      ActivityLevel::Moderate => 1.55,
      ActivityLevel::Active => 1.725,
      ActivityLevel::VeryActive => 1.9,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
  pub name: String,
  #[serde(default)]
  pub dosage: Option<String>,
  /// `"HH:MM"` timing hint
  #[serde(default)]
  pub time: Option<String>,
  #[serde(default)]
  pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePreferences {
  #[serde(default)]
  pub start_date: Option<NaiveDate>,
  pub duration_weeks: u32,
  #[serde(default)]
  pub preferred_workout_days: Vec<DayOfWeek>,
  #[serde(default)]
  pub preferred_rest_days: Vec<DayOfWeek>,
  #[serde(default)]
  pub intensity_preference: Option<Intensity>,
}

/// Onboarding profile as submitted by the client.
///
/// Clock fields are `"HH:MM"` strings and are validated by [`UserProfile::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
  pub id: String,
  #[serde(default)]
  pub full_name: Option<String>,
  pub age: u32,
  #[serde(default)]
  pub sex: Option<Sex>,
  #[serde(default)]
  pub height_cm: Option<f64>,
  #[serde(default)]
  pub weight_kg: Option<f64>,
  #[serde(default)]
  pub activity_level: ActivityLevel,
  /// 1-10
  #[serde(default)]
  pub stress_level: Option<u8>,
  #[serde(default = "default_sleep_time")]
  pub sleep_time: String,
  #[serde(default = "default_wake_time")]
  pub wake_time: String,
  #[serde(default)]
  pub work_start: Option<String>,
  #[serde(default)]
  pub work_end: Option<String>,
  #[serde(default)]
  pub diet_type: Option<String>,
  #[serde(default)]
  pub dietary_restrictions: Vec<String>,
  #[serde(default)]
  pub allergies: Vec<String>,
  #[serde(default)]
  pub chronic_conditions: Vec<String>,
  #[serde(default)]
  pub medications: Vec<Medication>,
  #[serde(default)]
  pub health_goals: Vec<String>,
  pub timeline_preferences: TimelinePreferences,
}

fn default_sleep_time() -> String {
  "22:30".to_string()
}

fn default_wake_time() -> String {
  "06:30".to_string()
}

impl UserProfile {
  /// Check the fields every downstream component relies on.
  /// Returns the list of problems, empty when the profile is usable.
  pub fn validate(&self) -> Vec<String> {
    let mut problems = Vec::new();

    if self.id.trim().is_empty() {
      problems.push("userProfile.id is required".to_string());
    }
    if self.age == 0 || self.age > 120 {
      problems.push(format!("userProfile.age out of range: {}", self.age));
    }
    if self.timeline_preferences.duration_weeks == 0 {
      problems.push("timeline_preferences.duration_weeks must be at least 1".to_string());
    }
    if matches!(self.height_cm, Some(h) if h <= 0.0) {
      problems.push("userProfile.height_cm must be positive".to_string());
    }
    if matches!(self.weight_kg, Some(w) if w <= 0.0) {
      problems.push("userProfile.weight_kg must be positive".to_string());
    }

    for (field, value) in [("sleep_time", Some(&self.sleep_time)), ("wake_time", Some(&self.wake_time))]
      .into_iter()
      .chain([("work_start", self.work_start.as_ref()), ("work_end", self.work_end.as_ref())])
    {
      if let Some(v) = value {
        if parse_clock(v).is_none() {
          problems.push(format!("userProfile.{} is not HH:MM: {}", field, v));
        }
      }
    }

    for med in &self.medications {
      if let Some(time) = &med.time {
        if parse_clock(time).is_none() {
          problems.push(format!("medication {} has invalid time: {}", med.name, time));
        }
      }
    }

    problems
  }

  /// Mifflin-St Jeor BMR scaled by activity level, when the inputs are known
  pub fn estimated_daily_calories(&self) -> Option<u32> {
    let weight = self.weight_kg?;
    let height = self.height_cm?;
    let sex_offset = match self.sex? {
      Sex::Male => 5.0,
      Sex::Female => -161.0,
      Sex::Other => -78.0,
    };
    let bmr = 10.0 * weight + 6.25 * height - 5.0 * f64::from(self.age) + sex_offset;
    let tdee = bmr * self.activity_level.factor();
    if tdee.is_finite() && tdee > 0.0 {
      Some(tdee.round() as u32)
    } else {
      None
    }
  }

  pub fn plan_start(&self, fallback: NaiveDate) -> NaiveDate {
    self.timeline_preferences.start_date.unwrap_or(fallback)
  }
}
