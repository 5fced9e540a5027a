use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::profile::parse_clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
  Nutrition,
  Exercise,
  Medication,
  Detox,
  Lifestyle,
  Reminder,
}

impl std::fmt::Display for NotificationType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      NotificationType::Nutrition => write!(f, "nutrition"),
      NotificationType::Exercise => write!(f, "exercise"),
      NotificationType::Medication => write!(f, "medication"),
      NotificationType::Detox => write!(f, "detox"),
      NotificationType::Lifestyle => write!(f, "lifestyle"),
      NotificationType::Reminder => write!(f, "reminder"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
  #[default]
  Pending,
  Sent,
  Acknowledged,
  Snoozed,
  Missed,
  Cancelled,
  Cleared,
}

impl NotificationStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      NotificationStatus::Acknowledged
        | NotificationStatus::Missed
        | NotificationStatus::Cancelled
        | NotificationStatus::Cleared
    )
  }
}

impl std::fmt::Display for NotificationStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      NotificationStatus::Pending => write!(f, "pending"),
      NotificationStatus::Sent => write!(f, "sent"),
      NotificationStatus::Acknowledged => write!(f, "acknowledged"),
      NotificationStatus::Snoozed => write!(f, "snoozed"),
      NotificationStatus::Missed => write!(f, "missed"),
      NotificationStatus::Cancelled => write!(f, "cancelled"),
      NotificationStatus::Cleared => write!(f, "cleared"),
    }
  }
}

impl std::str::FromStr for NotificationStatus {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(NotificationStatus::Pending),
      "sent" => Ok(NotificationStatus::Sent),
      "acknowledged" => Ok(NotificationStatus::Acknowledged),
      "snoozed" => Ok(NotificationStatus::Snoozed),
      "missed" => Ok(NotificationStatus::Missed),
      "cancelled" => Ok(NotificationStatus::Cancelled),
      "cleared" => Ok(NotificationStatus::Cleared),
      _ => Err(format!("Unknown notification status: {}", s)),
    }
  }
}

/// Links a notification back to the plan and event that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
  pub date: NaiveDate,
  /// Scheduled activity id when the notification comes from an activity
  #[serde(default)]
  pub activity_id: Option<String>,
  pub event: String,
  pub rule: String,
  #[serde(default)]
  pub amount_ml: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthNotification {
  pub id: String,
  pub user_id: String,
  pub plan_id: String,
  pub notification_type: NotificationType,
  pub title: String,
  pub message: String,
  /// User-local wall clock
  pub scheduled_time: NaiveDateTime,
  pub event_time: NaiveDateTime,
  pub category: String,
  pub priority: Priority,
  pub action_required: bool,
  pub snooze_count: u32,
  pub max_snoozes: u32,
  pub status: NotificationStatus,
  pub metadata: NotificationMetadata,
  /// `date:event:rule`, unique per user
  pub dedupe_key: String,
  #[serde(default)]
  pub sent_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub responded_at: Option<NaiveDateTime>,
}

/// ---------------------------------------------------------------------------
/// Settings
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
  pub enabled: bool,
  /// `"HH:MM"`
  pub start: String,
  pub end: String,
}

impl Default for QuietHours {
  fn default() -> Self {
    Self {
      enabled: false,
      start: "22:00".to_string(),
      end: "07:00".to_string(),
    }
  }
}

impl QuietHours {
  /// Half-open `[start, end)`, wrapping past midnight when start > end
  pub fn contains(&self, time: NaiveTime) -> bool {
    if !self.enabled {
      return false;
    }
    let (Some(start), Some(end)) = (parse_clock(&self.start), parse_clock(&self.end)) else {
      return false;
    };
    let minute = |t: NaiveTime| t.hour() * 60 + t.minute();
    let (now, start, end) = (minute(time), minute(start), minute(end));

    if start <= end {
      now >= start && now < end
    } else {
      now >= start || now < end
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryToggles {
  pub nutrition: bool,
  pub exercise: bool,
  pub medication: bool,
  pub detox: bool,
  pub lifestyle: bool,
  pub reminders: bool,
}

impl Default for CategoryToggles {
  fn default() -> Self {
    Self {
      nutrition: true,
      exercise: true,
      medication: true,
      detox: true,
      lifestyle: true,
      reminders: true,
    }
  }
}

/// Per-category lead overrides in minutes; `None` keeps the built-in lead
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryLeads {
  #[serde(default)]
  pub nutrition: Option<i64>,
  #[serde(default)]
  pub exercise: Option<i64>,
  #[serde(default)]
  pub medication: Option<i64>,
  #[serde(default)]
  pub detox: Option<i64>,
  #[serde(default)]
  pub lifestyle: Option<i64>,
  #[serde(default)]
  pub reminders: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
  #[serde(default = "enabled")]
  pub push_enabled: bool,
  #[serde(default = "enabled")]
  pub sound_enabled: bool,
  #[serde(default = "enabled")]
  pub vibration_enabled: bool,
  #[serde(default)]
  pub quiet_hours: QuietHours,
  #[serde(default)]
  pub categories: CategoryToggles,
  #[serde(default)]
  pub lead_minutes: CategoryLeads,
  #[serde(default = "default_snooze_options")]
  pub snooze_options: Vec<u32>,
}

fn enabled() -> bool {
  true
}

fn default_snooze_options() -> Vec<u32> {
  vec![5, 15, 30, 60]
}

impl Default for NotificationSettings {
  fn default() -> Self {
    Self {
      push_enabled: true,
      sound_enabled: true,
      vibration_enabled: true,
      quiet_hours: QuietHours::default(),
      categories: CategoryToggles::default(),
      lead_minutes: CategoryLeads::default(),
      snooze_options: default_snooze_options(),
    }
  }
}

impl NotificationSettings {
  pub fn allows(&self, kind: NotificationType) -> bool {
    let c = &self.categories;
    match kind {
      NotificationType::Nutrition => c.nutrition,
      NotificationType::Exercise => c.exercise,
      NotificationType::Medication => c.medication,
      NotificationType::Detox => c.detox,
      NotificationType::Lifestyle => c.lifestyle,
      NotificationType::Reminder => c.reminders,
    }
  }

  pub fn lead_override(&self, kind: NotificationType) -> Option<i64> {
    let l = &self.lead_minutes;
    let minutes = match kind {
      NotificationType::Nutrition => l.nutrition,
      NotificationType::Exercise => l.exercise,
      NotificationType::Medication => l.medication,
      NotificationType::Detox => l.detox,
      NotificationType::Lifestyle => l.lifestyle,
      NotificationType::Reminder => l.reminders,
    };
    minutes.filter(|m| *m >= 0)
  }

  /// Push goes out only when enabled and outside quiet hours
  pub fn push_allowed_at(&self, time: NaiveTime) -> bool {
    self.push_enabled && !self.quiet_hours.contains(time)
  }

  pub fn validate(&self) -> Result<(), String> {
    if parse_clock(&self.quiet_hours.start).is_none() || parse_clock(&self.quiet_hours.end).is_none() {
      return Err("quiet hours must be HH:MM".to_string());
    }
    if self.snooze_options.is_empty() || self.snooze_options.contains(&0) {
      return Err("snooze options must be positive minutes".to_string());
    }
    Ok(())
  }
}
