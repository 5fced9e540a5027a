//! Expands a day's schedule into timed notifications.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::models::notification::NotificationMetadata;
use crate::models::plan::ActivityCategory;
use crate::models::profile::parse_clock;
use crate::models::schedule::{HydrationPlan, MealType, ScheduledActivity};
use crate::models::{
  DailySchedule, HealthNotification, NotificationSettings, NotificationStatus, NotificationType, Priority,
  UserProfile,
};

const EVENT_MAX_SNOOZES: u32 = 3;
const ROUTINE_MAX_SNOOZES: u32 = 2;
const DEFAULT_REMINDER_ML: u32 = 500;
const MAX_HYDRATION_REMINDERS: u32 = 16;

/// What a notification is about; drives lead time, priority and whether it needs action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Medication,
  Breakfast,
  Lunch,
  Dinner,
  Snack,
  Cardio,
  Strength,
  Yoga,
  Stretching,
  Meditation,
  Breathing,
  Journaling,
  Hydration,
  Sleep,
  Other,
}

impl EventKind {
  pub fn lead_minutes(self) -> i64 {
    match self {
      EventKind::Medication => 15,
      EventKind::Breakfast | EventKind::Lunch | EventKind::Dinner => 15,
      EventKind::Snack => 10,
      EventKind::Cardio | EventKind::Strength => 30,
      EventKind::Yoga => 20,
      EventKind::Stretching => 15,
      EventKind::Meditation => 10,
      EventKind::Breathing => 5,
      EventKind::Journaling => 10,
      EventKind::Hydration => 0,
      EventKind::Sleep => 30,
      EventKind::Other => 15,
    }
  }

  pub fn notification_type(self) -> NotificationType {
    match self {
      EventKind::Medication => NotificationType::Medication,
      EventKind::Breakfast | EventKind::Lunch | EventKind::Dinner | EventKind::Snack => NotificationType::Nutrition,
      EventKind::Cardio | EventKind::Strength | EventKind::Yoga | EventKind::Stretching => NotificationType::Exercise,
      EventKind::Meditation | EventKind::Breathing | EventKind::Journaling | EventKind::Sleep => {
        NotificationType::Lifestyle
      }
      EventKind::Hydration => NotificationType::Detox,
      EventKind::Other => NotificationType::Reminder,
    }
  }

  pub fn priority(self) -> Priority {
    match self {
      EventKind::Medication => Priority::High,
      EventKind::Breakfast | EventKind::Lunch | EventKind::Dinner | EventKind::Cardio | EventKind::Strength => {
        Priority::Medium
      }
      EventKind::Hydration => Priority::Medium,
      _ => Priority::Low,
    }
  }

  pub fn action_required(self) -> bool {
    matches!(
      self,
      EventKind::Medication | EventKind::Cardio | EventKind::Strength | EventKind::Yoga
    )
  }

  pub fn label(self) -> &'static str {
    match self {
      EventKind::Medication => "medication",
      EventKind::Breakfast => "breakfast",
      EventKind::Lunch => "lunch",
      EventKind::Dinner => "dinner",
      EventKind::Snack => "snack",
      EventKind::Cardio => "cardio",
      EventKind::Strength => "strength",
      EventKind::Yoga => "yoga",
      EventKind::Stretching => "stretching",
      EventKind::Meditation => "meditation",
      EventKind::Breathing => "deep-breathing",
      EventKind::Journaling => "journaling",
      EventKind::Hydration => "hydration",
      EventKind::Sleep => "sleep",
      EventKind::Other => "reminder",
    }
  }

  pub fn for_meal(meal: MealType) -> Self {
    match meal {
      MealType::Breakfast => EventKind::Breakfast,
      MealType::Lunch => EventKind::Lunch,
      MealType::Dinner => EventKind::Dinner,
      MealType::Snack => EventKind::Snack,
    }
  }

  /// Classify an activity by its title, falling back to its category
  pub fn for_activity(activity: &ScheduledActivity) -> Self {
    let text = format!("{} {}", activity.id, activity.title).to_lowercase();
    const KEYWORDS: [(&str, EventKind); 12] = [
      ("strength", EventKind::Strength),
      ("weights", EventKind::Strength),
      ("cardio", EventKind::Cardio),
      ("run", EventKind::Cardio),
      ("hiit", EventKind::Cardio),
      ("cycl", EventKind::Cardio),
      ("yoga", EventKind::Yoga),
      ("stretch", EventKind::Stretching),
      ("meditat", EventKind::Meditation),
      ("breath", EventKind::Breathing),
      ("journal", EventKind::Journaling),
      ("sleep", EventKind::Sleep),
    ];
    // Keywords match word prefixes
    let words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    if let Some((_, kind)) = KEYWORDS.iter().find(|(k, _)| words.iter().any(|w| w.starts_with(k))) {
      return *kind;
    }
    match activity.category {
      ActivityCategory::Exercise => EventKind::Cardio,
      ActivityCategory::Recovery => EventKind::Stretching,
      ActivityCategory::Mindfulness => EventKind::Meditation,
      ActivityCategory::Nutrition | ActivityCategory::Lifestyle => EventKind::Other,
    }
  }
}

/// One schedulable moment before lead time and filtering are applied
struct Event {
  kind: EventKind,
  key: String,
  rule: &'static str,
  time: NaiveTime,
  title: String,
  message: String,
  activity_id: Option<String>,
  amount_ml: Option<u32>,
  max_snoozes: u32,
}

/// Build every notification for `schedule` that is still ahead of `now`.
///
/// Both the event and the lead-adjusted delivery time must be strictly after
/// `now`. Categories disabled in `settings` are skipped.
pub fn schedule_notifications(
  schedule: &DailySchedule,
  profile: &UserProfile,
  settings: &NotificationSettings,
  now: NaiveDateTime,
) -> Vec<HealthNotification> {
  let mut events = Vec::new();
  events.extend(activity_events(&schedule.activities));
  events.extend(meal_events(schedule));
  events.extend(hydration_events(&schedule.nutrition_plan.hydration));
  events.extend(medication_events(profile));
  events.extend(sleep_event(profile));

  let mut notifications: Vec<HealthNotification> = events
    .into_iter()
    .filter_map(|event| {
      let notification_type = event.kind.notification_type();
      if !settings.allows(notification_type) {
        return None;
      }
      let lead = settings
        .lead_override(notification_type)
        .unwrap_or_else(|| event.kind.lead_minutes());
      let event_time = schedule.date.and_time(event.time);
      let scheduled_time = event_time - Duration::minutes(lead);
      if event_time <= now || scheduled_time <= now {
        return None;
      }

      Some(HealthNotification {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: schedule.user_id.clone(),
        plan_id: schedule.plan_id.clone(),
        notification_type,
        title: event.title,
        message: event.message,
        scheduled_time,
        event_time,
        category: event.kind.label().to_string(),
        priority: event.kind.priority(),
        action_required: event.kind.action_required(),
        snooze_count: 0,
        max_snoozes: event.max_snoozes,
        status: NotificationStatus::Pending,
        metadata: NotificationMetadata {
          date: schedule.date,
          activity_id: event.activity_id,
          event: event.key.clone(),
          rule: event.rule.to_string(),
          amount_ml: event.amount_ml,
        },
        dedupe_key: format!("{}:{}:{}", schedule.date, event.key, event.rule),
        sent_at: None,
        responded_at: None,
      })
    })
    .collect();

  notifications.sort_by_key(|n| n.scheduled_time);
  notifications
}

fn hhmm(t: NaiveTime) -> String {
  t.format("%H:%M").to_string()
}

fn activity_events(activities: &[ScheduledActivity]) -> Vec<Event> {
  activities
    .iter()
    .filter_map(|a| {
      let time = parse_clock(&a.time)?;
      let kind = EventKind::for_activity(a);
      Some(Event {
        kind,
        key: format!("activity-{}", a.id),
        rule: "event",
        time,
        title: format!("Upcoming: {}", a.title),
        message: format!("{} starts at {} ({} min)", a.title, hhmm(time), a.duration_minutes),
        activity_id: Some(a.id.clone()),
        amount_ml: None,
        max_snoozes: EVENT_MAX_SNOOZES,
      })
    })
    .collect()
}

fn meal_events(schedule: &DailySchedule) -> Vec<Event> {
  schedule
    .nutrition_plan
    .meals
    .iter()
    .enumerate()
    .filter_map(|(idx, meal)| {
      let time = parse_clock(&meal.time)?;
      let kind = EventKind::for_meal(meal.meal_type);
      Some(Event {
        kind,
        key: format!("meal-{}-{}", kind.label(), idx),
        rule: "meal",
        time,
        title: format!("{} at {}", capitalize(kind.label()), hhmm(time)),
        message: format!("{} - {} kcal", meal.name, meal.calories),
        activity_id: None,
        amount_ml: None,
        max_snoozes: ROUTINE_MAX_SNOOZES,
      })
    })
    .collect()
}

/// Reminders spread evenly from the window start, one per `reminder_ml`
fn hydration_events(hydration: &HydrationPlan) -> Vec<Event> {
  if hydration.target_ml == 0 {
    return Vec::new();
  }
  let (Some(start), Some(end)) = (parse_clock(&hydration.window_start), parse_clock(&hydration.window_end)) else {
    return Vec::new();
  };
  let start_min = i64::from(start.hour() * 60 + start.minute());
  let end_min = i64::from(end.hour() * 60 + end.minute());
  if end_min <= start_min {
    return Vec::new();
  }

  let per_reminder = if hydration.reminder_ml == 0 { DEFAULT_REMINDER_ML } else { hydration.reminder_ml };
  let count = hydration.target_ml.div_ceil(per_reminder).min(MAX_HYDRATION_REMINDERS);
  let interval = (end_min - start_min) / i64::from(count);
  let amount = (f64::from(hydration.target_ml) / f64::from(count)).round() as u32;

  (0..count)
    .filter_map(|i| {
      let minute = start_min + i64::from(i) * interval;
      let time = NaiveTime::from_hms_opt((minute / 60) as u32, (minute % 60) as u32, 0)?;
      Some(Event {
        kind: EventKind::Hydration,
        key: format!("hydration-{}", i + 1),
        rule: "hydration",
        time,
        title: "Hydration reminder".to_string(),
        message: format!("Drink {} ml of water", amount),
        activity_id: None,
        amount_ml: Some(amount),
        max_snoozes: ROUTINE_MAX_SNOOZES,
      })
    })
    .collect()
}

fn medication_events(profile: &UserProfile) -> Vec<Event> {
  let default_time = parse_clock(&profile.wake_time);
  profile
    .medications
    .iter()
    .enumerate()
    .filter_map(|(idx, med)| {
      let time = med.time.as_deref().and_then(parse_clock).or(default_time)?;
      let detail = [med.dosage.as_deref(), med.instructions.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
      Some(Event {
        kind: EventKind::Medication,
        key: format!("medication-{}-{}", idx, med.name.to_lowercase().replace(' ', "-")),
        rule: "medication",
        time,
        title: format!("Time for {}", med.name),
        message: if detail.is_empty() {
          format!("Take {} at {}", med.name, hhmm(time))
        } else {
          format!("Take {} at {} ({})", med.name, hhmm(time), detail)
        },
        activity_id: None,
        amount_ml: None,
        max_snoozes: ROUTINE_MAX_SNOOZES,
      })
    })
    .collect()
}

fn sleep_event(profile: &UserProfile) -> Option<Event> {
  let time = parse_clock(&profile.sleep_time)?;
  Some(Event {
    kind: EventKind::Sleep,
    key: "sleep".to_string(),
    rule: "lifestyle",
    time,
    title: "Wind down for sleep".to_string(),
    message: format!("Lights out at {}", hhmm(time)),
    activity_id: None,
    amount_ml: None,
    max_snoozes: ROUTINE_MAX_SNOOZES,
  })
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::profile::Medication;
  use crate::test_utils::{at, mock_profile, mock_schedule, monday};

  fn hydration_times(notifications: &[HealthNotification]) -> Vec<String> {
    notifications
      .iter()
      .filter(|n| n.notification_type == NotificationType::Detox)
      .map(|n| n.scheduled_time.format("%H:%M").to_string())
      .collect()
  }

  #[test]
  fn test_hydration_split_across_window() {
    // Arrange: 2000 ml target, 500 ml reminders, 08:00-20:00
    let mut schedule = mock_schedule("user-1", "plan-1");
    schedule.nutrition_plan.hydration = HydrationPlan::with_target(2000);
    let profile = mock_profile("user-1");

    // Act
    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), at(monday(), 0, 1));

    // Assert
    assert_eq!(hydration_times(&notifications), vec!["08:00", "11:00", "14:00", "17:00"]);
    let first = notifications
      .iter()
      .find(|n| n.notification_type == NotificationType::Detox)
      .unwrap();
    assert_eq!(first.metadata.amount_ml, Some(500));
    assert!(!first.action_required);
    assert_eq!(first.priority, Priority::Medium);
  }

  #[test]
  fn test_nothing_at_or_before_now() {
    let schedule = mock_schedule("user-1", "plan-1");
    let profile = mock_profile("user-1");
    let now = at(monday(), 11, 0);

    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), now);

    assert!(!notifications.is_empty());
    assert!(notifications.iter().all(|n| n.scheduled_time > now && n.event_time > now));
    // 11:00 hydration is exactly now, so it is dropped
    assert_eq!(hydration_times(&notifications), vec!["14:00", "17:00"]);
  }

  #[test]
  fn test_lead_time_must_also_be_in_future() {
    // 07:00 workout with 30 min lead: at 06:45 the event is ahead but delivery is not
    let schedule = mock_schedule("user-1", "plan-1");
    let profile = mock_profile("user-1");

    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), at(monday(), 6, 45));

    assert!(!notifications.iter().any(|n| n.metadata.activity_id.as_deref() == Some("cardio")));
  }

  #[test]
  fn test_medication_is_high_priority_with_lead() {
    let schedule = mock_schedule("user-1", "plan-1");
    let mut profile = mock_profile("user-1");
    profile.medications = vec![Medication {
      name: "Metformin".into(),
      dosage: Some("500 mg".into()),
      time: Some("09:00".into()),
      instructions: Some("with food".into()),
    }];

    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), at(monday(), 0, 1));

    let med = notifications
      .iter()
      .find(|n| n.notification_type == NotificationType::Medication)
      .unwrap();
    assert_eq!(med.scheduled_time, at(monday(), 8, 45));
    assert_eq!(med.priority, Priority::High);
    assert!(med.action_required);
    assert_eq!(med.max_snoozes, 2);
    assert!(med.message.contains("500 mg, with food"));
  }

  #[test]
  fn test_activity_kinds_and_snooze_budget() {
    let schedule = mock_schedule("user-1", "plan-1");
    let profile = mock_profile("user-1");

    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), at(monday(), 0, 1));

    let workout = notifications
      .iter()
      .find(|n| n.metadata.activity_id.as_deref() == Some("cardio"))
      .unwrap();
    assert_eq!(workout.notification_type, NotificationType::Exercise);
    assert_eq!(workout.scheduled_time, at(monday(), 6, 30));
    assert!(workout.action_required);
    assert_eq!(workout.max_snoozes, 3);

    let breakfast = notifications.iter().find(|n| n.category == "breakfast").unwrap();
    assert!(!breakfast.action_required);
    assert_eq!(breakfast.scheduled_time, at(monday(), 6, 45));
  }

  #[test]
  fn test_settings_disable_category_and_override_lead() {
    let schedule = mock_schedule("user-1", "plan-1");
    let profile = mock_profile("user-1");
    let mut settings = NotificationSettings::default();
    settings.categories.detox = false;
    settings.lead_minutes.exercise = Some(5);

    let notifications = schedule_notifications(&schedule, &profile, &settings, at(monday(), 0, 1));

    assert!(hydration_times(&notifications).is_empty());
    let workout = notifications
      .iter()
      .find(|n| n.metadata.activity_id.as_deref() == Some("cardio"))
      .unwrap();
    assert_eq!(workout.scheduled_time, at(monday(), 6, 55));
  }

  #[test]
  fn test_dedupe_keys_stable_across_runs() {
    let schedule = mock_schedule("user-1", "plan-1");
    let profile = mock_profile("user-1");
    let now = at(monday(), 0, 1);

    let first: Vec<String> = schedule_notifications(&schedule, &profile, &Default::default(), now)
      .into_iter()
      .map(|n| n.dedupe_key)
      .collect();
    let second: Vec<String> = schedule_notifications(&schedule, &profile, &Default::default(), now)
      .into_iter()
      .map(|n| n.dedupe_key)
      .collect();

    assert_eq!(first, second);
    let unique: std::collections::HashSet<&String> = first.iter().collect();
    assert_eq!(unique.len(), first.len());
  }

  #[test]
  fn test_event_kind_classification() {
    let mut schedule = mock_schedule("user-1", "plan-1");
    let activity = &mut schedule.activities[0];
    activity.id = "x".into();
    activity.title = "Evening Journaling".into();
    assert_eq!(EventKind::for_activity(activity), EventKind::Journaling);

    activity.title = "Mystery".into();
    activity.category = ActivityCategory::Mindfulness;
    assert_eq!(EventKind::for_activity(activity), EventKind::Meditation);

    activity.title = "Morning Run".into();
    activity.category = ActivityCategory::Lifestyle;
    assert_eq!(EventKind::for_activity(activity), EventKind::Cardio);
    activity.title = "Cycling intervals".into();
    assert_eq!(EventKind::for_activity(activity), EventKind::Cardio);
  }

  #[test]
  fn test_keywords_inside_words_do_not_classify() {
    let mut schedule = mock_schedule("user-1", "plan-1");
    let activity = &mut schedule.activities[0];
    activity.id = "chores".into();
    activity.category = ActivityCategory::Lifestyle;

    for title in ["Brunch prep", "Prune the garden"] {
      activity.title = title.into();
      assert_eq!(EventKind::for_activity(activity), EventKind::Other, "{}", title);
    }

    activity.title = "Crunches".into();
    activity.category = ActivityCategory::Recovery;
    assert_eq!(EventKind::for_activity(activity), EventKind::Stretching);
  }

  #[test]
  fn test_oversized_hydration_target_is_capped() {
    let mut schedule = mock_schedule("user-1", "plan-1");
    schedule.nutrition_plan.hydration = HydrationPlan::with_target(1_000_000);
    let profile = mock_profile("user-1");

    let notifications = schedule_notifications(&schedule, &profile, &Default::default(), at(monday(), 0, 1));

    let times = hydration_times(&notifications);
    assert_eq!(times.len(), MAX_HYDRATION_REMINDERS as usize);
    let unique: std::collections::HashSet<&String> = times.iter().collect();
    assert_eq!(unique.len(), times.len());
    assert_eq!(times[1], "08:45");
  }
}
