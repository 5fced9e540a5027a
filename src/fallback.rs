//! Rule-based plan and schedule generation
//!
//! Used whenever the content generator is unconfigured, fails, or returns
//! something that does not validate. Everything here is table-driven and
//! deterministic: the same profile always yields the same three plans.

use chrono::{Datelike, NaiveDate, Utc};

use crate::models::plan::{
  ActivityCategory, ActivityIntensity, ActivityTemplate, AdaptationRules, DayTemplate, DayType,
  LevelModifications, MacroSplit, MealTiming, NutritionGuidelines, PlanCandidate, ProgressionMilestone,
  RecoveryProtocol, WeeklyStructure,
};
use crate::models::profile::{parse_clock, DayOfWeek, UserProfile};
use crate::models::schedule::{
  AppliedAdaptation, DailySchedule, HydrationPlan, Macros, Meal, MealType, NutritionPlan, ScheduleSource,
  ScheduledActivity,
};
use crate::models::Difficulty;
use crate::progress::{AdaptationDecision, AdaptationTrigger};

const DEFAULT_DAILY_CALORIES: u32 = 2000;
const BASE_HYDRATION_ML: u32 = 2000;
const EASED_DURATION_FACTOR: f64 = 0.8;
const MIN_ACTIVITY_MINUTES: u32 = 5;

/// ---------------------------------------------------------------------------
/// Tier Tables
/// ---------------------------------------------------------------------------

struct TierSpec {
  id: &'static str,
  title: &'static str,
  description: &'static str,
  difficulty: Difficulty,
  weeks: u32,
  focus: &'static [&'static str],
  equipment: &'static [&'static str],
  rest_days: &'static [DayOfWeek],
  recovery_day: DayOfWeek,
  workout_minutes: u32,
  intensity: ActivityIntensity,
  macros: MacroSplit,
  sleep_hours: f64,
  extra_hydration_ml: u32,
  snack: bool,
}

const TIERS: [TierSpec; 3] = [
  TierSpec {
    id: "beginner_wellness",
    title: "Foundation Wellness Plan",
    description: "Build consistent daily habits with gentle movement, regular meals and better sleep.",
    difficulty: Difficulty::Beginner,
    weeks: 4,
    focus: &["Basic Fitness", "Nutrition", "Sleep", "Stress Management"],
    equipment: &["No equipment needed"],
    rest_days: &[DayOfWeek::Wednesday, DayOfWeek::Sunday],
    recovery_day: DayOfWeek::Saturday,
    workout_minutes: 20,
    intensity: ActivityIntensity::Low,
    macros: MacroSplit { protein_pct: 25, carbs_pct: 50, fat_pct: 25 },
    sleep_hours: 8.0,
    extra_hydration_ml: 0,
    snack: false,
  },
  TierSpec {
    id: "intermediate_health",
    title: "Balanced Health Plan",
    description: "Combine strength and cardio work with structured nutrition and planned recovery.",
    difficulty: Difficulty::Intermediate,
    weeks: 8,
    focus: &["Strength Training", "Cardio", "Nutrition", "Recovery"],
    equipment: &["Basic home equipment"],
    rest_days: &[DayOfWeek::Sunday],
    recovery_day: DayOfWeek::Wednesday,
    workout_minutes: 35,
    intensity: ActivityIntensity::Moderate,
    macros: MacroSplit { protein_pct: 30, carbs_pct: 45, fat_pct: 25 },
    sleep_hours: 7.5,
    extra_hydration_ml: 0,
    snack: true,
  },
  TierSpec {
    id: "advanced_performance",
    title: "Peak Performance Plan",
    description: "High-volume training with precision nutrition and deliberate recovery for experienced users.",
    difficulty: Difficulty::Advanced,
    weeks: 12,
    focus: &["Advanced Training", "Precision Nutrition", "Recovery", "Performance"],
    equipment: &["Full gym access", "Advanced equipment"],
    rest_days: &[DayOfWeek::Sunday],
    recovery_day: DayOfWeek::Thursday,
    workout_minutes: 50,
    intensity: ActivityIntensity::High,
    macros: MacroSplit { protein_pct: 30, carbs_pct: 45, fat_pct: 25 },
    sleep_hours: 8.0,
    extra_hydration_ml: 500,
    snack: true,
  },
];

/// Workout days rotate through these sessions
const WORKOUT_ROTATION: [(&str, &str, &str); 3] = [
  ("cardio", "Cardio Session", "Cardio Foundations"),
  ("strength", "Strength Training", "Strength Building"),
  ("yoga", "Yoga Flow", "Mobility & Core"),
];

const MILESTONES: [&str; 6] = [
  "Establish your daily routine",
  "Complete every planned workout this week",
  "Hit your hydration goal five days in a row",
  "Increase workout consistency",
  "Improve sleep regularity",
  "Build sustainable habits",
];

/// ---------------------------------------------------------------------------
/// Plans
/// ---------------------------------------------------------------------------

/// Three complete plans, one per tier, in Beginner/Intermediate/Advanced order
pub fn fallback_plans(profile: &UserProfile) -> Vec<PlanCandidate> {
  let calories = profile.estimated_daily_calories().unwrap_or(DEFAULT_DAILY_CALORIES);
  TIERS.iter().map(|tier| build_plan(tier, profile, calories)).collect()
}

fn build_plan(tier: &TierSpec, profile: &UserProfile, calories: u32) -> PlanCandidate {
  let prefs = &profile.timeline_preferences;
  let rest_days: Vec<DayOfWeek> = if prefs.preferred_rest_days.is_empty() {
    tier.rest_days.to_vec()
  } else {
    prefs.preferred_rest_days.clone()
  };

  let mut rotation = 0usize;
  let mut template_for = |day: DayOfWeek| -> DayTemplate {
    if rest_days.contains(&day) {
      return rest_day(tier);
    }
    let is_workout = if prefs.preferred_workout_days.is_empty() {
      day != tier.recovery_day
    } else {
      prefs.preferred_workout_days.contains(&day)
    };
    if is_workout {
      let t = workout_day(tier, rotation);
      rotation += 1;
      t
    } else {
      active_recovery_day(tier)
    }
  };

  let weekly_structure = WeeklyStructure {
    monday: template_for(DayOfWeek::Monday),
    tuesday: template_for(DayOfWeek::Tuesday),
    wednesday: template_for(DayOfWeek::Wednesday),
    thursday: template_for(DayOfWeek::Thursday),
    friday: template_for(DayOfWeek::Friday),
    saturday: template_for(DayOfWeek::Saturday),
    sunday: template_for(DayOfWeek::Sunday),
  };

  let mut meal_timing = vec![
    MealTiming { meal: "Breakfast".into(), time: "07:00".into() },
    MealTiming { meal: "Lunch".into(), time: "12:00".into() },
    MealTiming { meal: "Dinner".into(), time: "18:00".into() },
  ];
  if tier.snack {
    meal_timing.insert(2, MealTiming { meal: "Snack".into(), time: "15:30".into() });
  }

  let progression_milestones = (1..=tier.weeks)
    .map(|week| ProgressionMilestone {
      week,
      milestone: if week == tier.weeks {
        format!("Complete the {}", tier.title)
      } else {
        MILESTONES[(week as usize - 1) % MILESTONES.len()].to_string()
      },
      expected_outcome: "Complete 80% of scheduled activities, Log daily meals".to_string(),
    })
    .collect();

  PlanCandidate {
    id: tier.id.to_string(),
    title: tier.title.to_string(),
    description: tier.description.to_string(),
    difficulty: tier.difficulty,
    duration_weeks: tier.weeks,
    focus_areas: tier.focus.iter().map(|s| s.to_string()).collect(),
    equipment_needed: tier.equipment.iter().map(|s| s.to_string()).collect(),
    weekly_structure,
    nutrition_guidelines: NutritionGuidelines {
      daily_calories: calories,
      macros: tier.macros,
      meal_timing,
      hydration_goal_ml: BASE_HYDRATION_ML + tier.extra_hydration_ml,
    },
    recovery_protocol: RecoveryProtocol {
      sleep_hours: tier.sleep_hours,
      rest_day_activities: vec!["Gentle walk".into(), "Stretching".into(), "Deep breathing".into()],
    },
    progression_milestones,
    adaptation_rules: AdaptationRules {
      underperforming: "Reduce session length by 20% and lower intensity one step".into(),
      overperforming: "Apply the next level's modification to main sessions".into(),
    },
  }
}

fn activity(
  id: &str,
  title: &str,
  category: ActivityCategory,
  time_slot: &str,
  duration_minutes: u32,
  intensity: ActivityIntensity,
) -> ActivityTemplate {
  ActivityTemplate {
    id: id.to_string(),
    title: title.to_string(),
    category,
    time_slot: time_slot.to_string(),
    duration_minutes,
    intensity,
    instructions: Vec::new(),
    equipment: Vec::new(),
    modifications: LevelModifications::default(),
    prerequisites: Vec::new(),
    alternatives: Vec::new(),
  }
}

fn workout_day(tier: &TierSpec, rotation: usize) -> DayTemplate {
  let (kind, title, theme) = WORKOUT_ROTATION[rotation % WORKOUT_ROTATION.len()];

  let mut main = activity(kind, title, ActivityCategory::Exercise, "07:00", tier.workout_minutes, tier.intensity);
  main.instructions = vec![
    "Warm up for 5 minutes".into(),
    format!("Keep effort {:?} throughout", tier.intensity).to_lowercase(),
    "Cool down and note how it felt".into(),
  ];
  main.equipment = tier.equipment.iter().map(|s| s.to_string()).collect();
  main.modifications = LevelModifications {
    beginner: Some("Shorter intervals with longer breaks".into()),
    intermediate: Some("Steady pace with one harder block".into()),
    advanced: Some("Add a final high-effort set".into()),
  };
  main.alternatives = match kind {
    "cardio" => vec!["Brisk walk".into(), "Cycling".into()],
    "strength" => vec!["Bodyweight circuit".into()],
    _ => vec!["Pilates".into()],
  };

  let stretch = activity(
    "stretching",
    "Stretching",
    ActivityCategory::Recovery,
    "18:30",
    if tier.difficulty == Difficulty::Beginner { 10 } else { 15 },
    ActivityIntensity::Low,
  );
  let meditate = activity("meditation", "Meditation", ActivityCategory::Mindfulness, "21:00", 10, ActivityIntensity::Low);

  DayTemplate {
    day_type: DayType::Workout,
    theme: theme.to_string(),
    activities: vec![main, stretch, meditate],
    nutrition_focus: "Protein with every meal".to_string(),
    recovery_emphasis: "Stretch the muscles you worked".to_string(),
  }
}

fn rest_day(tier: &TierSpec) -> DayTemplate {
  let mut walk = activity("gentle-walk", "Gentle Walk", ActivityCategory::Recovery, "10:00", 20, ActivityIntensity::Low);
  walk.alternatives = vec!["Light stretching".into()];
  let breathe = activity(
    "deep-breathing",
    "Deep Breathing",
    ActivityCategory::Mindfulness,
    "21:00",
    if tier.difficulty == Difficulty::Beginner { 5 } else { 10 },
    ActivityIntensity::Low,
  );

  DayTemplate {
    day_type: DayType::Rest,
    theme: "Rest & Restore".to_string(),
    activities: vec![walk, breathe],
    nutrition_focus: "Hydration and whole foods".to_string(),
    recovery_emphasis: "Full rest".to_string(),
  }
}

fn active_recovery_day(tier: &TierSpec) -> DayTemplate {
  let yoga = activity(
    "recovery-yoga",
    "Yoga Flow",
    ActivityCategory::Recovery,
    "08:00",
    tier.workout_minutes.min(30),
    ActivityIntensity::Low,
  );
  let journal = activity("journaling", "Journaling", ActivityCategory::Lifestyle, "21:00", 10, ActivityIntensity::Low);

  DayTemplate {
    day_type: DayType::ActiveRecovery,
    theme: "Active Recovery".to_string(),
    activities: vec![yoga, journal],
    nutrition_focus: "Anti-inflammatory foods".to_string(),
    recovery_emphasis: "Mobility and light movement".to_string(),
  }
}

/// ---------------------------------------------------------------------------
/// Day Instantiation
/// ---------------------------------------------------------------------------

/// Instantiate the plan's template for `date`, applying an adaptation when one is due
pub fn instantiate_day(
  plan: &PlanCandidate,
  profile: &UserProfile,
  date: NaiveDate,
  decision: Option<&AdaptationDecision>,
) -> DailySchedule {
  let day = DayOfWeek::from(date.weekday());
  let template = plan.weekly_structure.day(day);
  let trigger = decision.filter(|d| d.needed).map(|d| d.trigger);
  let level = decision.map(|d| d.level).unwrap_or(plan.difficulty);

  let activities = template
    .activities
    .iter()
    .map(|t| {
      let mut scheduled = ScheduledActivity {
        id: t.id.clone(),
        title: t.title.clone(),
        category: t.category,
        time: t.time_slot.clone(),
        duration_minutes: t.duration_minutes,
        intensity: t.intensity,
        instructions: t.instructions.clone(),
        equipment: t.equipment.clone(),
        status: Default::default(),
        actual_duration_minutes: None,
        difficulty_rating: None,
        satisfaction: None,
        notes: None,
      };

      match trigger {
        Some(AdaptationTrigger::LowCompletion) | Some(AdaptationTrigger::HighDifficulty) => {
          scheduled.duration_minutes = eased_minutes(t.duration_minutes);
          scheduled.intensity = t.intensity.step_down();
        }
        Some(AdaptationTrigger::LowSatisfaction) => {
          if let Some(alt) = t.alternatives.first() {
            scheduled.title = alt.clone();
          }
        }
        _ => {}
      }

      if let Some(m) = t.modifications.for_level(level) {
        scheduled.instructions.push(format!("Modification: {}", m));
      }
      scheduled
    })
    .collect();

  let adaptation = decision.filter(|d| d.needed).map(|d| AppliedAdaptation {
    reason: d.reason.clone(),
    change: match d.trigger {
      AdaptationTrigger::LowSatisfaction => "Swapped activities for their alternatives".to_string(),
      _ => plan.adaptation_rules.underperforming.clone(),
    },
  });

  let mut recovery_focus = vec![
    template.recovery_emphasis.clone(),
    format!("Aim for {} hours of sleep", plan.recovery_protocol.sleep_hours),
  ];
  if template.day_type == DayType::Rest {
    recovery_focus.extend(plan.recovery_protocol.rest_day_activities.iter().cloned());
  }
  recovery_focus.retain(|s| !s.is_empty());

  DailySchedule {
    id: schedule_id(&profile.id, &plan.id, date),
    user_id: profile.id.clone(),
    plan_id: plan.id.clone(),
    date,
    day_of_week: day,
    day_type: template.day_type,
    theme: template.theme.clone(),
    activities,
    nutrition_plan: nutrition_for(plan, profile),
    recovery_focus,
    adaptation,
    source: ScheduleSource::Fallback,
    created_at: Utc::now(),
  }
}

/// Stable per (user, plan, date) so regeneration replaces rather than duplicates
pub fn schedule_id(user_id: &str, plan_id: &str, date: NaiveDate) -> String {
  format!("{}:{}:{}", user_id, plan_id, date)
}

fn eased_minutes(minutes: u32) -> u32 {
  ((f64::from(minutes) * EASED_DURATION_FACTOR).round() as u32).max(MIN_ACTIVITY_MINUTES)
}

fn is_plant_based(profile: &UserProfile) -> bool {
  profile
    .dietary_restrictions
    .iter()
    .chain(profile.diet_type.iter())
    .any(|d| {
      let d = d.to_lowercase();
      d.contains("vegan") || d.contains("vegetarian")
    })
}

fn meal_share(meal_type: MealType, has_snack: bool) -> f64 {
  match (meal_type, has_snack) {
    (MealType::Breakfast, _) => 0.25,
    (MealType::Lunch, _) => 0.35,
    (MealType::Dinner, true) => 0.30,
    (MealType::Dinner, false) => 0.40,
    (MealType::Snack, _) => 0.10,
  }
}

fn meal_menu(meal_type: MealType, plant_based: bool) -> (&'static str, &'static [&'static str]) {
  match (meal_type, plant_based) {
    (MealType::Breakfast, _) => ("Oatmeal with berries", &["rolled oats", "mixed berries", "chia seeds"]),
    (MealType::Lunch, false) => ("Grilled chicken salad", &["chicken breast", "leafy greens", "olive oil"]),
    (MealType::Lunch, true) => ("Chickpea quinoa bowl", &["chickpeas", "quinoa", "roasted vegetables"]),
    (MealType::Dinner, false) => ("Baked salmon with vegetables", &["salmon", "broccoli", "sweet potato"]),
    (MealType::Dinner, true) => ("Tofu stir-fry", &["tofu", "brown rice", "mixed vegetables"]),
    (MealType::Snack, _) => ("Apple with almond butter", &["apple", "almond butter"]),
  }
}

fn nutrition_for(plan: &PlanCandidate, profile: &UserProfile) -> NutritionPlan {
  let guidelines = &plan.nutrition_guidelines;
  let plant_based = is_plant_based(profile);

  let mut timing: Vec<(MealType, String)> = guidelines
    .meal_timing
    .iter()
    .filter(|m| parse_clock(&m.time).is_some())
    .map(|m| (MealType::from_label(&m.meal), m.time.clone()))
    .collect();
  if timing.is_empty() {
    timing = vec![
      (MealType::Breakfast, "07:00".to_string()),
      (MealType::Lunch, "12:00".to_string()),
      (MealType::Dinner, "18:00".to_string()),
    ];
  }
  let has_snack = timing.iter().any(|(t, _)| *t == MealType::Snack);

  let meals = timing
    .into_iter()
    .map(|(meal_type, time)| {
      let calories = (f64::from(guidelines.daily_calories) * meal_share(meal_type, has_snack)).round() as u32;
      let (name, ingredients) = meal_menu(meal_type, plant_based);
      Meal {
        meal_type,
        name: name.to_string(),
        time,
        calories,
        macros: Macros {
          protein_g: calories * guidelines.macros.protein_pct / 100 / 4,
          carbs_g: calories * guidelines.macros.carbs_pct / 100 / 4,
          fat_g: calories * guidelines.macros.fat_pct / 100 / 9,
        },
        ingredients: ingredients
          .iter()
          .filter(|i| !profile.allergies.iter().any(|a| i.contains(&a.to_lowercase())))
          .map(|i| i.to_string())
          .collect(),
      }
    })
    .collect();

  NutritionPlan {
    daily_calories: guidelines.daily_calories,
    meals,
    hydration: HydrationPlan::with_target(guidelines.hydration_goal_ml),
  }
}
