//! Plan selection
//!
//! Additive, reproducible scoring. The highest score wins and the earliest
//! candidate wins ties.

use serde::{Deserialize, Serialize};

use crate::models::profile::Intensity;
use crate::models::{Difficulty, PlanCandidate, UserProfile};

const HEALTH_TIER_POINTS: u32 = 3;
const DURATION_POINTS: u32 = 2;
const INTENSITY_POINTS: u32 = 2;
const EQUIPMENT_POINTS: u32 = 2;
const FOCUS_POINTS: u32 = 1;

const NO_EQUIPMENT: [&str; 2] = ["no equipment needed", "none"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomizationPreferences {
  #[serde(default)]
  pub workout_intensity: Option<String>,
  /// `None` means the user did not declare equipment access at all
  #[serde(default)]
  pub equipment_access: Option<Vec<String>>,
}

/// Inputs the selector reads from a plan generation request
pub struct SelectionContext<'a> {
  pub profile: &'a UserProfile,
  pub health_score: f64,
  pub preferences: Option<&'a CustomizationPreferences>,
  pub selected_plan_type: Option<Difficulty>,
}

pub fn score_candidate(plan: &PlanCandidate, ctx: &SelectionContext<'_>) -> u32 {
  let mut score = 0;

  if plan.difficulty == Difficulty::for_health_score(ctx.health_score) {
    score += HEALTH_TIER_POINTS;
  }

  if plan.duration_weeks <= ctx.profile.timeline_preferences.duration_weeks {
    score += DURATION_POINTS;
  }

  // Request-time preference first, onboarding answer otherwise
  let intensity = ctx
    .preferences
    .and_then(|p| p.workout_intensity.as_deref())
    .and_then(Intensity::from_label)
    .or(ctx.profile.timeline_preferences.intensity_preference);
  if let Some(intensity) = intensity {
    if plan.difficulty == Difficulty::from_intensity(intensity) {
      score += INTENSITY_POINTS;
    }
  }

  if let Some(access) = ctx.preferences.and_then(|p| p.equipment_access.as_ref()) {
    let available: Vec<String> = access.iter().map(|a| a.trim().to_lowercase()).collect();
    let satisfied = plan.equipment_needed.iter().all(|item| {
      let item = item.trim().to_lowercase();
      NO_EQUIPMENT.contains(&item.as_str()) || available.contains(&item)
    });
    if satisfied {
      score += EQUIPMENT_POINTS;
    }
  }

  let goals: Vec<String> = ctx.profile.health_goals.iter().map(|g| g.to_lowercase()).collect();
  for area in &plan.focus_areas {
    let area = area.to_lowercase();
    if goals.iter().any(|g| g.contains(&area) || area.contains(g.as_str())) {
      score += FOCUS_POINTS;
    }
  }

  score
}

/// Pick the plan to follow. An explicit plan type wins when a candidate of that tier exists.
pub fn select_plan<'p>(plans: &'p [PlanCandidate], ctx: &SelectionContext<'_>) -> Option<&'p PlanCandidate> {
  if let Some(tier) = ctx.selected_plan_type {
    if let Some(plan) = plans.iter().find(|p| p.difficulty == tier) {
      return Some(plan);
    }
  }

  let mut best: Option<(&PlanCandidate, u32)> = None;
  for plan in plans {
    let score = score_candidate(plan, ctx);
    log::debug!("plan {} scored {}", plan.id, score);
    match best {
      Some((_, top)) if score <= top => {}
      _ => best = Some((plan, score)),
    }
  }
  best.map(|(plan, _)| plan)
}
