//! Plan Progress Tracking
//!
//! Per (user, plan) state advanced once per daily cycle:
//! - current week derived from the calendar, never moving backwards
//! - per-week completion built from per-day rates (re-recording a day replaces it)
//! - milestone achievements, at most one per milestone week
//! - adaptation history, at most one entry per (date, reason)
//!
//! Adaptation decisions are computed from the prior day's performance and
//! drive how the next schedule is built.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DayPerformance, Difficulty, PlanCandidate};

pub const ADAPT_COMPLETION_BELOW: f64 = 70.0;
pub const ADAPT_DIFFICULTY_ABOVE: f64 = 7.0;
pub const ADAPT_SATISFACTION_BELOW: f64 = 6.0;
pub const MILESTONE_COMPLETION: f64 = 80.0;
const LEVEL_DOWN_BELOW: f64 = 50.0;
const LEVEL_UP_ABOVE: f64 = 90.0;

pub const REASON_LOW_COMPLETION: &str = "Low completion rate - reducing difficulty";
pub const REASON_HIGH_DIFFICULTY: &str = "High difficulty rating - simplifying activities";
pub const REASON_LOW_SATISFACTION: &str = "Low satisfaction - adding variety and adjusting approach";
pub const REASON_OPTIMIZATION: &str = "Performance-based optimization";

// ---------------------------------------------------------------------------
/// Progress Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyCompletion {
    pub week: u32,
    pub completion_rate: f64,
    /// Completion per performance date within the week
    #[serde(default)]
    pub daily_rates: BTreeMap<NaiveDate, f64>,
}

impl WeeklyCompletion {
    fn recompute(&mut self) {
        self.completion_rate = mean(self.daily_rates.values().copied()).unwrap_or(0.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneAchievement {
    pub week: u32,
    pub milestone: String,
    pub achieved_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub date: NaiveDate,
    pub reason: String,
    pub change_applied: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextMilestone {
    pub week: u32,
    pub description: String,
    pub requirements: Vec<String>,
    pub estimated_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub user_id: String,
    pub plan_id: String,
    pub plan_start: NaiveDate,
    pub current_week: u32,
    pub total_weeks: u32,
    pub overall_completion_rate: f64,
    pub weekly_completion: Vec<WeeklyCompletion>,
    pub milestones_achieved: Vec<MilestoneAchievement>,
    pub adaptation_history: Vec<AdaptationRecord>,
    pub next_milestone: Option<NextMilestone>,
    pub last_updated: DateTime<Utc>,
}

impl PlanProgress {
    /// Fresh progress for a newly selected plan
    pub fn initial(plan: &PlanCandidate, user_id: &str, plan_start: NaiveDate) -> Self {
        let next_milestone = Some(next_milestone_for(plan, 1, plan_start).unwrap_or_else(|| NextMilestone {
            week: 1,
            description: "Start your journey".to_string(),
            requirements: vec!["Complete daily activities".to_string()],
            estimated_date: plan_start + Duration::days(7),
        }));

        Self {
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            plan_start,
            current_week: 1,
            total_weeks: plan.duration_weeks.max(1),
            overall_completion_rate: 0.0,
            weekly_completion: Vec::new(),
            milestones_achieved: Vec::new(),
            adaptation_history: Vec::new(),
            next_milestone,
            last_updated: Utc::now(),
        }
    }

    /// Calendar week of `date` within the plan, clamped to [1, total_weeks]
    pub fn week_of(&self, date: NaiveDate) -> u32 {
        let days = (date - self.plan_start).num_days().max(0);
        let week = (days / 7 + 1).min(i64::from(self.total_weeks));
        week.max(1) as u32
    }

    /// Fold one day's performance into the progress.
    ///
    /// `today` is the day being scheduled; `performance` describes the day
    /// before it. Returns the milestone newly achieved by this call, if any.
    pub fn record_day(
        &mut self,
        plan: &PlanCandidate,
        today: NaiveDate,
        performance: &DayPerformance,
        now: DateTime<Utc>,
    ) -> Option<MilestoneAchievement> {
        let performance = performance.clone().sanitized();
        let performance_date = today - Duration::days(1);

        // 1. Current week never moves backwards
        self.current_week = self.current_week.max(self.week_of(today)).clamp(1, self.total_weeks);
        let week = self.current_week;

        // 2. Upsert the week's record
        let idx = match self.weekly_completion.iter().position(|w| w.week == week) {
            Some(idx) => idx,
            None => {
                self.weekly_completion.push(WeeklyCompletion {
                    week,
                    completion_rate: 0.0,
                    daily_rates: BTreeMap::new(),
                });
                self.weekly_completion.sort_by_key(|w| w.week);
                self.weekly_completion
                    .iter()
                    .position(|w| w.week == week)
                    .unwrap_or(self.weekly_completion.len() - 1)
            }
        };
        let record = &mut self.weekly_completion[idx];
        record.daily_rates.insert(performance_date, performance.completion_rate);
        record.recompute();

        // 3. Overall is the mean of the weekly rates
        self.overall_completion_rate =
            mean(self.weekly_completion.iter().map(|w| w.completion_rate)).unwrap_or(0.0);

        // 4. Milestone, once per week
        let mut achieved = None;
        if performance.completion_rate >= MILESTONE_COMPLETION
            && !self.milestones_achieved.iter().any(|m| m.week == week)
        {
            if let Some(milestone) = plan.milestone_for_week(week) {
                let achievement = MilestoneAchievement {
                    week,
                    milestone: milestone.milestone.clone(),
                    achieved_at: now,
                    note: format!("Completed {:.0}% of activities", performance.completion_rate),
                };
                self.milestones_achieved.push(achievement.clone());
                achieved = Some(achievement);
            }
        }

        // 5. Next milestone, unchanged when the plan has none for that week
        let next_week = (week + 1).min(self.total_weeks);
        if let Some(next) = next_milestone_for(plan, next_week, self.plan_start) {
            self.next_milestone = Some(next);
        }

        self.last_updated = now;
        achieved
    }

    /// Append an adaptation unless the same (date, reason) is already recorded
    pub fn record_adaptation(&mut self, date: NaiveDate, reason: &str, change_applied: &str) -> bool {
        if self
            .adaptation_history
            .iter()
            .any(|a| a.date == date && a.reason == reason)
        {
            return false;
        }
        self.adaptation_history.push(AdaptationRecord {
            date,
            reason: reason.to_string(),
            change_applied: change_applied.to_string(),
        });
        true
    }
}

fn next_milestone_for(plan: &PlanCandidate, week: u32, plan_start: NaiveDate) -> Option<NextMilestone> {
    let milestone = plan.milestone_for_week(week)?;
    let requirements: Vec<String> = milestone
        .expected_outcome
        .split(", ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Some(NextMilestone {
        week,
        description: milestone.milestone.clone(),
        requirements: if requirements.is_empty() {
            vec!["Complete daily activities".to_string()]
        } else {
            requirements
        },
        estimated_date: plan_start + Duration::days(i64::from(week) * 7),
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

// ---------------------------------------------------------------------------
/// Adaptation Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationTrigger {
    LowCompletion,
    HighDifficulty,
    LowSatisfaction,
    Optimization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationDecision {
    pub needed: bool,
    pub trigger: AdaptationTrigger,
    pub reason: String,
    /// Level whose per-activity modifications apply to the next schedule
    pub level: Difficulty,
}

/// Decide whether tomorrow's schedule must adapt to today's performance
pub fn assess_adaptation(performance: &DayPerformance, base_level: Difficulty) -> AdaptationDecision {
    let p = performance.clone().sanitized();

    let low_completion = p.completion_rate < ADAPT_COMPLETION_BELOW;
    let high_difficulty = p.difficulty_rating.is_some_and(|d| d > ADAPT_DIFFICULTY_ABOVE);
    let low_satisfaction = p.satisfaction.is_some_and(|s| s < ADAPT_SATISFACTION_BELOW);

    let (trigger, reason) = if low_completion {
        (AdaptationTrigger::LowCompletion, REASON_LOW_COMPLETION)
    } else if high_difficulty {
        (AdaptationTrigger::HighDifficulty, REASON_HIGH_DIFFICULTY)
    } else if low_satisfaction {
        (AdaptationTrigger::LowSatisfaction, REASON_LOW_SATISFACTION)
    } else {
        (AdaptationTrigger::Optimization, REASON_OPTIMIZATION)
    };

    AdaptationDecision {
        needed: low_completion || high_difficulty || low_satisfaction,
        trigger,
        reason: reason.to_string(),
        level: adjust_level(base_level, p.completion_rate),
    }
}

/// Step the level down below 50% completion and up above 90%
pub fn adjust_level(level: Difficulty, completion_rate: f64) -> Difficulty {
    if completion_rate < LEVEL_DOWN_BELOW {
        match level {
            Difficulty::Advanced => Difficulty::Intermediate,
            _ => Difficulty::Beginner,
        }
    } else if completion_rate > LEVEL_UP_ABOVE {
        match level {
            Difficulty::Beginner => Difficulty::Intermediate,
            _ => Difficulty::Advanced,
        }
    } else {
        level
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
