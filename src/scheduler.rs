//! Midnight regeneration of daily schedules.
//!
//! Once per local day, shortly after midnight, every registered user gets a
//! schedule for the new day built from how the previous day went. A user whose
//! `last_update` already equals today is skipped, so the pass is safe to rerun.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::db::PlanStore;
use crate::error::EngineError;
use crate::fallback::{instantiate_day, schedule_id};
use crate::llm::{ContentGenerator, GenerationOutcome, SchedulePrompt};
use crate::models::{DailySchedule, DayPerformance};
use crate::notifications::schedule_notifications;
use crate::progress::{assess_adaptation, PlanProgress};
use crate::registry::{PlanRegistry, RegisteredPlan};

/// ---------------------------------------------------------------------------
/// Performance Source
/// ---------------------------------------------------------------------------

/// Where the previous day's performance comes from
#[async_trait]
pub trait PerformanceSource: Send + Sync {
  async fn performance(&self, user_id: &str, plan_id: &str, date: NaiveDate) -> Result<DayPerformance, EngineError>;
}

/// Derives performance from the stored schedule's activity statuses
pub struct StoredPerformance {
  store: Arc<dyn PlanStore>,
}

impl StoredPerformance {
  pub fn new(store: Arc<dyn PlanStore>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl PerformanceSource for StoredPerformance {
  async fn performance(&self, user_id: &str, plan_id: &str, date: NaiveDate) -> Result<DayPerformance, EngineError> {
    Ok(
      self
        .store
        .load_schedule(user_id, plan_id, date)
        .await?
        .map(|s| s.performance())
        .unwrap_or_else(DayPerformance::missing),
    )
  }
}

/// ---------------------------------------------------------------------------
/// Scheduler
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
  Updated { adapted: bool, notifications: usize },
  Skipped,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchedulerStatus {
  pub is_running: bool,
  pub registered_users: usize,
  pub last_check: Option<NaiveDateTime>,
  pub next_check: NaiveDateTime,
}

struct Runner {
  shutdown: watch::Sender<bool>,
  handle: JoinHandle<()>,
}

/// Removes the user from the in-flight set when the update finishes
struct InFlight<'a> {
  set: &'a StdMutex<HashSet<String>>,
  user_id: String,
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.set.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.user_id);
  }
}

pub struct MidnightScheduler {
  registry: Arc<dyn PlanRegistry>,
  store: Arc<dyn PlanStore>,
  generator: Arc<dyn ContentGenerator>,
  performance: Arc<dyn PerformanceSource>,
  config: SchedulerConfig,
  in_flight: StdMutex<HashSet<String>>,
  last_check: RwLock<Option<NaiveDateTime>>,
  runner: Mutex<Option<Runner>>,
}

impl MidnightScheduler {
  pub fn new(
    registry: Arc<dyn PlanRegistry>,
    store: Arc<dyn PlanStore>,
    generator: Arc<dyn ContentGenerator>,
    performance: Arc<dyn PerformanceSource>,
    config: SchedulerConfig,
  ) -> Self {
    Self {
      registry,
      store,
      generator,
      performance,
      config,
      in_flight: StdMutex::new(HashSet::new()),
      last_check: RwLock::new(None),
      runner: Mutex::new(None),
    }
  }

  pub fn in_midnight_window(&self, now: NaiveDateTime) -> bool {
    now.hour() == 0 && now.minute() < self.config.window_minutes
  }

  pub async fn start(self: &Arc<Self>) {
    let mut runner = self.runner.lock().await;
    if runner.is_some() {
      return;
    }

    let (shutdown, mut stopped) = watch::channel(false);
    let this = Arc::clone(self);
    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval(this.config.poll_interval);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = interval.tick() => {
            this.tick(Local::now().naive_local()).await;
          }
          _ = stopped.changed() => break,
        }
      }
    });

    log::info!(
      "Midnight scheduler started (poll {:?}, window {} min)",
      self.config.poll_interval,
      self.config.window_minutes
    );
    *runner = Some(Runner { shutdown, handle });
  }

  pub async fn stop(&self) {
    if let Some(runner) = self.runner.lock().await.take() {
      let _ = runner.shutdown.send(true);
      if let Err(e) = runner.handle.await {
        log::error!("scheduler task ended abnormally: {}", e);
      }
      log::info!("Midnight scheduler stopped");
    }
  }

  /// One poll: runs the daily pass when `now` falls in the midnight window.
  /// Returns how many users were updated.
  pub async fn tick(self: &Arc<Self>, now: NaiveDateTime) -> usize {
    *self.last_check.write().await = Some(now);
    if !self.in_midnight_window(now) {
      return 0;
    }
    self.run_window(now.date(), now).await
  }

  /// Update every registered user whose schedule for `today` is not yet produced.
  /// One user's failure never stops the others.
  pub async fn run_window(self: &Arc<Self>, today: NaiveDate, now: NaiveDateTime) -> usize {
    let entries = match self.registry.list().await {
      Ok(entries) => entries,
      Err(e) => {
        log::error!("could not list registered plans: {}", e);
        return 0;
      }
    };

    let mut tasks = JoinSet::new();
    for entry in entries {
      if entry.last_update == Some(today) {
        continue;
      }
      let this = Arc::clone(self);
      tasks.spawn(async move {
        let user_id = entry.user_id.clone();
        (user_id, this.update_user(entry, today, now).await)
      });
    }

    let mut updated = 0;
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((user_id, Ok(UpdateOutcome::Updated { adapted, notifications }))) => {
          log::info!(
            "daily schedule for {} on {} ready (adapted: {}, {} notifications)",
            user_id,
            today,
            adapted,
            notifications
          );
          updated += 1;
        }
        Ok((_, Ok(UpdateOutcome::Skipped))) => {}
        Ok((user_id, Err(e))) => log::error!("daily update for {} failed: {}", user_id, e),
        Err(e) => log::error!("daily update task panicked: {}", e),
      }
    }

    if updated > 0 {
      log::info!("midnight pass for {}: {} users updated", today, updated);
    }
    updated
  }

  /// Build, persist and schedule reminders for one user's `today`
  pub async fn update_user(
    &self,
    entry: RegisteredPlan,
    today: NaiveDate,
    now: NaiveDateTime,
  ) -> Result<UpdateOutcome, EngineError> {
    let _guard = {
      let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
      if !set.insert(entry.user_id.clone()) {
        return Ok(UpdateOutcome::Skipped);
      }
      InFlight {
        set: &self.in_flight,
        user_id: entry.user_id.clone(),
      }
    };

    let RegisteredPlan { user_id, plan, profile, .. } = entry;
    let yesterday = today - Duration::days(1);

    // 1. Previous day's performance; no data counts as nothing completed
    let performance = match self.performance.performance(&user_id, &plan.id, yesterday).await {
      Ok(p) => p,
      Err(e) => {
        log::warn!("no performance for {} on {}: {}", user_id, yesterday, e);
        DayPerformance::missing()
      }
    };
    let decision = assess_adaptation(&performance, plan.difficulty);

    // 2. Today's schedule, generated or from the plan template
    let prompt = SchedulePrompt {
      plan: &plan,
      profile: &profile,
      date: today,
      previous_day: Some(&performance),
      adaptation: Some(&decision),
    };
    let mut schedule = build_schedule(self.generator.as_ref(), &prompt).await;
    match self.store.load_schedule(&user_id, &plan.id, today).await {
      Ok(Some(existing)) => schedule.carry_over_progress(&existing),
      Ok(None) => {}
      Err(e) => log::warn!("could not read existing schedule for {} on {}: {}", user_id, today, e),
    }
    if let Err(e) = self.store.save_schedule(&schedule).await {
      log::error!("failed to save schedule for {} on {}: {}", user_id, today, e);
    }

    // 3. Progress
    let mut progress = match self.store.load_progress(&user_id, &plan.id).await {
      Ok(Some(progress)) => progress,
      Ok(None) => PlanProgress::initial(&plan, &user_id, profile.plan_start(today)),
      Err(e) => {
        log::warn!("progress for {} unreadable, starting fresh: {}", user_id, e);
        PlanProgress::initial(&plan, &user_id, profile.plan_start(today))
      }
    };
    if let Some(milestone) = progress.record_day(&plan, today, &performance, Utc::now()) {
      log::info!("{} reached week {} milestone: {}", user_id, milestone.week, milestone.milestone);
    }
    if decision.needed {
      let change = schedule
        .adaptation
        .as_ref()
        .map(|a| a.change.clone())
        .unwrap_or_else(|| plan.adaptation_rules.underperforming.clone());
      progress.record_adaptation(today, &decision.reason, &change);
    }
    if let Err(e) = self.store.save_progress(&progress).await {
      log::error!("failed to save progress for {}: {}", user_id, e);
    }

    // 4. Reminders
    let settings = self.store.load_settings(&user_id).await.unwrap_or_else(|e| {
      log::warn!("using default notification settings for {}: {}", user_id, e);
      Default::default()
    });
    let notifications = schedule_notifications(&schedule, &profile, &settings, now);
    let inserted = match self.store.save_notifications(&notifications).await {
      Ok(n) => n,
      Err(e) => {
        log::error!("failed to save notifications for {}: {}", user_id, e);
        0
      }
    };

    self.registry.mark_updated(&user_id, today).await?;

    Ok(UpdateOutcome::Updated {
      adapted: decision.needed,
      notifications: inserted,
    })
  }

  /// Regenerate today's schedule for one user outside the midnight window
  pub async fn force_update(&self, user_id: &str, now: NaiveDateTime) -> Result<UpdateOutcome, EngineError> {
    let entry = self
      .registry
      .get(user_id)
      .await?
      .ok_or_else(|| EngineError::NotFound(format!("registered user {}", user_id)))?;

    match self.update_user(entry, now.date(), now).await? {
      UpdateOutcome::Skipped => Err(EngineError::InvalidTransition(format!(
        "an update for {} is already running",
        user_id
      ))),
      outcome => Ok(outcome),
    }
  }

  pub async fn status(&self) -> SchedulerStatus {
    let now = Local::now().naive_local();
    let registered_users = match self.registry.list().await {
      Ok(entries) => entries.len(),
      Err(e) => {
        log::warn!("could not count registered plans: {}", e);
        0
      }
    };

    SchedulerStatus {
      is_running: self.runner.lock().await.is_some(),
      registered_users,
      last_check: *self.last_check.read().await,
      next_check: next_midnight(now),
    }
  }
}

/// Generated schedule for the prompt's day, or the plan template when generation fails
pub async fn build_schedule(generator: &dyn ContentGenerator, prompt: &SchedulePrompt<'_>) -> DailySchedule {
  match generator.generate_schedule(prompt).await {
    GenerationOutcome::Generated(mut generated) if generated.date == prompt.date => {
      generated.user_id = prompt.profile.id.clone();
      generated.plan_id = prompt.plan.id.clone();
      generated.id = schedule_id(&prompt.profile.id, &prompt.plan.id, prompt.date);
      generated
    }
    outcome => {
      if let GenerationOutcome::Failed { reason } = outcome {
        log::warn!("schedule generation for {} failed, using plan template: {}", prompt.profile.id, reason);
      }
      instantiate_day(prompt.plan, prompt.profile, prompt.date, prompt.adaptation)
    }
  }
}

fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
  (now.date() + Duration::days(1)).and_time(NaiveTime::MIN)
}
