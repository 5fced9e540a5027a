use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::EngineError;
use crate::models::{
  DailySchedule, HealthNotification, NotificationSettings, NotificationStatus, PlanCandidate,
};
use crate::progress::PlanProgress;
use crate::registry::{PlanRegistry, RegisteredPlan};

pub type DbPool = SqlitePool;

/// Sortable text form used for notification times
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn time_text(t: NaiveDateTime) -> String {
  t.format(TIME_FORMAT).to_string()
}

/// Initialize the database connection pool and run migrations
pub async fn initialize_db(database_url: &str) -> Result<DbPool, EngineError> {
  log::info!("Initializing database at: {}", database_url);

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .map_err(|e| EngineError::Persistence(format!("migration failed: {}", e)))?;

  log::info!("Database initialized successfully");

  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// Store Contract
/// ---------------------------------------------------------------------------

/// Persistence for plans, schedules, progress and notifications.
/// Keyed by (user_id, plan_id, date) where a date applies.
#[async_trait]
pub trait PlanStore: Send + Sync {
  async fn save_plans(&self, user_id: &str, plans: &[PlanCandidate]) -> Result<(), EngineError>;

  /// Insert or replace the schedule for its (user, plan, date)
  async fn save_schedule(&self, schedule: &DailySchedule) -> Result<(), EngineError>;

  async fn load_schedule(
    &self,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
  ) -> Result<Option<DailySchedule>, EngineError>;

  async fn save_progress(&self, progress: &PlanProgress) -> Result<(), EngineError>;

  async fn load_progress(&self, user_id: &str, plan_id: &str) -> Result<Option<PlanProgress>, EngineError>;

  /// Inserts new notifications, ignoring any whose (user, plan, dedupe key) already exists.
  /// Returns how many were inserted.
  async fn save_notifications(&self, notifications: &[HealthNotification]) -> Result<usize, EngineError>;

  /// Write `notification` only if the stored row is still in `expected` state.
  /// A row that moved on in the meantime yields `InvalidTransition`.
  async fn update_notification(
    &self,
    notification: &HealthNotification,
    expected: NotificationStatus,
  ) -> Result<(), EngineError>;

  async fn load_notification(&self, id: &str) -> Result<Option<HealthNotification>, EngineError>;

  /// Pending or snoozed notifications scheduled at or before `now`
  async fn due_notifications(&self, now: NaiveDateTime) -> Result<Vec<HealthNotification>, EngineError>;

  /// Open notifications whose event time is before `cutoff`
  async fn stale_notifications(&self, cutoff: NaiveDateTime) -> Result<Vec<HealthNotification>, EngineError>;

  async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<HealthNotification>, EngineError>;

  /// Stored settings, or defaults when the user never saved any
  async fn load_settings(&self, user_id: &str) -> Result<NotificationSettings, EngineError>;

  async fn save_settings(&self, user_id: &str, settings: &NotificationSettings) -> Result<(), EngineError>;
}

/// ---------------------------------------------------------------------------
/// SQLite Store
/// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteStore {
  pool: DbPool,
}

impl SqliteStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  fn notifications_from_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<HealthNotification>, EngineError> {
    rows
      .iter()
      .map(|row| -> Result<HealthNotification, EngineError> {
        let data: String = row.get("data_json");
        Ok(serde_json::from_str(&data)?)
      })
      .collect()
  }
}

#[async_trait]
impl PlanStore for SqliteStore {
  async fn save_plans(&self, user_id: &str, plans: &[PlanCandidate]) -> Result<(), EngineError> {
    let now = Utc::now().to_rfc3339();
    for plan in plans {
      sqlx::query(
        r#"
        INSERT INTO plans (user_id, id, difficulty, data_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(user_id, id) DO UPDATE SET
          difficulty = excluded.difficulty,
          data_json = excluded.data_json
        "#,
      )
      .bind(user_id)
      .bind(&plan.id)
      .bind(plan.difficulty.to_string())
      .bind(serde_json::to_string(plan)?)
      .bind(&now)
      .execute(&self.pool)
      .await?;
    }
    Ok(())
  }

  async fn save_schedule(&self, schedule: &DailySchedule) -> Result<(), EngineError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
      r#"
      INSERT INTO daily_schedules (id, user_id, plan_id, date, source, data_json, created_at, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
      ON CONFLICT(user_id, plan_id, date) DO UPDATE SET
        source = excluded.source,
        data_json = excluded.data_json,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(&schedule.id)
    .bind(&schedule.user_id)
    .bind(&schedule.plan_id)
    .bind(schedule.date.to_string())
    .bind(schedule.source.to_string())
    .bind(serde_json::to_string(schedule)?)
    .bind(&now)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn load_schedule(
    &self,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
  ) -> Result<Option<DailySchedule>, EngineError> {
    let row = sqlx::query(
      "SELECT data_json FROM daily_schedules WHERE user_id = ?1 AND plan_id = ?2 AND date = ?3",
    )
    .bind(user_id)
    .bind(plan_id)
    .bind(date.to_string())
    .fetch_optional(&self.pool)
    .await?;

    match row {
      Some(row) => {
        let data: String = row.get("data_json");
        Ok(Some(serde_json::from_str(&data)?))
      }
      None => Ok(None),
    }
  }

  async fn save_progress(&self, progress: &PlanProgress) -> Result<(), EngineError> {
    sqlx::query(
      r#"
      INSERT INTO plan_progress (
        user_id, plan_id, current_week, total_weeks, overall_completion_rate, data_json, updated_at
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      ON CONFLICT(user_id, plan_id) DO UPDATE SET
        current_week = excluded.current_week,
        total_weeks = excluded.total_weeks,
        overall_completion_rate = excluded.overall_completion_rate,
        data_json = excluded.data_json,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(&progress.user_id)
    .bind(&progress.plan_id)
    .bind(progress.current_week)
    .bind(progress.total_weeks)
    .bind(progress.overall_completion_rate)
    .bind(serde_json::to_string(progress)?)
    .bind(Utc::now().to_rfc3339())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn load_progress(&self, user_id: &str, plan_id: &str) -> Result<Option<PlanProgress>, EngineError> {
    let row = sqlx::query("SELECT data_json FROM plan_progress WHERE user_id = ?1 AND plan_id = ?2")
      .bind(user_id)
      .bind(plan_id)
      .fetch_optional(&self.pool)
      .await?;

    match row {
      Some(row) => {
        let data: String = row.get("data_json");
        Ok(Some(serde_json::from_str(&data)?))
      }
      None => Ok(None),
    }
  }

  async fn save_notifications(&self, notifications: &[HealthNotification]) -> Result<usize, EngineError> {
    let now = Utc::now().to_rfc3339();
    let mut inserted = 0usize;
    for n in notifications {
      let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO health_notifications (
          id, user_id, plan_id, dedupe_key, notification_type, status,
          scheduled_time, event_time, snooze_count, max_snoozes, data_json,
          created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
        "#,
      )
      .bind(&n.id)
      .bind(&n.user_id)
      .bind(&n.plan_id)
      .bind(&n.dedupe_key)
      .bind(n.notification_type.to_string())
      .bind(n.status.to_string())
      .bind(time_text(n.scheduled_time))
      .bind(time_text(n.event_time))
      .bind(n.snooze_count)
      .bind(n.max_snoozes)
      .bind(serde_json::to_string(n)?)
      .bind(&now)
      .execute(&self.pool)
      .await?;
      inserted += result.rows_affected() as usize;
    }
    Ok(inserted)
  }

  async fn update_notification(&self, n: &HealthNotification, expected: NotificationStatus) -> Result<(), EngineError> {
    let result = sqlx::query(
      r#"
      UPDATE health_notifications
      SET status = ?1,
          scheduled_time = ?2,
          snooze_count = ?3,
          data_json = ?4,
          updated_at = ?5
      WHERE id = ?6 AND status = ?7
      "#,
    )
    .bind(n.status.to_string())
    .bind(time_text(n.scheduled_time))
    .bind(n.snooze_count)
    .bind(serde_json::to_string(n)?)
    .bind(Utc::now().to_rfc3339())
    .bind(&n.id)
    .bind(expected.to_string())
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return match self.load_notification(&n.id).await? {
        Some(current) => Err(EngineError::InvalidTransition(format!(
          "notification {} is {}, expected {}",
          n.id, current.status, expected
        ))),
        None => Err(EngineError::NotFound(format!("notification {}", n.id))),
      };
    }
    Ok(())
  }

  async fn load_notification(&self, id: &str) -> Result<Option<HealthNotification>, EngineError> {
    let row = sqlx::query("SELECT data_json FROM health_notifications WHERE id = ?1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;

    match row {
      Some(row) => {
        let data: String = row.get("data_json");
        Ok(Some(serde_json::from_str(&data)?))
      }
      None => Ok(None),
    }
  }

  async fn due_notifications(&self, now: NaiveDateTime) -> Result<Vec<HealthNotification>, EngineError> {
    let rows = sqlx::query(
      r#"
      SELECT data_json FROM health_notifications
      WHERE status IN (?1, ?2) AND scheduled_time <= ?3
      ORDER BY scheduled_time
      "#,
    )
    .bind(NotificationStatus::Pending.to_string())
    .bind(NotificationStatus::Snoozed.to_string())
    .bind(time_text(now))
    .fetch_all(&self.pool)
    .await?;

    Self::notifications_from_rows(rows)
  }

  async fn stale_notifications(&self, cutoff: NaiveDateTime) -> Result<Vec<HealthNotification>, EngineError> {
    let rows = sqlx::query(
      r#"
      SELECT data_json FROM health_notifications
      WHERE status IN (?1, ?2, ?3) AND event_time < ?4 AND scheduled_time < ?4
      ORDER BY event_time
      "#,
    )
    .bind(NotificationStatus::Pending.to_string())
    .bind(NotificationStatus::Sent.to_string())
    .bind(NotificationStatus::Snoozed.to_string())
    .bind(time_text(cutoff))
    .fetch_all(&self.pool)
    .await?;

    Self::notifications_from_rows(rows)
  }

  async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<HealthNotification>, EngineError> {
    let rows = sqlx::query(
      "SELECT data_json FROM health_notifications WHERE user_id = ?1 ORDER BY scheduled_time",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;

    Self::notifications_from_rows(rows)
  }

  async fn load_settings(&self, user_id: &str) -> Result<NotificationSettings, EngineError> {
    let row = sqlx::query("SELECT data_json FROM notification_settings WHERE user_id = ?1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await?;

    match row {
      Some(row) => {
        let data: String = row.get("data_json");
        Ok(serde_json::from_str(&data)?)
      }
      None => Ok(NotificationSettings::default()),
    }
  }

  async fn save_settings(&self, user_id: &str, settings: &NotificationSettings) -> Result<(), EngineError> {
    sqlx::query(
      r#"
      INSERT INTO notification_settings (user_id, data_json, updated_at)
      VALUES (?1, ?2, ?3)
      ON CONFLICT(user_id) DO UPDATE SET
        data_json = excluded.data_json,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(user_id)
    .bind(serde_json::to_string(settings)?)
    .bind(Utc::now().to_rfc3339())
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

#[async_trait]
impl PlanRegistry for SqliteStore {
  async fn register(&self, entry: RegisteredPlan) -> Result<(), EngineError> {
    sqlx::query(
      r#"
      INSERT INTO registered_plans (user_id, plan_id, data_json, last_update, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5)
      ON CONFLICT(user_id) DO UPDATE SET
        plan_id = excluded.plan_id,
        data_json = excluded.data_json,
        last_update = excluded.last_update,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(&entry.user_id)
    .bind(&entry.plan.id)
    .bind(serde_json::to_string(&entry)?)
    .bind(entry.last_update.map(|d| d.to_string()))
    .bind(Utc::now().to_rfc3339())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn unregister(&self, user_id: &str) -> Result<bool, EngineError> {
    let result = sqlx::query("DELETE FROM registered_plans WHERE user_id = ?1")
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn get(&self, user_id: &str) -> Result<Option<RegisteredPlan>, EngineError> {
    let row = sqlx::query("SELECT data_json, last_update FROM registered_plans WHERE user_id = ?1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await?;

    row.map(|r| registered_from_row(&r)).transpose()
  }

  async fn list(&self) -> Result<Vec<RegisteredPlan>, EngineError> {
    let rows = sqlx::query("SELECT data_json, last_update FROM registered_plans ORDER BY user_id")
      .fetch_all(&self.pool)
      .await?;

    rows.iter().map(registered_from_row).collect()
  }

  async fn mark_updated(&self, user_id: &str, date: NaiveDate) -> Result<(), EngineError> {
    let result = sqlx::query("UPDATE registered_plans SET last_update = ?1, updated_at = ?2 WHERE user_id = ?3")
      .bind(date.to_string())
      .bind(Utc::now().to_rfc3339())
      .bind(user_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(EngineError::NotFound(format!("registered user {}", user_id)));
    }
    Ok(())
  }
}

/// `last_update` column is authoritative; the JSON copy is only refreshed on register
fn registered_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RegisteredPlan, EngineError> {
  let data: String = row.get("data_json");
  let last_update: Option<String> = row.get("last_update");
  let mut entry: RegisteredPlan = serde_json::from_str(&data)?;
  entry.last_update = last_update.and_then(|s| s.parse().ok());
  Ok(entry)
}
