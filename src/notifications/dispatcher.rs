//! Background delivery of due notifications.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::delivery::{apply, present, NotificationEvent, NotificationSink};
use crate::config::DispatchConfig;
use crate::db::PlanStore;
use crate::error::EngineError;
use crate::models::{HealthNotification, NotificationSettings, NotificationStatus};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
  pub delivered: usize,
  pub failed: usize,
  pub expired: usize,
}

struct Runner {
  shutdown: watch::Sender<bool>,
  handle: JoinHandle<()>,
}

pub struct NotificationDispatcher {
  store: Arc<dyn PlanStore>,
  local: Arc<dyn NotificationSink>,
  push: Option<Arc<dyn NotificationSink>>,
  config: DispatchConfig,
  runner: Mutex<Option<Runner>>,
}

impl NotificationDispatcher {
  pub fn new(
    store: Arc<dyn PlanStore>,
    local: Arc<dyn NotificationSink>,
    push: Option<Arc<dyn NotificationSink>>,
    config: DispatchConfig,
  ) -> Self {
    Self {
      store,
      local,
      push,
      config,
      runner: Mutex::new(None),
    }
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
            let report = this.tick(Local::now().naive_local()).await;
            if report != DispatchReport::default() {
              log::info!(
                "dispatch: {} delivered, {} failed, {} expired",
                report.delivered, report.failed, report.expired
              );
            }
          }
          _ = stopped.changed() => break,
        }
      }
    });

    log::info!("Notification dispatcher started (every {:?})", self.config.poll_interval);
    *runner = Some(Runner { shutdown, handle });
  }

  pub async fn stop(&self) {
    if let Some(runner) = self.runner.lock().await.take() {
      let _ = runner.shutdown.send(true);
      if let Err(e) = runner.handle.await {
        log::error!("dispatcher task ended abnormally: {}", e);
      }
      log::info!("Notification dispatcher stopped");
    }
  }

  /// One delivery pass: expire stale notifications, then deliver everything due
  pub async fn tick(self: &Arc<Self>, now: NaiveDateTime) -> DispatchReport {
    let mut report = DispatchReport::default();

    let cutoff = now - Duration::minutes(self.config.active_window_minutes);
    match self.store.stale_notifications(cutoff).await {
      Ok(stale) => {
        for mut n in stale {
          let loaded = n.status;
          if apply(&mut n, NotificationEvent::Expire, now, &NotificationSettings::default()).is_ok() {
            match self.store.update_notification(&n, loaded).await {
              Ok(()) => report.expired += 1,
              Err(EngineError::InvalidTransition(e)) => log::debug!("skipping expiry: {}", e),
              Err(e) => log::warn!("failed to expire notification {}: {}", n.id, e),
            }
          }
        }
      }
      Err(e) => log::warn!("failed to load stale notifications: {}", e),
    }

    let due = match self.store.due_notifications(now).await {
      Ok(due) => due,
      Err(e) => {
        log::warn!("failed to load due notifications: {}", e);
        return report;
      }
    };

    let mut settings_by_user: HashMap<String, Arc<NotificationSettings>> = HashMap::new();
    let mut tasks = JoinSet::new();
    for n in due {
      let settings = match settings_by_user.get(&n.user_id) {
        Some(s) => Arc::clone(s),
        None => {
          let s = Arc::new(self.store.load_settings(&n.user_id).await.unwrap_or_else(|e| {
            log::warn!("using default notification settings for {}: {}", n.user_id, e);
            NotificationSettings::default()
          }));
          settings_by_user.insert(n.user_id.clone(), Arc::clone(&s));
          s
        }
      };
      let this = Arc::clone(self);
      tasks.spawn(async move { this.deliver_one(n, &settings, now).await });
    }

    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok(Ok(Some(NotificationStatus::Sent))) => report.delivered += 1,
        Ok(Ok(Some(_))) => report.failed += 1,
        Ok(Ok(None)) => {}
        Ok(Err(e)) => {
          log::warn!("delivery bookkeeping failed: {}", e);
          report.failed += 1;
        }
        Err(e) => {
          log::error!("delivery task panicked: {}", e);
          report.failed += 1;
        }
      }
    }

    report
  }

  /// Deliver one notification; a local channel failure marks it missed.
  /// `None` means the row changed state since it was loaded and was left alone.
  async fn deliver_one(
    &self,
    mut n: HealthNotification,
    settings: &NotificationSettings,
    now: NaiveDateTime,
  ) -> Result<Option<NotificationStatus>, EngineError> {
    let loaded = n.status;
    if n.status == NotificationStatus::Snoozed {
      apply(&mut n, NotificationEvent::Requeue, now, settings)?;
    }
    apply(&mut n, NotificationEvent::Deliver, now, settings)?;

    if let Err(e) = present(&n, settings, self.local.as_ref(), self.push.as_deref(), now).await {
      log::warn!("notification {} for {} not delivered: {}", n.id, n.user_id, e);
      apply(&mut n, NotificationEvent::Expire, now, settings)?;
    }

    match self.store.update_notification(&n, loaded).await {
      Ok(()) => Ok(Some(n.status)),
      Err(EngineError::InvalidTransition(e)) => {
        log::debug!("skipping delivery: {}", e);
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::SqliteStore;
  use crate::notifications::delivery::{LogSink, WebhookPush};
  use crate::test_utils::{at, mock_notification, monday, setup_test_db, FailingSink};

  fn dispatcher(store: Arc<dyn PlanStore>, local: Arc<dyn NotificationSink>) -> Arc<NotificationDispatcher> {
    Arc::new(NotificationDispatcher::new(store, local, None, DispatchConfig::default()))
  }

  #[tokio::test]
  async fn test_tick_delivers_due_only() {
    // Arrange
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let mut due = mock_notification("user-1", at(monday(), 9, 0));
    due.dedupe_key = "due".into();
    let mut later = mock_notification("user-1", at(monday(), 10, 0));
    later.dedupe_key = "later".into();
    store.save_notifications(&[due.clone(), later.clone()]).await.unwrap();

    // Act
    let report = dispatcher(Arc::clone(&store), Arc::new(LogSink)).tick(at(monday(), 9, 0)).await;

    // Assert
    assert_eq!(report.delivered, 1);
    let due = store.load_notification(&due.id).await.unwrap().unwrap();
    assert_eq!(due.status, NotificationStatus::Sent);
    let later = store.load_notification(&later.id).await.unwrap().unwrap();
    assert_eq!(later.status, NotificationStatus::Pending);
  }

  #[tokio::test]
  async fn test_channel_failure_marks_missed() {
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let n = mock_notification("user-1", at(monday(), 9, 0));
    store.save_notifications(&[n.clone()]).await.unwrap();

    let report = dispatcher(Arc::clone(&store), Arc::new(FailingSink)).tick(at(monday(), 9, 1)).await;

    assert_eq!(report.failed, 1);
    let stored = store.load_notification(&n.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Missed);
  }

  #[tokio::test]
  async fn test_push_failure_still_counts_as_delivered() {
    // Arrange
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/push").with_status(500).create_async().await;
    let url = url::Url::parse(&format!("{}/push", server.url())).unwrap();
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let n = mock_notification("user-1", at(monday(), 9, 0));
    store.save_notifications(&[n.clone()]).await.unwrap();
    let d = Arc::new(NotificationDispatcher::new(
      Arc::clone(&store),
      Arc::new(LogSink),
      Some(Arc::new(WebhookPush::new(url)) as Arc<dyn NotificationSink>),
      DispatchConfig::default(),
    ));

    // Act
    let report = d.tick(at(monday(), 9, 0)).await;

    // Assert: still answerable by the user
    assert_eq!(report.delivered, 1);
    let stored = store.load_notification(&n.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Sent);
  }

  #[tokio::test]
  async fn test_unanswered_sent_notification_expires() {
    // Arrange: sent at 09:00 for a 09:15 event, nobody responds
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let mut n = mock_notification("user-1", at(monday(), 9, 0));
    n.status = NotificationStatus::Sent;
    store.save_notifications(&[n.clone()]).await.unwrap();
    let d = dispatcher(Arc::clone(&store), Arc::new(LogSink));

    // Act: still inside the active window
    let report = d.tick(at(monday(), 10, 0)).await;
    assert_eq!(report.expired, 0);

    // Act: an hour past the event
    let report = d.tick(at(monday(), 10, 16)).await;

    // Assert
    assert_eq!(report.expired, 1);
    let stored = store.load_notification(&n.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Missed);
  }

  #[tokio::test]
  async fn test_snoozed_notification_redelivered() {
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let mut n = mock_notification("user-1", at(monday(), 9, 0));
    n.status = NotificationStatus::Snoozed;
    n.snooze_count = 1;
    store.save_notifications(&[n.clone()]).await.unwrap();

    let report = dispatcher(Arc::clone(&store), Arc::new(LogSink)).tick(at(monday(), 9, 0)).await;

    assert_eq!(report.delivered, 1);
    let stored = store.load_notification(&n.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.snooze_count, 1);
  }

  #[tokio::test]
  async fn test_delivery_skips_row_cancelled_since_load() {
    // Arrange: loaded as Pending, then cancelled before delivery
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let n = mock_notification("user-1", at(monday(), 9, 0));
    store.save_notifications(&[n.clone()]).await.unwrap();
    let loaded = store.load_notification(&n.id).await.unwrap().unwrap();
    crate::notifications::cancel_plan_notifications(store.as_ref(), "user-1", "plan-1", at(monday(), 8, 59))
      .await
      .unwrap();

    // Act
    let d = dispatcher(Arc::clone(&store), Arc::new(LogSink));
    let outcome = d.deliver_one(loaded, &NotificationSettings::default(), at(monday(), 9, 0)).await.unwrap();

    // Assert
    assert_eq!(outcome, None);
    let stored = store.load_notification(&n.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Cancelled);
  }

  #[tokio::test]
  async fn test_start_and_stop() {
    let pool = setup_test_db().await;
    let store: Arc<dyn PlanStore> = Arc::new(SqliteStore::new(pool));
    let d = dispatcher(store, Arc::new(LogSink));

    d.start().await;
    d.start().await;
    d.stop().await;

    assert!(d.runner.lock().await.is_none());
  }
}
