use std::sync::Arc;

use crate::db::PlanStore;
use crate::llm::ContentGenerator;
use crate::notifications::NotificationDispatcher;
use crate::registry::PlanRegistry;
use crate::scheduler::MidnightScheduler;

/// Shared handles for request handlers and background loops
pub struct AppState {
  pub store: Arc<dyn PlanStore>,
  pub registry: Arc<dyn PlanRegistry>,
  pub generator: Arc<dyn ContentGenerator>,
  pub scheduler: Arc<MidnightScheduler>,
  pub dispatcher: Arc<NotificationDispatcher>,
}
