pub mod notification;
pub mod plan;
pub mod profile;
pub mod schedule;

pub use notification::{HealthNotification, NotificationSettings, NotificationStatus, NotificationType, Priority};
pub use plan::{Difficulty, PlanCandidate};
pub use profile::{DayOfWeek, UserProfile};
pub use schedule::{DailySchedule, DayPerformance};
