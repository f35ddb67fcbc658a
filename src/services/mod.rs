pub mod history;
pub mod incidents;
pub mod notifications;

pub use history::AttendanceHistoryService;
pub use incidents::{IncidentOutcome, IncidentService};
pub use notifications::NotificationService;
