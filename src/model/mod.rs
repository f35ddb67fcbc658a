pub mod attendance;
pub mod employee;
pub mod face;
pub mod incident;
pub mod notification;
pub mod queue;
