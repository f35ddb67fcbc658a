pub mod agent;
pub mod attendance;
pub mod auth;
pub mod incidents;
pub mod notifications;
pub mod verification;

use std::fmt::Display;

use serde::Deserialize;

/// `?employee_id=` on notification actions.
#[derive(Debug, Deserialize)]
pub struct EmployeeQuery {
    pub employee_id: u64,
}

pub(crate) fn internal_error(error: impl Display, context: &'static str) -> actix_web::Error {
    tracing::error!(error = %error, "{context}");
    actix_web::error::ErrorInternalServerError("Internal Server Error")
}
