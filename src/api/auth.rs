use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;

use super::internal_error;
use crate::auth::AuthService;
use crate::error::AuthError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Online when possible, otherwise against the session saved by the last online login.
pub async fn login(
    service: web::Data<AuthService>,
    body: web::Json<LoginRequest>,
) -> actix_web::Result<impl Responder> {
    let LoginRequest { username, password } = body.into_inner();

    match service.login(&username, &password).await {
        Ok(signed_in) => Ok(HttpResponse::Ok().json(signed_in)),
        Err(AuthError::InvalidCredentials) => Ok(HttpResponse::Unauthorized().json(json!({
            "message": "Invalid username or password"
        }))),
        Err(e @ AuthError::NoLocalSession(_)) => Ok(HttpResponse::ServiceUnavailable().json(json!({
            "message": e.to_string()
        }))),
        Err(e) => Err(internal_error(e, "Login failed")),
    }
}
