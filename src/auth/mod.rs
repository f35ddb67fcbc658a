//! Sign-in with an offline fallback.
//!
//! A successful online login leaves an encrypted local session behind: the
//! username, an Argon2id hash of the password and the employee profile (site
//! token, site coordinates, schedule). Offline, the same credentials unlock
//! that profile, so registration works after a restart without a connection.

pub mod password;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};

use crate::backend::RemoteBackend;
use crate::error::{AuthError, StoreError};
use crate::model::employee::{EmployeeId, EmployeeProfile};
use crate::store::SecureStore;
use crate::sync::Connectivity;
use password::{hash_password, verify_password};

const SESSION_NAMESPACE: &str = "local_sessions";
const PROFILE_NAMESPACE: &str = "employee_profiles";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalSession {
    username: String,
    password_hash: String,
    profile: EmployeeProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedIn {
    pub profile: EmployeeProfile,
    /// Unlocked from the local session rather than confirmed by the backend.
    pub offline: bool,
}

pub struct AuthService {
    backend: Arc<dyn RemoteBackend>,
    store: Arc<SecureStore>,
    connectivity: Connectivity,
}

impl AuthService {
    pub fn new(backend: Arc<dyn RemoteBackend>, store: Arc<SecureStore>, connectivity: Connectivity) -> Self {
        Self {
            backend,
            store,
            connectivity,
        }
    }

    /// Online first. Credentials the backend refuses are refused here too;
    /// only an unreachable backend falls back to the local session.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<SignedIn, AuthError> {
        let username = username.trim();
        if self.connectivity.is_online() {
            match self.backend.login(username, password).await {
                Ok(profile) => {
                    self.remember(username, password, &profile).await?;
                    info!(employee_id = %profile.employee_id, "signed in");
                    return Ok(SignedIn {
                        profile,
                        offline: false,
                    });
                }
                Err(e) if e.is_rejection() => {
                    info!(error = %e, "credentials refused");
                    return Err(AuthError::InvalidCredentials);
                }
                Err(e) => warn!(error = %e, "online sign-in failed, trying local session"),
            }
        }
        self.login_offline(username, password).await
    }

    /// Profile saved by the last online sign-in of this employee.
    pub async fn profile(&self, employee: EmployeeId) -> Result<Option<EmployeeProfile>, StoreError> {
        self.store
            .load_record(PROFILE_NAMESPACE, &employee.to_string())
            .await
    }

    async fn login_offline(&self, username: &str, password: &str) -> Result<SignedIn, AuthError> {
        let Some(session) = self
            .store
            .load_record::<LocalSession>(SESSION_NAMESPACE, username)
            .await?
        else {
            return Err(AuthError::NoLocalSession(username.to_string()));
        };

        let candidate = password.to_string();
        let hashed = session.password_hash.clone();
        let valid = spawn_blocking(move || verify_password(&candidate, &hashed))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        if !valid || session.username != username {
            return Err(AuthError::InvalidCredentials);
        }

        info!(employee_id = %session.profile.employee_id, "signed in offline");
        Ok(SignedIn {
            profile: session.profile,
            offline: true,
        })
    }

    async fn remember(&self, username: &str, password: &str, profile: &EmployeeProfile) -> Result<(), AuthError> {
        let secret = password.to_string();
        let password_hash = spawn_blocking(move || hash_password(&secret))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        let session = LocalSession {
            username: username.to_string(),
            password_hash,
            profile: profile.clone(),
        };
        self.store
            .save_record(SESSION_NAMESPACE, username, &session)
            .await?;
        self.store
            .save_record(PROFILE_NAMESPACE, &profile.employee_id.to_string(), profile)
            .await?;
        Ok(())
    }
}
