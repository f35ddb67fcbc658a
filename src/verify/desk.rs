//! The verification session as the local UI drives it.
//!
//! One session is open at a time. Its status stays readable, and it can be
//! closed, while a scan is running.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::session::{Phase, SessionOutcome, SessionStatus, VerificationContext, VerificationSession};
use crate::auth::AuthService;
use crate::error::StoreError;
use crate::model::employee::EmployeeId;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("no saved profile for employee {0}, sign in first")]
    UnknownEmployee(EmployeeId),

    #[error("no verification is waiting for a QR code")]
    NotOpen,

    #[error("a verification is already in progress")]
    Busy,

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct OpenSession {
    employee: EmployeeId,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
}

pub struct VerificationDesk {
    ctx: Arc<VerificationContext>,
    auth: Arc<AuthService>,
    /// Held for the whole scan.
    session: Mutex<Option<VerificationSession>>,
    open: Mutex<Option<OpenSession>>,
}

impl VerificationDesk {
    pub fn new(ctx: Arc<VerificationContext>, auth: Arc<AuthService>) -> Self {
        Self {
            ctx,
            auth,
            session: Mutex::new(None),
            open: Mutex::new(None),
        }
    }

    /// Opens the QR scanner for an employee whose profile was saved at sign-in.
    /// An idle or finished session is replaced.
    #[instrument(skip(self))]
    pub async fn open(&self, employee: EmployeeId) -> Result<SessionStatus, DeskError> {
        let mut slot = self.session.try_lock().map_err(|_| DeskError::Busy)?;
        let profile = self
            .auth
            .profile(employee)
            .await?
            .ok_or(DeskError::UnknownEmployee(employee))?;

        if let Some(previous) = slot.as_mut() {
            previous.close();
        }
        let mut session = VerificationSession::new(self.ctx.clone(), profile);
        session.open().map_err(|_| DeskError::Busy)?;
        let status = session.status();

        *self.open.lock().await = Some(OpenSession {
            employee,
            status: session.subscribe(),
            cancel: session.cancel_handle(),
        });
        *slot = Some(session);
        info!("verification opened");
        Ok(status)
    }

    /// Runs every check for the decoded QR text. Returns once the session is
    /// done or aborted.
    pub async fn scan(&self, qr_text: &str) -> Result<SessionOutcome, DeskError> {
        let mut slot = self.session.try_lock().map_err(|_| DeskError::Busy)?;
        let session = slot.as_mut().ok_or(DeskError::NotOpen)?;
        if session.phase() != Phase::Scanning {
            return Err(DeskError::NotOpen);
        }
        Ok(session.on_qr_decoded(qr_text).await)
    }

    pub async fn status(&self) -> Option<(EmployeeId, SessionStatus)> {
        self.open
            .lock()
            .await
            .as_ref()
            .map(|open| (open.employee, open.status.borrow().clone()))
    }

    /// Stops a running scan and forgets the session.
    pub async fn close(&self) {
        if let Some(open) = self.open.lock().await.take() {
            open.cancel.cancel();
        }
        if let Ok(mut slot) = self.session.try_lock() {
            if let Some(mut session) = slot.take() {
                session.close();
            }
        }
    }
}
