//! One attendance registration, from QR scan to persisted record.
//!
//! The session walks `Idle → Scanning → PolicyCheck → GeoCheck → FaceCapture
//! → FaceCompare → Submit → Done`; any step may end it in `Aborted`. Steps run
//! strictly in that order, so a rejected QR token never reaches the location
//! service and an out-of-range position never opens the camera. Progress is
//! published on a `watch` channel for the UI.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::capture::{CaptureOutcome, FaceCapture};
use super::geofence::Geofence;
use super::matcher::FaceMatcher;
use super::policy::{AttendancePolicy, Clock, classify_punctuality};
use super::providers::{Devices, LocationService, ModelHandle};
use crate::backend::RemoteBackend;
use crate::config::Config;
use crate::error::{AbortReason, BackendError};
use crate::model::attendance::{AttendanceKind, AttendanceRecord, DayKey, Punctuality};
use crate::model::employee::{EmployeeId, EmployeeProfile};
use crate::model::face::{Descriptor, FaceReference};
use crate::model::notification::NotificationCategory;
use crate::model::queue::PendingRecord;
use crate::services::NotificationService;
use crate::store::{DayLedger, FaceReferenceCache, SecureStore};
use crate::sync::Connectivity;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Scanning,
    PolicyCheck,
    GeoCheck,
    FaceCapture,
    FaceCompare,
    Submit,
    Done,
    Aborted(AbortReason),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::PolicyCheck => "policy_check",
            Phase::GeoCheck => "geo_check",
            Phase::FaceCapture => "face_capture",
            Phase::FaceCompare => "face_compare",
            Phase::Submit => "submit",
            Phase::Done => "done",
            Phase::Aborted(_) => "aborted",
        }
    }
}

/// Terminal result of a session. Exactly one is published per QR scan.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Recorded(AttendanceRecord),
    /// The backend could not be reached; the record waits in the local queue.
    Queued {
        record: AttendanceRecord,
        queue_id: String,
    },
    Aborted(AbortReason),
}

impl SessionOutcome {
    pub fn message(&self) -> String {
        match self {
            SessionOutcome::Recorded(record) => {
                format!("Attendance registered as {}.", record.kind)
            }
            SessionOutcome::Queued { record, .. } => format!(
                "Attendance ({}) stored locally, it will sync when the connection returns.",
                record.kind
            ),
            SessionOutcome::Aborted(reason) => reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub feedback: String,
    pub outcome: Option<SessionOutcome>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            feedback: String::new(),
            outcome: None,
        }
    }
}

/// Everything a session needs, shared across sessions.
pub struct VerificationContext {
    pub policy: AttendancePolicy,
    pub clock: Arc<dyn Clock>,
    pub geofence: Geofence,
    pub matcher: FaceMatcher,
    pub capture: Arc<FaceCapture>,
    pub location: Arc<dyn LocationService>,
    pub backend: Arc<dyn RemoteBackend>,
    pub store: Arc<SecureStore>,
    pub ledger: Arc<DayLedger>,
    pub face_cache: Arc<FaceReferenceCache>,
    pub notifications: Arc<NotificationService>,
    pub connectivity: Connectivity,
}

impl VerificationContext {
    /// Rules, thresholds and capture timing come from `config`, with a
    /// [`SystemClock`](super::SystemClock) in the configured offset.
    pub fn from_config(
        config: &Config,
        devices: Devices,
        backend: Arc<dyn RemoteBackend>,
        store: Arc<SecureStore>,
        notifications: Arc<NotificationService>,
        connectivity: Connectivity,
    ) -> Self {
        let models = Arc::new(ModelHandle::new(devices.extractor));
        Self {
            policy: config.policy(),
            clock: Arc::new(config.clock()),
            geofence: config.geofence(),
            matcher: config.matcher(),
            capture: Arc::new(FaceCapture::new(config.capture_settings(), devices.video, models)),
            location: devices.location,
            backend,
            ledger: Arc::new(DayLedger::new(store.clone())),
            face_cache: Arc::new(FaceReferenceCache::new(store.clone(), config.face_cache_ttl)),
            store,
            notifications,
            connectivity,
        }
    }
}

/// Driven through `&mut self`, so a session never runs two scans at once.
pub struct VerificationSession {
    ctx: Arc<VerificationContext>,
    profile: EmployeeProfile,
    status: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
}

impl VerificationSession {
    pub fn new(ctx: Arc<VerificationContext>, profile: EmployeeProfile) -> Self {
        let (status, _rx) = watch::channel(SessionStatus::default());
        Self {
            ctx,
            profile,
            status,
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase.clone()
    }

    /// Token that stops the scan in progress from another task.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the QR scanner. Allowed from `Idle` and from a finished session.
    pub fn open(&mut self) -> Result<(), AbortReason> {
        match self.phase() {
            Phase::Idle | Phase::Done | Phase::Aborted(_) => {
                self.cancel = CancellationToken::new();
                self.status.send_replace(SessionStatus {
                    phase: Phase::Scanning,
                    feedback: "Scan the site QR code".to_string(),
                    outcome: None,
                });
                Ok(())
            }
            _ => Err(AbortReason::Busy),
        }
    }

    /// Stops whatever is running and goes back to `Idle`.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.status.send_replace(SessionStatus::default());
    }

    /// Runs every check for the decoded QR text and persists the record.
    #[instrument(skip(self, qr_text), fields(employee_id = %self.profile.employee_id))]
    pub async fn on_qr_decoded(&mut self, qr_text: &str) -> SessionOutcome {
        if self.phase() != Phase::Scanning {
            return SessionOutcome::Aborted(AbortReason::Cancelled);
        }

        let outcome = match self.run(qr_text.trim()).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                if reason.is_policy_violation() {
                    info!(%reason, "verification rejected");
                } else {
                    warn!(%reason, "verification aborted");
                }
                SessionOutcome::Aborted(reason)
            }
        };

        let phase = match &outcome {
            SessionOutcome::Aborted(reason) => Phase::Aborted(reason.clone()),
            _ => Phase::Done,
        };
        self.status.send_replace(SessionStatus {
            phase,
            feedback: outcome.message(),
            outcome: Some(outcome.clone()),
        });
        outcome
    }

    async fn run(&self, qr_text: &str) -> Result<SessionOutcome, AbortReason> {
        let ctx = self.ctx.clone();
        let cancel = self.cancel.clone();
        let employee = self.profile.employee_id;

        if qr_text != self.profile.work_info.site_token {
            return Err(AbortReason::InvalidSiteToken);
        }

        self.transition(Phase::PolicyCheck, "Checking attendance rules...");
        let now = ctx.clock.now();
        if !ctx.policy.is_eligible_day(now.date()) {
            return Err(AbortReason::OutsideEligibleDays);
        }
        if !ctx.policy.is_within_window(now) {
            return Err(AbortReason::OutsideTimeWindow);
        }
        let today = ctx
            .ledger
            .status(employee, DayKey::from(now))
            .await
            .map_err(|e| AbortReason::PersistenceFailed(e.to_string()))?;
        if today.is_complete() {
            return Err(AbortReason::AlreadyComplete);
        }
        let site = self
            .profile
            .work_info
            .site()
            .ok_or(AbortReason::SiteLocationUnknown)?;

        self.transition(Phase::GeoCheck, "Getting your precise location...");
        let position = tokio::select! {
            _ = cancel.cancelled() => return Err(AbortReason::Cancelled),
            position = ctx.location.current_position() => {
                position.map_err(|e| AbortReason::LocationUnavailable(e.0))?
            }
        };
        let distance = ctx.geofence.distance(site, position);
        if !ctx.geofence.contains(distance) {
            return Err(AbortReason::OutOfGeofence {
                distance_m: distance,
            });
        }

        self.transition(Phase::FaceCapture, "Location verified");
        let status = &self.status;
        let mut on_feedback = |message: &str| {
            status.send_modify(|s| s.feedback = message.to_string());
        };
        let captured = ctx
            .capture
            .capture(&cancel, &mut on_feedback)
            .await
            .map_err(|e| AbortReason::CaptureFailed(e.to_string()))?;
        let (detection, frame) = match captured {
            CaptureOutcome::Captured { detection, frame } => (detection, frame),
            CaptureOutcome::Exhausted { attempts } => {
                info!(attempts, "no usable face within the attempt ceiling");
                return Err(AbortReason::FaceNotDetected);
            }
            CaptureOutcome::Cancelled => return Err(AbortReason::Cancelled),
        };
        let live = Descriptor::new(detection.descriptor)?;

        self.transition(Phase::FaceCompare, "Verifying your identity...");
        match self.reference(employee).await? {
            Reference::Found(reference) => {
                if !ctx.matcher.is_match(live.as_slice(), reference.descriptor.as_slice())? {
                    return Err(AbortReason::FaceMismatch);
                }
            }
            Reference::Missing => {
                let reference = FaceReference {
                    descriptor: live,
                    image_base64: Some(BASE64.encode(&frame.jpeg)),
                };
                ctx.backend
                    .put_face_reference(employee, &reference)
                    .await
                    .map_err(|e| AbortReason::EnrollmentFailed(e.to_string()))?;
                info!("face reference enrolled");
                if let Err(e) = ctx.face_cache.save(employee, &reference).await {
                    warn!(error = %e, "enrolled reference not cached");
                }
            }
            Reference::Unreachable(None) => return Err(AbortReason::NoReferenceOffline),
            Reference::Unreachable(Some(cause)) => return Err(AbortReason::ReferenceUnavailable(cause)),
        }

        if cancel.is_cancelled() {
            return Err(AbortReason::Cancelled);
        }
        self.transition(Phase::Submit, "Registering attendance...");
        let at = ctx.clock.now();
        let kind = today.next_kind();
        let punctuality = match kind {
            AttendanceKind::Entry => classify_punctuality(at, &self.profile.schedule),
            AttendanceKind::Exit => Punctuality::OnTime,
        };
        let record = AttendanceRecord::new(employee, kind, punctuality, at, position);
        self.submit(record).await
    }

    /// Remote first; on failure the record goes to the local queue.
    async fn submit(&self, record: AttendanceRecord) -> Result<SessionOutcome, AbortReason> {
        let ctx = &self.ctx;
        let remote_error = if ctx.connectivity.is_online() {
            match ctx.backend.create_attendance(&record).await {
                Ok(()) => {
                    self.mark_ledger(&record).await;
                    info!(kind = %record.kind, punctuality = %record.punctuality, "attendance recorded");
                    return Ok(SessionOutcome::Recorded(record));
                }
                Err(e) => {
                    warn!(error = %e, "attendance not delivered, queueing");
                    e.to_string()
                }
            }
        } else {
            "offline".to_string()
        };

        let queue_id = ctx
            .store
            .put(&PendingRecord::Attendance(record.clone()))
            .await
            .map_err(|e| AbortReason::PersistenceFailed(format!("{remote_error}; {e}")))?;
        self.mark_ledger(&record).await;
        info!(queue_id = %queue_id, kind = %record.kind, "attendance queued");

        ctx.notifications
            .notify(
                record.employee_id,
                NotificationCategory::Warning,
                "Attendance pending",
                &format!(
                    "Your {} of {} was stored locally and will be sent when the connection returns.",
                    record.kind,
                    record.formatted_timestamp()
                ),
            )
            .await;

        Ok(SessionOutcome::Queued { record, queue_id })
    }

    /// Remote reference first. The local copy is used when the backend cannot
    /// answer; a malformed remote descriptor is never replaced by it.
    async fn reference(&self, employee: EmployeeId) -> Result<Reference, AbortReason> {
        let ctx = &self.ctx;
        let mut remote_error = None;
        if ctx.connectivity.is_online() {
            match ctx.backend.get_face_reference(employee).await {
                Ok(Some(reference)) => {
                    if let Err(e) = ctx.face_cache.save(employee, &reference).await {
                        warn!(error = %e, "face reference not cached");
                    }
                    return Ok(Reference::Found(reference));
                }
                Ok(None) => return Ok(Reference::Missing),
                Err(BackendError::Invalid(e)) => return Err(e.into()),
                Err(BackendError::Transport(e)) => {
                    warn!(error = %e, "face reference unavailable, trying local copy");
                    remote_error = Some(e.to_string());
                }
            }
        }

        match ctx.face_cache.load(employee).await {
            Ok(Some(reference)) => Ok(Reference::Found(reference)),
            Ok(None) => Ok(Reference::Unreachable(remote_error)),
            Err(e) => {
                warn!(error = %e, "local face reference unreadable");
                Ok(Reference::Unreachable(remote_error))
            }
        }
    }

    async fn mark_ledger(&self, record: &AttendanceRecord) {
        if let Err(e) = self
            .ctx
            .ledger
            .mark(record.employee_id, record.day(), record.kind)
            .await
        {
            warn!(error = %e, "day ledger not updated");
        }
    }

    fn transition(&self, phase: Phase, feedback: &str) {
        self.status.send_modify(|s| {
            s.phase = phase;
            s.feedback = feedback.to_string();
        });
    }
}

enum Reference {
    Found(FaceReference),
    /// The backend answered and has no enrollment for this employee.
    Missing,
    /// Neither the backend nor the local cache could provide one. Carries the
    /// remote failure when the client was online.
    Unreachable(Option<String>),
}
