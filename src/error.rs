//! Error types shared by the verification pipeline, the local store and sync.

use thiserror::Error;

/// Malformed input. Never retried, surfaced immediately.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("descriptor must have {expected} components, got {actual}")]
    DescriptorLength { expected: usize, actual: usize },

    #[error("descriptor component {index} is not a finite number")]
    DescriptorComponent { index: usize },

    #[error("descriptor must be a JSON array of numbers")]
    DescriptorShape,

    #[error("invalid schedule value `{0}`")]
    Schedule(String),

    #[error("invalid evidence: {0}")]
    Evidence(String),

    #[error("invalid frame: {0}")]
    Frame(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

/// Why a verification session stopped before persisting a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbortReason {
    #[error("the scanned QR code does not belong to this site")]
    InvalidSiteToken,

    #[error("attendance can only be registered on working days")]
    OutsideEligibleDays,

    #[error("outside the allowed attendance hours")]
    OutsideTimeWindow,

    #[error("entry and exit are already registered for today")]
    AlreadyComplete,

    #[error("the expected site location is not configured")]
    SiteLocationUnknown,

    #[error("could not obtain the current location: {0}")]
    LocationUnavailable(String),

    #[error("outside the expected site range ({distance_m:.1} m)")]
    OutOfGeofence { distance_m: f64 },

    #[error("no face could be captured")]
    FaceNotDetected,

    #[error("no enrolled face to compare against while offline")]
    NoReferenceOffline,

    #[error("the enrolled face could not be retrieved: {0}")]
    ReferenceUnavailable(String),

    #[error("face does not match the enrolled reference")]
    FaceMismatch,

    #[error("could not enroll the face reference: {0}")]
    EnrollmentFailed(String),

    #[error("capture device failed: {0}")]
    CaptureFailed(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("record could not be sent nor stored locally: {0}")]
    PersistenceFailed(String),

    #[error("verification was closed")]
    Cancelled,

    #[error("a verification is already in progress")]
    Busy,
}

impl AbortReason {
    /// Rejections caused by the attendance rules rather than by a device or input fault.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSiteToken
                | Self::OutsideEligibleDays
                | Self::OutsideTimeWindow
                | Self::AlreadyComplete
                | Self::SiteLocationUnknown
                | Self::OutOfGeofence { .. }
                | Self::FaceNotDetected
                | Self::NoReferenceOffline
                | Self::FaceMismatch
        )
    }
}

/// Remote backend unreachable or answered with a failure envelope.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),

    #[error("client is offline")]
    Offline,
}

impl TransportError {
    /// The backend answered and refused the request, as opposed to not answering.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Rejected(_) => true,
            Self::Status { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Unreachable(value.to_string())
        }
    }
}

/// A backend call whose payload is checked on the way in or out.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("device key error: {0}")]
    DeviceKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload encryption failed")]
    Crypto,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no sync handler registered for `{0}`")]
    HandlerMissing(String),

    #[error("record does not belong to the `{0}` handler")]
    WrongFamily(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The queued record itself is malformed; replaying it again cannot succeed.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BackendError> for SyncError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Transport(e) => Self::Transport(e),
            BackendError::Invalid(e) => Self::Invalid(e),
        }
    }
}

/// Failure of a write that has an offline fallback: only bad input or a
/// broken local store can make it fail.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("no local session for `{0}`, sign in online first")]
    NoLocalSession(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("backend unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
