//! Multi-factor attendance verification: site QR token, attendance rules,
//! geofence and face match.

pub mod capture;
pub mod desk;
pub mod geofence;
pub mod matcher;
pub mod policy;
pub mod providers;
pub mod relay;
pub mod session;

pub use capture::{CaptureSettings, FaceCapture};
pub use desk::{DeskError, VerificationDesk};
pub use geofence::Geofence;
pub use matcher::FaceMatcher;
pub use policy::{AttendancePolicy, Clock, FixedClock, SystemClock};
pub use providers::{Devices, FeatureExtractor, LocationService, ModelHandle, VideoSource};
pub use relay::{FramePush, FrameRelay, LocationRelay};
pub use session::{Phase, SessionOutcome, SessionStatus, VerificationContext, VerificationSession};
