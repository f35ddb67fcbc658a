#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use attendance_agent::auth::AuthService;
use attendance_agent::backend::RemoteBackend;
use attendance_agent::config::Config;
use attendance_agent::db::init_db;
use attendance_agent::error::{BackendError, TransportError};
use attendance_agent::model::attendance::AttendanceRecord;
use attendance_agent::model::employee::{Coordinates, EmployeeId, EmployeeProfile, Schedule, WorkInfo};
use attendance_agent::model::face::{
    BoundingBox, DESCRIPTOR_LEN, Descriptor, Detection, FaceReference, Frame,
};
use attendance_agent::model::incident::IncidentRecord;
use attendance_agent::model::notification::{
    NewNotification, NotificationAction, NotificationRecord,
};
use attendance_agent::services::{AttendanceHistoryService, IncidentService, NotificationService};
use attendance_agent::store::{
    DayLedger, DeviceCipher, DeviceKeyFile, FaceReferenceCache, KdfParams, SecureStore,
};
use attendance_agent::sync::{Connectivity, SyncDispatcher, default_dispatcher};
use attendance_agent::verify::capture::CaptureSettings;
use attendance_agent::verify::providers::{
    CaptureError, Devices, FeatureExtractor, LocationService, ModelHandle, PositionError, VideoSource,
};
use attendance_agent::verify::{
    FaceCapture, FixedClock, FrameRelay, LocationRelay, VerificationContext, VerificationDesk,
};

pub const EMPLOYEE: EmployeeId = EmployeeId(7);
pub const SITE_TOKEN: &str = "SITE-7-QR";
pub const SITE: Coordinates = Coordinates {
    latitude: 21.1250,
    longitude: -101.6860,
};

/// Cheap key derivation so tests stay fast.
pub const TEST_KDF: KdfParams = KdfParams {
    memory_kib: 64,
    iterations: 1,
};

/// Site shifted north by roughly `meters`.
pub fn north_of_site(meters: f64) -> Coordinates {
    Coordinates {
        latitude: SITE.latitude + meters / 111_194.93,
        longitude: SITE.longitude,
    }
}

/// 2026-10-12 is a Monday.
pub fn monday_at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 12)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn profile() -> EmployeeProfile {
    EmployeeProfile {
        employee_id: EMPLOYEE,
        work_info: WorkInfo {
            site_token: SITE_TOKEN.to_string(),
            latitude: Some(SITE.latitude),
            longitude: Some(SITE.longitude),
        },
        schedule: Schedule::parse("08:00", "00:10:00").unwrap(),
    }
}

/// All-zero enrolled descriptor.
pub fn reference() -> FaceReference {
    FaceReference {
        descriptor: Descriptor::new(vec![0.0; DESCRIPTOR_LEN]).unwrap(),
        image_base64: None,
    }
}

/// A well framed face whose descriptor sits `distance` away from [`reference`].
pub fn detection_at(distance: f32) -> Detection {
    let mut descriptor = vec![0.0; DESCRIPTOR_LEN];
    descriptor[0] = distance;
    Detection {
        bounding_box: BoundingBox {
            x: 220.0,
            y: 100.0,
            width: 200.0,
            height: 200.0,
        },
        descriptor,
    }
}

pub fn fast_capture() -> CaptureSettings {
    CaptureSettings {
        max_attempts: 30,
        interval: Duration::from_millis(1),
        warmup: Duration::ZERO,
        ..CaptureSettings::default()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub unreachable: AtomicBool,
    pub attendance: Mutex<Vec<AttendanceRecord>>,
    pub incidents: Mutex<Vec<IncidentRecord>>,
    pub notifications: Mutex<Vec<NotificationRecord>>,
    pub updates: Mutex<Vec<(String, NotificationAction)>>,
    pub references: Mutex<HashMap<EmployeeId, FaceReference>>,
    pub reference_reads: AtomicUsize,
    /// Answer reference reads with a descriptor of the wrong length.
    pub malformed_reference: AtomicBool,
    /// username -> (password, profile)
    pub accounts: Mutex<HashMap<String, (String, EmployeeProfile)>>,
    seen_keys: Mutex<Vec<Uuid>>,
    next_id: AtomicU64,
}

impl FakeBackend {
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(TransportError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }

    /// Returns false when the key was already applied.
    fn first_time(&self, key: Uuid) -> bool {
        let mut seen = self.seen_keys.lock().unwrap();
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    }

    pub fn attendance_count(&self) -> usize {
        self.attendance.lock().unwrap().len()
    }

    pub fn add_account(&self, username: &str, password: &str, profile: EmployeeProfile) {
        self.accounts
            .lock()
            .unwrap()
            .insert(username.to_string(), (password.to_string(), profile));
    }
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<EmployeeProfile, TransportError> {
        self.check()?;
        match self.accounts.lock().unwrap().get(username) {
            Some((expected, profile)) if expected == password => Ok(profile.clone()),
            _ => Err(TransportError::Status {
                status: 401,
                message: "invalid credentials".into(),
            }),
        }
    }

    async fn create_attendance(&self, record: &AttendanceRecord) -> Result<(), TransportError> {
        self.check()?;
        if self.first_time(record.idempotency_key) {
            self.attendance.lock().unwrap().push(record.clone());
        }
        Ok(())
    }

    async fn list_attendance(&self, employee: EmployeeId) -> Result<Vec<AttendanceRecord>, TransportError> {
        self.check()?;
        Ok(self
            .attendance
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.employee_id == employee)
            .cloned()
            .collect())
    }

    async fn create_incident(&self, incident: &IncidentRecord) -> Result<(), BackendError> {
        incident.validate()?;
        self.check()?;
        if self.first_time(incident.idempotency_key) {
            self.incidents.lock().unwrap().push(incident.clone());
        }
        Ok(())
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, TransportError> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = NotificationRecord {
            id: id.to_string(),
            employee_id: notification.employee_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            category: notification.category,
            created_at: Utc::now(),
            read: notification.read,
            metadata: notification.metadata.clone(),
        };
        if self.first_time(notification.idempotency_key) {
            self.notifications.lock().unwrap().push(record.clone());
        }
        Ok(record)
    }

    async fn list_notifications(
        &self,
        employee: EmployeeId,
    ) -> Result<Vec<NotificationRecord>, TransportError> {
        self.check()?;
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.employee_id == employee)
            .cloned()
            .collect())
    }

    async fn update_notification(
        &self,
        notification_id: &str,
        action: NotificationAction,
    ) -> Result<(), TransportError> {
        self.check()?;
        self.updates
            .lock()
            .unwrap()
            .push((notification_id.to_string(), action));
        let mut notifications = self.notifications.lock().unwrap();
        match action {
            NotificationAction::Read => {
                if let Some(n) = notifications.iter_mut().find(|n| n.id == notification_id) {
                    n.read = true;
                }
            }
            NotificationAction::Dismiss => notifications.retain(|n| n.id != notification_id),
        }
        Ok(())
    }

    async fn get_face_reference(&self, employee: EmployeeId) -> Result<Option<FaceReference>, BackendError> {
        self.reference_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.malformed_reference.load(Ordering::SeqCst) {
            Descriptor::from_json(&serde_json::json!([0.1, 0.2, 0.3]))?;
        }
        Ok(self.references.lock().unwrap().get(&employee).cloned())
    }

    async fn put_face_reference(
        &self,
        employee: EmployeeId,
        reference: &FaceReference,
    ) -> Result<(), TransportError> {
        self.check()?;
        self.references
            .lock()
            .unwrap()
            .insert(employee, reference.clone());
        Ok(())
    }
}

pub struct FakeVideo;

/// Fails the first `drops` frames, then behaves like [`FakeVideo`].
pub struct FlakyVideo {
    pub drops: AtomicUsize,
}

impl FlakyVideo {
    pub fn dropping(drops: usize) -> Self {
        Self {
            drops: AtomicUsize::new(drops),
        }
    }
}

#[async_trait]
impl VideoSource for FlakyVideo {
    async fn latest_frame(&self) -> Result<Frame, CaptureError> {
        let left = self.drops.load(Ordering::SeqCst);
        if left > 0 {
            self.drops.store(left - 1, Ordering::SeqCst);
            return Err(CaptureError::Camera("frame dropped".into()));
        }
        FakeVideo.latest_frame().await
    }
}

#[async_trait]
impl VideoSource for FakeVideo {
    async fn latest_frame(&self) -> Result<Frame, CaptureError> {
        Ok(Frame {
            width: 640,
            height: 480,
            jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
        })
    }
}

/// Answers every frame with the same detection (or none).
#[derive(Default)]
pub struct FakeExtractor {
    pub detection: Mutex<Option<Detection>>,
    pub loads: AtomicUsize,
    pub detects: AtomicUsize,
}

impl FakeExtractor {
    pub fn set(&self, detection: Option<Detection>) {
        *self.detection.lock().unwrap() = detection;
    }
}

#[async_trait]
impl FeatureExtractor for FakeExtractor {
    async fn load(&self) -> Result<(), CaptureError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detect(&self, _frame: &Frame) -> Result<Option<Detection>, CaptureError> {
        self.detects.fetch_add(1, Ordering::SeqCst);
        Ok(self.detection.lock().unwrap().clone())
    }
}

pub struct FakeLocation {
    pub position: Mutex<Result<Coordinates, String>>,
    pub calls: AtomicUsize,
}

impl FakeLocation {
    pub fn at(position: Coordinates) -> Self {
        Self {
            position: Mutex::new(Ok(position)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, position: Result<Coordinates, String>) {
        *self.position.lock().unwrap() = position;
    }
}

#[async_trait]
impl LocationService for FakeLocation {
    async fn current_position(&self) -> Result<Coordinates, PositionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.position.lock().unwrap().clone().map_err(PositionError)
    }
}

/// Every collaborator wired to fakes over an in-memory database.
pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SecureStore>,
    pub backend: Arc<FakeBackend>,
    pub extractor: Arc<FakeExtractor>,
    pub location: Arc<FakeLocation>,
    pub connectivity: Connectivity,
    pub ledger: Arc<DayLedger>,
    pub face_cache: Arc<FaceReferenceCache>,
    pub notifications: Arc<NotificationService>,
    /// UI-facing relays, registered with the API but not used by [`Harness::context`].
    pub frames: Arc<FrameRelay>,
    pub location_relay: Arc<LocationRelay>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db("sqlite::memory:").await.unwrap();
        let cipher = DeviceCipher::new(DeviceKeyFile::new(dir.path().join("device.key")), TEST_KDF);
        let store = Arc::new(SecureStore::new(pool.clone(), Arc::new(cipher)));
        let backend = Arc::new(FakeBackend::default());
        let connectivity = Connectivity::new(true);

        let extractor = Arc::new(FakeExtractor::default());
        extractor.set(Some(detection_at(0.2)));

        let notifications = Arc::new(NotificationService::new(
            backend.clone(),
            store.clone(),
            connectivity.clone(),
        ));

        Self {
            ledger: Arc::new(DayLedger::new(store.clone())),
            face_cache: Arc::new(FaceReferenceCache::new(store.clone(), Duration::from_secs(60))),
            location: Arc::new(FakeLocation::at(north_of_site(40.0))),
            dir,
            pool,
            store,
            backend,
            extractor,
            connectivity,
            notifications,
            frames: Arc::new(FrameRelay::new(Duration::from_secs(2))),
            location_relay: Arc::new(LocationRelay::new(Duration::from_secs(1))),
        }
    }

    pub fn enroll(&self) {
        self.backend
            .references
            .lock()
            .unwrap()
            .insert(EMPLOYEE, reference());
    }

    pub fn context(&self, now: NaiveDateTime) -> Arc<VerificationContext> {
        self.context_with(now, fast_capture())
    }

    pub fn context_with(&self, now: NaiveDateTime, capture: CaptureSettings) -> Arc<VerificationContext> {
        self.context_from(now, capture, Arc::new(FakeVideo))
    }

    /// Default configuration with a fixed clock, the harness' ledger and face
    /// cache, and the given camera.
    pub fn context_from(
        &self,
        now: NaiveDateTime,
        capture: CaptureSettings,
        video: Arc<dyn VideoSource>,
    ) -> Arc<VerificationContext> {
        let config = Config::from_lookup(|_| None).unwrap();
        let devices = Devices {
            video: video.clone(),
            extractor: self.extractor.clone(),
            location: self.location.clone(),
        };
        let models = Arc::new(ModelHandle::new(self.extractor.clone()));
        Arc::new(VerificationContext {
            clock: Arc::new(FixedClock(now)),
            capture: Arc::new(FaceCapture::new(capture, video, models)),
            ledger: self.ledger.clone(),
            face_cache: self.face_cache.clone(),
            ..VerificationContext::from_config(
                &config,
                devices,
                self.backend.clone(),
                self.store.clone(),
                self.notifications.clone(),
                self.connectivity.clone(),
            )
        })
    }

    pub fn auth(&self) -> Arc<AuthService> {
        Arc::new(AuthService::new(
            self.backend.clone(),
            self.store.clone(),
            self.connectivity.clone(),
        ))
    }

    pub fn desk(&self, now: NaiveDateTime) -> VerificationDesk {
        VerificationDesk::new(self.context(now), self.auth())
    }

    pub fn dispatcher(&self) -> SyncDispatcher {
        default_dispatcher(
            self.store.clone(),
            self.backend.clone(),
            self.notifications.clone(),
        )
    }

    pub fn incidents(&self) -> IncidentService {
        IncidentService::new(
            self.backend.clone(),
            self.store.clone(),
            self.notifications.clone(),
            self.connectivity.clone(),
        )
    }

    pub fn history(&self) -> AttendanceHistoryService {
        AttendanceHistoryService::new(
            self.backend.clone(),
            self.store.clone(),
            self.ledger.clone(),
            Arc::new(FixedClock(monday_at(12, 0))),
            self.connectivity.clone(),
        )
    }
}
