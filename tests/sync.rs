mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use attendance_agent::error::SyncError;
use attendance_agent::model::attendance::{AttendanceKind, AttendanceRecord, Punctuality};
use attendance_agent::model::queue::{HandlerFamily, PendingRecord};
use attendance_agent::store::{DeviceCipher, DeviceKeyFile, SecureStore};
use attendance_agent::sync::{SyncDispatcher, SyncHandler, run_sync_trigger};
use common::*;

fn attendance(h: u32) -> PendingRecord {
    PendingRecord::Attendance(AttendanceRecord::new(
        EMPLOYEE,
        AttendanceKind::Entry,
        Punctuality::OnTime,
        monday_at(h, 0),
        north_of_site(10.0),
    ))
}

async fn wait_for_empty_queue(store: &SecureStore) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.pending_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained");
}

#[tokio::test]
async fn queue_round_trip() {
    let harness = Harness::new().await;
    let record = attendance(8);

    let id = harness.store.put(&record).await.unwrap();
    assert_eq!(
        harness.store.get(HandlerFamily::AttendancePending).await.unwrap(),
        Some(record)
    );

    harness.store.delete(&id).await.unwrap();
    assert!(harness.store.list_all().await.unwrap().iter().all(|i| i.id != id));
}

#[tokio::test]
async fn drain_delivers_once_and_second_pass_is_empty() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();
    harness.store.put(&attendance(9)).await.unwrap();
    let dispatcher = harness.dispatcher();

    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 2);
    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 0);
    assert_eq!(harness.backend.attendance_count(), 2);
    assert_eq!(harness.store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_replay_keeps_the_item() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();
    harness.backend.set_reachable(false);
    let dispatcher = harness.dispatcher();

    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 0);
    assert_eq!(harness.store.pending_count().await.unwrap(), 1);

    harness.backend.set_reachable(true);
    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 1);
}

#[tokio::test]
async fn replayed_record_keeps_its_idempotency_key() {
    let harness = Harness::new().await;
    let record = attendance(8);
    let PendingRecord::Attendance(inner) = &record else {
        unreachable!()
    };
    let key = inner.idempotency_key;
    harness.store.put(&record).await.unwrap();
    // the same write queued twice, e.g. after a crash between replay and delete
    harness.store.put(&record).await.unwrap();

    assert_eq!(harness.dispatcher().sync_pending_data().await.unwrap(), 2);

    let delivered = harness.backend.attendance.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].idempotency_key, key);
}

#[tokio::test]
async fn items_without_a_handler_stay_queued() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();
    let dispatcher = SyncDispatcher::new(harness.store.clone());

    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 0);
    assert_eq!(harness.store.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn undecryptable_items_are_skipped() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();

    // same database, different device key
    let other_key = DeviceKeyFile::new(harness.dir.path().join("other.key"));
    let foreign = Arc::new(SecureStore::new(
        harness.pool.clone(),
        Arc::new(DeviceCipher::new(other_key, TEST_KDF)),
    ));
    let dispatcher = attendance_agent::sync::default_dispatcher(
        foreign,
        harness.backend.clone(),
        harness.notifications.clone(),
    );

    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 0);
    assert_eq!(harness.backend.attendance_count(), 0);
    assert_eq!(harness.store.pending_count().await.unwrap(), 1);
}

/// Blocks inside `replay` until released.
struct GatedHandler {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl SyncHandler for GatedHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::AttendancePending
    }

    async fn replay(&self, _record: &PendingRecord) -> Result<(), SyncError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn trigger_during_a_pass_is_a_no_op() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let dispatcher = Arc::new(SyncDispatcher::new(harness.store.clone()).with_handler(Arc::new(
        GatedHandler {
            entered: entered.clone(),
            release: release.clone(),
        },
    )));

    let first = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.sync_pending_data().await.unwrap() }
    });
    entered.notified().await;

    assert!(dispatcher.is_running());
    assert_eq!(dispatcher.sync_pending_data().await.unwrap(), 0);

    release.notify_one();
    assert_eq!(first.await.unwrap(), 1);
    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn reconnect_edge_drains_the_queue() {
    let harness = Harness::new().await;
    harness.connectivity.set_online(false);
    harness.store.put(&attendance(8)).await.unwrap();

    let shutdown = CancellationToken::new();
    let trigger = tokio::spawn(run_sync_trigger(
        shutdown.clone(),
        Arc::new(harness.dispatcher()),
        harness.connectivity.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.store.pending_count().await.unwrap(), 1);

    harness.connectivity.set_online(true);
    wait_for_empty_queue(&harness.store).await;
    assert_eq!(harness.backend.attendance_count(), 1);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), trigger)
        .await
        .expect("trigger stops on shutdown")
        .unwrap();
}

/// Holds the first replay until released; later replays go straight through.
struct FirstReplayGated {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    replays: AtomicUsize,
}

#[async_trait]
impl SyncHandler for FirstReplayGated {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::AttendancePending
    }

    async fn replay(&self, _record: &PendingRecord) -> Result<(), SyncError> {
        if self.replays.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn outage_during_a_pass_gets_its_own_pass() {
    let harness = Harness::new().await;
    harness.connectivity.set_online(false);
    harness.store.put(&attendance(8)).await.unwrap();
    let handler = Arc::new(FirstReplayGated {
        entered: Arc::new(Notify::new()),
        release: Arc::new(Notify::new()),
        replays: AtomicUsize::new(0),
    });
    let dispatcher = Arc::new(SyncDispatcher::new(harness.store.clone()).with_handler(handler.clone()));

    let shutdown = CancellationToken::new();
    let trigger = tokio::spawn(run_sync_trigger(
        shutdown.clone(),
        dispatcher,
        harness.connectivity.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness.connectivity.set_online(true);
    handler.entered.notified().await;

    // queued during a short outage while the first pass is still running
    harness.store.put(&attendance(9)).await.unwrap();
    harness.connectivity.set_online(false);
    harness.connectivity.set_online(true);
    handler.release.notify_one();

    wait_for_empty_queue(&harness.store).await;
    assert_eq!(handler.replays.load(Ordering::SeqCst), 2);

    shutdown.cancel();
    trigger.await.unwrap();
}

#[tokio::test]
async fn malformed_queued_incident_is_dropped() {
    let harness = Harness::new().await;
    let mut bad = incident("scanned note");
    bad.evidence[0].mime_type = "not a mime".into();
    harness
        .store
        .put(&PendingRecord::Incident(bad))
        .await
        .unwrap();

    assert_eq!(harness.dispatcher().sync_pending_data().await.unwrap(), 0);
    assert_eq!(harness.store.pending_count().await.unwrap(), 0);
    assert!(harness.backend.incidents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn startup_sync_when_already_online() {
    let harness = Harness::new().await;
    harness.store.put(&attendance(8)).await.unwrap();

    let shutdown = CancellationToken::new();
    let trigger = tokio::spawn(run_sync_trigger(
        shutdown.clone(),
        Arc::new(harness.dispatcher()),
        harness.connectivity.clone(),
    ));

    wait_for_empty_queue(&harness.store).await;
    shutdown.cancel();
    trigger.await.unwrap();
}

#[tokio::test]
async fn queued_incident_and_notification_are_replayed() {
    let harness = Harness::new().await;
    harness.connectivity.set_online(false);

    let outcome = harness
        .incidents()
        .submit(incident("flat tire on the way"))
        .await
        .unwrap();
    assert!(matches!(outcome, attendance_agent::services::IncidentOutcome::Queued { .. }));
    assert_eq!(harness.store.pending_count().await.unwrap(), 2);

    harness.connectivity.set_online(true);
    assert_eq!(harness.dispatcher().sync_pending_data().await.unwrap(), 2);

    let incidents = harness.backend.incidents.lock().unwrap().clone();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].evidence[0].bytes().unwrap(), b"\xff\xd8evidence");
    assert_eq!(harness.backend.notifications.lock().unwrap().len(), 1);
}

fn incident(description: &str) -> attendance_agent::model::incident::IncidentRecord {
    use attendance_agent::model::incident::{Evidence, IncidentRecord};
    IncidentRecord {
        employee_id: EMPLOYEE,
        incident_type: "delay".into(),
        description: description.into(),
        incident_date: monday_at(8, 0).date(),
        evidence: vec![Evidence::from_bytes("photo.jpg", "image/jpeg", b"\xff\xd8evidence")],
        idempotency_key: uuid::Uuid::new_v4(),
    }
}
