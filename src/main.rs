use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

use attendance_agent::auth::AuthService;
use attendance_agent::backend::{HttpBackend, RemoteBackend};
use attendance_agent::config::Config;
use attendance_agent::db::init_db;
use attendance_agent::routes;
use attendance_agent::services::{AttendanceHistoryService, IncidentService, NotificationService};
use attendance_agent::store::{DayLedger, DeviceCipher, DeviceKeyFile, SecureStore};
use attendance_agent::sync::{Connectivity, default_dispatcher, run_sync_trigger};
use attendance_agent::verify::{
    Devices, FrameRelay, LocationRelay, VerificationContext, VerificationDesk,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "agent.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = %config.backend_url, "Agent starting...");

    let pool = init_db(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let key_file = DeviceKeyFile::new(config.device_key_path.clone());
    if !key_file.exists() {
        warn!(path = %key_file.path().display(), "no device key yet, one will be generated");
    }
    let cipher = Arc::new(DeviceCipher::new(key_file, config.kdf));
    // Argon2 derivation is slow on purpose, keep it off the async workers
    let warm = cipher.clone();
    tokio::task::spawn_blocking(move || warm.warm())
        .await
        .context("device key derivation panicked")??;
    let store = Arc::new(SecureStore::new(pool, cipher));

    let backend: Arc<dyn RemoteBackend> =
        Arc::new(HttpBackend::new(config.backend_url.clone(), config.backend_timeout)?);
    let connectivity = Connectivity::new(config.start_online);

    let ledger = Arc::new(DayLedger::new(store.clone()));
    let notifications = Arc::new(NotificationService::new(
        backend.clone(),
        store.clone(),
        connectivity.clone(),
    ));
    let incidents = Arc::new(IncidentService::new(
        backend.clone(),
        store.clone(),
        notifications.clone(),
        connectivity.clone(),
    ));
    let history = Arc::new(AttendanceHistoryService::new(
        backend.clone(),
        store.clone(),
        ledger,
        Arc::new(config.clock()),
        connectivity.clone(),
    ));
    let dispatcher = Arc::new(default_dispatcher(
        store.clone(),
        backend.clone(),
        notifications.clone(),
    ));

    // Camera frames and positions arrive from the local UI
    let frames = Arc::new(FrameRelay::new(config.frame_max_age));
    let location = Arc::new(LocationRelay::new(config.location_timeout));
    let devices = Devices {
        video: frames.clone(),
        extractor: frames.clone(),
        location: location.clone(),
    };
    let verification = Arc::new(VerificationContext::from_config(
        &config,
        devices,
        backend.clone(),
        store.clone(),
        notifications.clone(),
        connectivity.clone(),
    ));
    let auth = Arc::new(AuthService::new(backend, store.clone(), connectivity.clone()));
    let desk = Arc::new(VerificationDesk::new(verification, auth.clone()));

    let shutdown = CancellationToken::new();
    let trigger = actix_web::rt::spawn(run_sync_trigger(
        shutdown.clone(),
        dispatcher.clone(),
        connectivity.clone(),
    ));

    let api_prefix = config.api_prefix.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .app_data(Data::from(store.clone()))
            .app_data(Data::from(dispatcher.clone()))
            .app_data(Data::from(notifications.clone()))
            .app_data(Data::from(incidents.clone()))
            .app_data(Data::from(history.clone()))
            .app_data(Data::from(auth.clone()))
            .app_data(Data::from(desk.clone()))
            .app_data(Data::from(frames.clone()))
            .app_data(Data::from(location.clone()))
            .app_data(Data::new(connectivity.clone()))
            .configure(|cfg| routes::configure(cfg, &api_prefix))
    })
    .bind(&config.server_addr)?
    .run()
    .await?;

    shutdown.cancel();
    if let Err(e) = trigger.await {
        warn!(error = %e, "sync trigger ended abnormally");
    }
    info!("Agent stopped");
    Ok(())
}
