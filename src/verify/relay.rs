//! Capability providers fed by the local UI over the agent API.
//!
//! The UI owns the camera, the face model and geolocation. It pushes frames
//! with the detection it computed for them, and answers position requests
//! while a session waits in `GeoCheck`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Instant, timeout};
use tracing::debug;

use super::providers::{CaptureError, FeatureExtractor, LocationService, PositionError, VideoSource};
use crate::error::ValidationError;
use crate::model::employee::Coordinates;
use crate::model::face::{Detection, Frame};

/// A frame as the UI sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct FramePush {
    pub width: u32,
    pub height: u32,
    /// Base64 JPEG; only needed when the frame may become a first enrollment.
    #[serde(default)]
    pub jpeg_base64: Option<String>,
    #[serde(default)]
    pub detection: Option<Detection>,
}

struct Pushed {
    frame: Frame,
    detection: Option<Detection>,
    at: Instant,
}

/// Latest pushed frame. Each frame is handed out once, and frames older than
/// `max_age` are ignored, so a detection attempt never reuses a stale face.
pub struct FrameRelay {
    max_age: Duration,
    latest: Mutex<Option<Pushed>>,
    /// Detection that came with the frame handed out last.
    current: Mutex<Option<Detection>>,
}

impl FrameRelay {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            latest: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    pub async fn push(&self, push: FramePush) -> Result<(), ValidationError> {
        if push.width == 0 || push.height == 0 {
            return Err(ValidationError::Frame("empty frame".into()));
        }
        let jpeg = match push.jpeg_base64.as_deref() {
            Some(encoded) => BASE64
                .decode(encoded.trim())
                .map_err(|e| ValidationError::Frame(e.to_string()))?,
            None => Vec::new(),
        };
        *self.latest.lock().await = Some(Pushed {
            frame: Frame {
                width: push.width,
                height: push.height,
                jpeg,
            },
            detection: push.detection,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl VideoSource for FrameRelay {
    async fn latest_frame(&self) -> Result<Frame, CaptureError> {
        let pushed = self
            .latest
            .lock()
            .await
            .take()
            .filter(|p| p.at.elapsed() <= self.max_age)
            .ok_or_else(|| CaptureError::Camera("no fresh frame from the UI".into()))?;
        *self.current.lock().await = pushed.detection;
        Ok(pushed.frame)
    }
}

#[async_trait]
impl FeatureExtractor for FrameRelay {
    async fn load(&self) -> Result<(), CaptureError> {
        // the model runs in the UI
        Ok(())
    }

    async fn detect(&self, _frame: &Frame) -> Result<Option<Detection>, CaptureError> {
        Ok(self.current.lock().await.take())
    }
}

/// Position answered by the UI. Every request waits for a new answer, so no
/// fix is ever reused.
pub struct LocationRelay {
    timeout: Duration,
    waiting: Mutex<Option<oneshot::Sender<Result<Coordinates, String>>>>,
}

impl LocationRelay {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            waiting: Mutex::new(None),
        }
    }

    pub async fn is_waiting(&self) -> bool {
        self.waiting
            .lock()
            .await
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Answers the pending request. Returns false when nobody was waiting.
    pub async fn provide(&self, position: Result<Coordinates, String>) -> bool {
        match self.waiting.lock().await.take() {
            Some(tx) => tx.send(position).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl LocationService for LocationRelay {
    async fn current_position(&self) -> Result<Coordinates, PositionError> {
        let (tx, rx) = oneshot::channel();
        // a newer request replaces an abandoned one
        *self.waiting.lock().await = Some(tx);
        debug!("waiting for a position from the UI");

        match timeout(self.timeout, rx).await {
            Ok(Ok(answer)) => answer.map_err(PositionError),
            Ok(Err(_)) => Err(PositionError("position request was dropped".into())),
            Err(_) => {
                self.waiting.lock().await.take();
                Err(PositionError("timed out waiting for a position".into()))
            }
        }
    }
}
