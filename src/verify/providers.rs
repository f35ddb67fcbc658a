//! Device capabilities the pipeline consumes but does not implement.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::model::employee::Coordinates;
use crate::model::face::{Detection, Frame};

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Camera(String),

    #[error("face model unavailable: {0}")]
    Model(String),
}

#[derive(Debug, Clone, Error)]
#[error("position error: {0}")]
pub struct PositionError(pub String);

/// Live video. Only the latest frame is ever requested.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn latest_frame(&self) -> Result<Frame, CaptureError>;
}

/// Face detector + descriptor extractor.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Loads model weights. Called at most once per [`ModelHandle`].
    async fn load(&self) -> Result<(), CaptureError>;

    async fn detect(&self, frame: &Frame) -> Result<Option<Detection>, CaptureError>;
}

/// Single-shot, high-accuracy position without cached fixes.
#[async_trait]
pub trait LocationService: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, PositionError>;
}

/// The device capabilities a verification context is built with.
pub struct Devices {
    pub video: Arc<dyn VideoSource>,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub location: Arc<dyn LocationService>,
}

/// Extractor whose models are loaded lazily, once.
pub struct ModelHandle {
    extractor: Arc<dyn FeatureExtractor>,
    loaded: OnceCell<()>,
}

impl ModelHandle {
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            extractor,
            loaded: OnceCell::new(),
        }
    }

    /// Idempotent; a failed load is retried on the next call.
    pub async fn ensure_loaded(&self) -> Result<&dyn FeatureExtractor, CaptureError> {
        self.loaded
            .get_or_try_init(|| async {
                tracing::debug!("loading face models");
                self.extractor.load().await
            })
            .await?;
        Ok(self.extractor.as_ref())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }
}
