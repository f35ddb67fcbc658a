//! Polls the live video until a well-framed face shows up, the attempt
//! ceiling is reached, or the verification is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::providers::{CaptureError, ModelHandle, VideoSource};
use crate::model::face::{BoundingBox, Detection, Frame};

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Pause before the first attempt so the user can get in position.
    pub warmup: Duration,
    /// Face width over frame width.
    pub min_size_ratio: f64,
    pub max_size_ratio: f64,
    /// Allowed horizontal distance between face center and frame center, in pixels.
    pub max_center_offset_px: f64,
    /// Framing feedback is refreshed every this many attempts.
    pub feedback_every: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
            warmup: Duration::from_secs(3),
            min_size_ratio: 0.2,
            max_size_ratio: 0.6,
            max_center_offset_px: 50.0,
            feedback_every: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    NoFace,
    TooFar,
    TooClose,
    Recenter,
    Ok,
}

impl Framing {
    pub fn message(self) -> &'static str {
        match self {
            Framing::NoFace => "Face not detected",
            Framing::TooFar => "Move a little closer",
            Framing::TooClose => "Move back a little",
            Framing::Recenter => "Center your face",
            Framing::Ok => "Face detected",
        }
    }
}

pub fn evaluate_framing(bbox: &BoundingBox, frame_width: u32, settings: &CaptureSettings) -> Framing {
    let frame_width = f64::from(frame_width);
    if frame_width <= 0.0 {
        return Framing::NoFace;
    }
    let size_ratio = bbox.width / frame_width;
    let center_x = bbox.x + bbox.width / 2.0;
    let deviation = (center_x - frame_width / 2.0).abs();

    if size_ratio < settings.min_size_ratio {
        Framing::TooFar
    } else if size_ratio > settings.max_size_ratio {
        Framing::TooClose
    } else if deviation > settings.max_center_offset_px {
        Framing::Recenter
    } else {
        Framing::Ok
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Captured { detection: Detection, frame: Frame },
    Exhausted { attempts: u32 },
    Cancelled,
}

pub struct FaceCapture {
    settings: CaptureSettings,
    video: Arc<dyn VideoSource>,
    models: Arc<ModelHandle>,
}

impl FaceCapture {
    pub fn new(settings: CaptureSettings, video: Arc<dyn VideoSource>, models: Arc<ModelHandle>) -> Self {
        Self {
            settings,
            video,
            models,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// The ticker lives inside this future, so dropping or cancelling it stops polling.
    /// Only a model that fails to load is an error; a frame or detection that
    /// fails counts as an attempt without a face.
    #[instrument(skip_all, fields(max_attempts = self.settings.max_attempts))]
    pub async fn capture(
        &self,
        cancel: &CancellationToken,
        on_feedback: &mut (dyn FnMut(&str) + Send),
    ) -> Result<CaptureOutcome, CaptureError> {
        on_feedback("Loading face models...");
        let extractor = tokio::select! {
            _ = cancel.cancelled() => return Ok(CaptureOutcome::Cancelled),
            loaded = self.models.ensure_loaded() => loaded?,
        };

        on_feedback("Get ready, detection starts in a moment...");
        tokio::select! {
            _ = cancel.cancelled() => return Ok(CaptureOutcome::Cancelled),
            _ = tokio::time::sleep(self.settings.warmup) => {}
        }
        on_feedback("Looking for your face...");

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            let attempt = async {
                ticker.tick().await;
                let frame = self.video.latest_frame().await?;
                let detection = extractor.detect(&frame).await?;
                Ok::<_, CaptureError>((frame, detection))
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(CaptureOutcome::Cancelled),
                result = attempt => result,
            };
            attempts += 1;

            let framing = match result {
                Ok((frame, Some(detection))) => {
                    let framing = evaluate_framing(&detection.bounding_box, frame.width, &self.settings);
                    if framing == Framing::Ok {
                        on_feedback(framing.message());
                        return Ok(CaptureOutcome::Captured { detection, frame });
                    }
                    framing
                }
                Ok((_, None)) => Framing::NoFace,
                Err(e) => {
                    warn!(attempts, error = %e, "detection attempt failed");
                    Framing::NoFace
                }
            };
            debug!(attempts, ?framing, "detection attempt");

            if attempts % self.settings.feedback_every.max(1) == 0 {
                on_feedback(framing.message());
            }
            if attempts >= self.settings.max_attempts {
                return Ok(CaptureOutcome::Exhausted { attempts });
            }
        }
    }
}
