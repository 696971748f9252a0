//! Owns the loaded model and sequences one inference call:
//! preprocess -> session.run -> decode -> NMS -> normalize.
//!
//! The session sits in a single async slot. `configure` and `run_inference`
//! both take the slot, so calls queue instead of racing on the runtime
//! handle. The phase is published separately so callers can observe
//! `Configuring` while a load is in flight.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use yolab_proto::report::{DetectionReport, ReportedBox, StageTimings};
use yolab_proto::BoundingBox;

use crate::assemble::to_normalized_boxes;
use crate::decode::{decode, DecodeParams};
use crate::error::VisionError;
use crate::nms::select;
use crate::preprocess::{preprocess, ImageSource};
use crate::runtime::{select_backend, Backend, HalfTensor, InferenceSession, ModelLoader};
use crate::DetectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unconfigured,
    Configuring,
    Ready,
}

struct ActiveSession {
    config: Arc<DetectorConfig>,
    backend: Backend,
    session: Box<dyn InferenceSession>,
}

pub struct SessionManager<L> {
    loader: L,
    phase: watch::Sender<SessionPhase>,
    slot: Mutex<Option<ActiveSession>>,
}

/// Puts the phase back where it was unless the new session was committed,
/// including when the configure future is dropped mid-load.
struct PhaseRestore<'a> {
    phase: &'a watch::Sender<SessionPhase>,
    fallback: SessionPhase,
    armed: bool,
}

impl PhaseRestore<'_> {
    fn commit(mut self) {
        self.armed = false;
        self.phase.send_replace(SessionPhase::Ready);
    }
}

impl Drop for PhaseRestore<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.phase.send_replace(self.fallback);
        }
    }
}

impl<L: ModelLoader> SessionManager<L> {
    pub fn new(loader: L) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Unconfigured);
        Self { loader, phase, slot: Mutex::new(None) }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Configuration of the `Ready` session. Waits for an in-flight call.
    pub async fn active_config(&self) -> Option<Arc<DetectorConfig>> {
        self.slot.lock().await.as_ref().map(|a| a.config.clone())
    }

    pub async fn active_backend(&self) -> Option<Backend> {
        self.slot.lock().await.as_ref().map(|a| a.backend)
    }

    /// Load a model and make it the active session. On failure the previous
    /// session (if any) stays active.
    pub async fn configure(&self, config: DetectorConfig) -> Result<Backend, VisionError> {
        config.validate()?;
        match tokio::fs::metadata(&config.model_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(VisionError::ModelNotFound { path: config.model_path.clone() }),
        }

        let mut slot = self.slot.lock().await;
        let guard = PhaseRestore {
            phase: &self.phase,
            fallback: if slot.is_some() { SessionPhase::Ready } else { SessionPhase::Unconfigured },
            armed: true,
        };
        self.phase.send_replace(SessionPhase::Configuring);

        let available = self.loader.available_backends();
        let (backend, downgraded) = select_backend(config.runtime.backend, &available);
        if downgraded {
            warn!("vision: gpu requested but not available (have {:?}), using {}", available, backend);
        }

        info!("vision: loading model {} on {}", config.model_path.display(), backend);
        let session = match self.loader.load(&config.model_path, backend, &config.runtime).await {
            Ok(s) => s,
            Err(source) => {
                warn!("vision: model load failed, keeping previous state: {}", source);
                return Err(VisionError::ModelLoadFailure { path: config.model_path.clone(), source });
            }
        };

        info!(
            "vision: ready model={} input={} output={} classes={} size={}x{}",
            config.model_path.display(),
            session.input_name(),
            session.output_name(),
            config.num_classes(),
            config.input_width,
            config.input_height
        );
        *slot = Some(ActiveSession { config: Arc::new(config), backend, session });
        guard.commit();
        Ok(backend)
    }

    pub async fn run_inference(&self, image: &ImageSource) -> Result<Vec<BoundingBox>, VisionError> {
        Ok(self.run_inference_detailed(image).await?.bounding_boxes())
    }

    pub async fn run_inference_detailed(&self, image: &ImageSource) -> Result<DetectionReport, VisionError> {
        if self.phase() != SessionPhase::Ready {
            return Err(VisionError::NotInitialized);
        }
        let mut slot = self.slot.lock().await;
        let active = slot.as_mut().ok_or(VisionError::NotInitialized)?;
        let cfg = active.config.clone();

        let t = Instant::now();
        let pre = preprocess(image, cfg.input_width, cfg.input_height, cfg.half_rounding)?;
        let preprocess_ms = ms(t);

        let input = HalfTensor::new(
            vec![1, 3, cfg.input_height as usize, cfg.input_width as usize],
            pre.tensor,
        );
        let t = Instant::now();
        let output = active
            .session
            .run(input)
            .await
            .map_err(|source| VisionError::InferenceRuntime { source })?;
        let run_ms = ms(t);
        check_output(&output, cfg.output_stride())?;

        let candidates = output.data.len() / cfg.output_stride();

        let t = Instant::now();
        let params = DecodeParams {
            num_classes: cfg.num_classes(),
            confidence_threshold: cfg.confidence_threshold,
            score_threshold: cfg.score_threshold,
            original_width: pre.original_width,
            original_height: pre.original_height,
            clip_boxes: cfg.clip_boxes,
        };
        let decoded = decode(&output.data, pre.resize_ratio, &params)?;
        let decode_ms = ms(t);

        let t = Instant::now();
        let keep = select(&decoded, cfg.nms_mode, cfg.nms_threshold, cfg.max_detections);
        let boxes = to_normalized_boxes(&keep, &decoded.boxes, &decoded.class_ids, pre.original_width, pre.original_height);
        let nms_ms = ms(t);

        debug!(
            "vision: {} candidates -> {} decoded -> {} kept (pre={:.1}ms run={:.1}ms decode={:.1}ms nms={:.1}ms)",
            candidates,
            decoded.len(),
            boxes.len(),
            preprocess_ms,
            run_ms,
            decode_ms,
            nms_ms
        );

        let boxes = keep
            .iter()
            .zip(boxes)
            .map(|(&i, bbox)| ReportedBox {
                class_name: cfg.class_name(bbox.class).to_string(),
                score: decoded.scores[i],
                bbox,
            })
            .collect();

        Ok(DetectionReport {
            ts_unix_ms: DetectionReport::now_unix_ms(),
            image_width: pre.original_width,
            image_height: pre.original_height,
            backend: active.backend.to_string(),
            candidates,
            decoded: decoded.len(),
            boxes,
            timings: StageTimings { preprocess_ms, run_ms, decode_ms, nms_ms },
        })
    }
}

/// Accepts `[.., N, stride]` or a flat buffer whose length divides by `stride`.
fn check_output(output: &HalfTensor, stride: usize) -> Result<(), VisionError> {
    if !output.shape.is_empty() && output.element_count() != output.data.len() {
        return Err(VisionError::MalformedOutput(format!(
            "shape {:?} describes {} values but buffer holds {}",
            output.shape,
            output.element_count(),
            output.data.len()
        )));
    }
    if output.shape.len() >= 2 {
        let last = output.shape[output.shape.len() - 1];
        if last != stride {
            return Err(VisionError::MalformedOutput(format!(
                "output shape {:?} has row width {}, expected {} (5 + classes)",
                output.shape, last, stride
            )));
        }
    }
    if output.data.len() % stride != 0 {
        return Err(VisionError::MalformedOutput(format!(
            "output length {} is not a multiple of stride {}",
            output.data.len(),
            stride
        )));
    }
    Ok(())
}

fn ms(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}
