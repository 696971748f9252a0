pub mod assemble;
pub mod decode;
pub mod doctor;
pub mod error;
pub mod half;
pub mod nms;
pub mod preprocess;
pub mod runtime;
pub mod session;

#[cfg(feature = "runtime-ort")]
pub mod onnx;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use error::VisionError;
pub use half::HalfRounding;
pub use nms::NmsMode;
pub use preprocess::{ImageSource, ResizeRatio};
pub use runtime::{Backend, BackendPreference, GraphOptimization, HalfTensor, InferenceSession, ModelLoader, RuntimeOptions};
pub use session::{SessionManager, SessionPhase};
pub use yolab_proto::BoundingBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Index is the class id the model emits.
    pub class_names: Vec<String>,
    pub input_width: u32,
    pub input_height: u32,

    /// Minimum fused score (objectness * best class).
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Minimum objectness, checked before the class scan.
    pub confidence_threshold: f32,

    pub runtime: RuntimeOptions,
    pub half_rounding: HalfRounding,
    pub clip_boxes: bool,
    pub nms_mode: NmsMode,
    pub max_detections: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            class_names: Vec::new(),
            input_width: 640,
            input_height: 640,
            score_threshold: 0.45,
            nms_threshold: 0.45,
            confidence_threshold: 0.45,
            runtime: RuntimeOptions::default(),
            half_rounding: HalfRounding::Truncate,
            clip_boxes: true,
            nms_mode: NmsMode::ClassAgnostic,
            max_detections: None,
        }
    }
}

impl DetectorConfig {
    pub fn new(model_path: impl Into<PathBuf>, class_names: Vec<String>) -> Self {
        Self { model_path: model_path.into(), class_names, ..Default::default() }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Values per candidate row in the model output.
    pub fn output_stride(&self) -> usize {
        decode::BOX_FIELDS + self.num_classes()
    }

    pub fn class_name(&self, class_id: usize) -> &str {
        self.class_names.get(class_id).map(String::as_str).unwrap_or("unknown")
    }

    /// Static checks only; the model file is checked by `SessionManager::configure`.
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(VisionError::invalid("model_path is empty"));
        }
        if self.class_names.is_empty() {
            return Err(VisionError::invalid("class_names must not be empty"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(VisionError::invalid(format!(
                "input size must be non-zero, got {}x{}",
                self.input_width, self.input_height
            )));
        }
        for (name, v) in [
            ("score_threshold", self.score_threshold),
            ("nms_threshold", self.nms_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(VisionError::invalid(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        if self.max_detections == Some(0) {
            return Err(VisionError::invalid("max_detections must be at least 1 when set"));
        }
        Ok(())
    }
}
