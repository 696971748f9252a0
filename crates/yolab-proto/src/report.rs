use serde::{Deserialize, Serialize};

use crate::BoundingBox;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedBox {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub class_name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub preprocess_ms: f64,
    pub run_ms: f64,
    pub decode_ms: f64,
    pub nms_ms: f64,
}

/// One inference call, as written by `yolab detect --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub ts_unix_ms: i64,
    pub image_width: u32,
    pub image_height: u32,
    pub backend: String,
    /// Candidate rows in the raw model output.
    pub candidates: usize,
    /// Rows that passed both decode thresholds, before NMS.
    pub decoded: usize,
    pub boxes: Vec<ReportedBox>,
    pub timings: StageTimings,
}

impl DetectionReport {
    pub fn now_unix_ms() -> i64 {
        (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn bounding_boxes(&self) -> Vec<BoundingBox> {
        self.boxes.iter().map(|b| b.bbox).collect()
    }
}
