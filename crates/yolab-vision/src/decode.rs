use tracing::{debug, trace};

use crate::error::VisionError;
use crate::half::f16_slice_to_f32;
use crate::preprocess::ResizeRatio;

/// Per-candidate prefix before the class scores: cx, cy, w, h, objectness.
pub const BOX_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub num_classes: usize,
    pub confidence_threshold: f32,
    pub score_threshold: f32,
    pub original_width: u32,
    pub original_height: u32,
    /// Clamp corners into `[0, original_width] x [0, original_height]`.
    pub clip_boxes: bool,
}

impl DecodeParams {
    pub fn stride(&self) -> usize {
        BOX_FIELDS + self.num_classes
    }
}

/// Surviving candidates as parallel arrays. `boxes` are pixel corners
/// `[x1, y1, x2, y2]` in the original image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub boxes: Vec<[f32; 4]>,
    pub scores: Vec<f32>,
    pub class_ids: Vec<usize>,
    /// Row of each survivor in the raw output.
    pub candidates: Vec<usize>,
}

impl Decoded {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

pub fn decode(output: &[u16], ratio: ResizeRatio, params: &DecodeParams) -> Result<Decoded, VisionError> {
    decode_f32(&f16_slice_to_f32(output), ratio, params)
}

/// Layout per candidate: `[cx, cy, w, h, obj, cls0..clsN]`, in model input pixels.
pub fn decode_f32(raw: &[f32], ratio: ResizeRatio, params: &DecodeParams) -> Result<Decoded, VisionError> {
    if params.num_classes == 0 {
        return Err(VisionError::invalid("num_classes must be at least 1"));
    }
    let stride = params.stride();
    if raw.len() % stride != 0 {
        return Err(VisionError::MalformedOutput(format!(
            "output length {} is not a multiple of stride {}",
            raw.len(),
            stride
        )));
    }

    let mut out = Decoded::default();
    for (i, cand) in raw.chunks_exact(stride).enumerate() {
        let obj = cand[4];
        if !(obj >= params.confidence_threshold) {
            continue;
        }

        let classes = &cand[BOX_FIELDS..];
        // NaN class scores never win the scan.
        let mut best_c = 0usize;
        let mut best_p = f32::NEG_INFINITY;
        for (c, &p) in classes.iter().enumerate() {
            if p > best_p {
                best_p = p;
                best_c = c;
            }
        }

        let score = obj * best_p;
        if !(score >= params.score_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (cand[0], cand[1], cand[2], cand[3]);
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w < 0.0 || h < 0.0 {
            trace!("vision: dropping candidate {} with degenerate box ({}, {}, {}, {})", i, cx, cy, w, h);
            continue;
        }

        let mut bbox = [
            (cx - w / 2.0) * ratio.x,
            (cy - h / 2.0) * ratio.y,
            (cx + w / 2.0) * ratio.x,
            (cy + h / 2.0) * ratio.y,
        ];
        if params.clip_boxes {
            let (iw, ih) = (params.original_width as f32, params.original_height as f32);
            bbox[0] = bbox[0].clamp(0.0, iw);
            bbox[1] = bbox[1].clamp(0.0, ih);
            bbox[2] = bbox[2].clamp(0.0, iw);
            bbox[3] = bbox[3].clamp(0.0, ih);
            if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
                trace!("vision: dropping candidate {} outside the image after clipping", i);
                continue;
            }
        }

        out.boxes.push(bbox);
        out.scores.push(score);
        out.class_ids.push(best_c);
        out.candidates.push(i);
    }

    debug!("vision: decoded {} of {} candidates", out.len(), raw.len() / stride);
    Ok(out)
}
