use serde::{Deserialize, Serialize};

use crate::decode::Decoded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NmsMode {
    /// Any box may suppress any other.
    #[default]
    ClassAgnostic,
    /// Only boxes sharing a class id suppress each other.
    PerClass,
}

/// Corner-form area. Inverted boxes count as empty.
pub fn area(b: &[f32; 4]) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    if ix2 < ix1 || iy2 < iy1 {
        return 0.0;
    }

    let inter = (ix2 - ix1) * (iy2 - iy1);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy NMS. Returns indices into `boxes` in acceptance order (descending
/// score, equal scores keep input order).
pub fn suppress(boxes: &[[f32; 4]], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    sweep(boxes, scores, iou_threshold, |_, _| true)
}

pub fn suppress_per_class(boxes: &[[f32; 4]], scores: &[f32], class_ids: &[usize], iou_threshold: f32) -> Vec<usize> {
    sweep(boxes, scores, iou_threshold, |a, b| class_ids[a] == class_ids[b])
}

fn sweep(boxes: &[[f32; 4]], scores: &[f32], iou_threshold: f32, competes: impl Fn(usize, usize) -> bool) -> Vec<usize> {
    let n = boxes.len().min(scores.len());
    let mut order: Vec<usize> = (0..n).collect();
    // sort_by is stable: ties keep the lower index first.
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut picked = vec![false; n];
    let mut keep = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        if picked[i] {
            continue;
        }
        picked[i] = true;
        keep.push(i);

        for &j in &order[pos + 1..] {
            if !picked[j] && competes(i, j) && iou(&boxes[i], &boxes[j]) > iou_threshold {
                picked[j] = true;
            }
        }
    }
    keep
}

/// NMS over decoder output, optionally capped at `max_detections`.
pub fn select(decoded: &Decoded, mode: NmsMode, iou_threshold: f32, max_detections: Option<usize>) -> Vec<usize> {
    let mut keep = match mode {
        NmsMode::ClassAgnostic => suppress(&decoded.boxes, &decoded.scores, iou_threshold),
        NmsMode::PerClass => suppress_per_class(&decoded.boxes, &decoded.scores, &decoded.class_ids, iou_threshold),
    };
    if let Some(max) = max_detections {
        keep.truncate(max);
    }
    keep
}
