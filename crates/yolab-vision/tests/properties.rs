//! Property tests for the pure pipeline stages.

use proptest::prelude::*;

use yolab_vision::assemble::to_normalized_boxes;
use yolab_vision::decode::{decode_f32, DecodeParams};
use yolab_vision::half::{f16_to_f32, f32_to_f16, f32_to_f16_with};
use yolab_vision::nms::{iou, suppress};
use yolab_vision::{HalfRounding, ResizeRatio};

const CLASSES: usize = 3;

fn corner_box() -> impl Strategy<Value = [f32; 4]> {
    (0.0f32..600.0, 0.0f32..600.0, 0.5f32..200.0, 0.5f32..200.0).prop_map(|(x, y, w, h)| [x, y, x + w, y + h])
}

fn candidate_row() -> impl Strategy<Value = Vec<f32>> {
    (
        0.0f32..640.0,
        0.0f32..640.0,
        0.0f32..300.0,
        0.0f32..300.0,
        0.0f32..=1.0,
        prop::collection::vec(0.0f32..=1.0, CLASSES),
    )
        .prop_map(|(cx, cy, w, h, obj, cls)| {
            let mut row = vec![cx, cy, w, h, obj];
            row.extend(cls);
            row
        })
}

// ============================================================================
// Half-precision codec
// ============================================================================

#[test]
fn half_round_trip_is_close_in_normal_range() {
    proptest!(|(mag in 6.2e-5f32..65504.0, neg in any::<bool>())| {
        let v = if neg { -mag } else { mag };
        let truncated = f16_to_f32(f32_to_f16(v));
        prop_assert!(((truncated - v) / v).abs() <= 1e-3, "{} -> {}", v, truncated);

        let nearest = f16_to_f32(f32_to_f16_with(v, HalfRounding::NearestEven));
        prop_assert!(((nearest - v) / v).abs() <= 5e-4, "{} -> {}", v, nearest);
        // Truncation never moves away from zero.
        prop_assert!(truncated.abs() <= v.abs());
    });
}

#[test]
fn half_keeps_sign_of_finite_values() {
    proptest!(|(v in any::<f32>().prop_filter("finite", |v| v.is_finite()))| {
        let sign_in = (v.to_bits() >> 31) as u16;
        prop_assert_eq!(f32_to_f16(v) >> 15, sign_in);
        prop_assert_eq!(f32_to_f16_with(v, HalfRounding::NearestEven) >> 15, sign_in);
    });
}

// ============================================================================
// IoU
// ============================================================================

#[test]
fn iou_is_bounded_and_symmetric() {
    proptest!(|(a in corner_box(), b in corner_box())| {
        let ab = iou(&a, &b);
        prop_assert!((0.0..=1.0 + 1e-6).contains(&ab));
        prop_assert_eq!(ab, iou(&b, &a));
        prop_assert_eq!(iou(&a, &a), 1.0);
    });
}

// ============================================================================
// Decoder
// ============================================================================

#[test]
fn decoder_keeps_exactly_the_rows_above_both_thresholds() {
    proptest!(|(
        rows in prop::collection::vec(candidate_row(), 0..40),
        conf in 0.0f32..=1.0,
        score_thr in 0.0f32..=1.0,
    )| {
        let raw: Vec<f32> = rows.iter().flatten().copied().collect();
        let params = DecodeParams {
            num_classes: CLASSES,
            confidence_threshold: conf,
            score_threshold: score_thr,
            original_width: 640,
            original_height: 640,
            clip_boxes: false,
        };
        let decoded = decode_f32(&raw, ResizeRatio::IDENTITY, &params).unwrap();

        let mut expected = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let obj = row[4];
            let cls = &row[5..];
            let mut best = 0;
            for c in 1..CLASSES {
                if cls[c] > cls[best] {
                    best = c;
                }
            }
            if obj >= conf && obj * cls[best] >= score_thr {
                expected.push((i, best));
            }
        }

        prop_assert_eq!(decoded.len(), expected.len());
        for (k, &(row, class)) in expected.iter().enumerate() {
            prop_assert_eq!(decoded.candidates[k], row);
            prop_assert_eq!(decoded.class_ids[k], class);
            prop_assert!(decoded.scores[k] >= score_thr);
            let [x1, y1, x2, y2] = decoded.boxes[k];
            prop_assert!(x1 <= x2 && y1 <= y2);
        }
    });
}

// ============================================================================
// NMS
// ============================================================================

#[test]
fn nms_survivors_do_not_overlap_and_rerun_is_stable() {
    proptest!(|(
        boxes in prop::collection::vec(corner_box(), 0..30),
        seed_scores in prop::collection::vec(0.0f32..=1.0, 30),
        thr in 0.05f32..0.95,
    )| {
        let scores = &seed_scores[..boxes.len()];
        let keep = suppress(&boxes, scores, thr);

        for (n, &i) in keep.iter().enumerate() {
            for &j in &keep[n + 1..] {
                prop_assert!(iou(&boxes[i], &boxes[j]) <= thr);
                prop_assert!(scores[i] >= scores[j]);
            }
        }
        for j in (0..boxes.len()).filter(|j| !keep.contains(j)) {
            prop_assert!(keep.iter().any(|&i| scores[i] >= scores[j] && iou(&boxes[i], &boxes[j]) > thr));
        }

        let kept_boxes: Vec<[f32; 4]> = keep.iter().map(|&i| boxes[i]).collect();
        let kept_scores: Vec<f32> = keep.iter().map(|&i| scores[i]).collect();
        let again = suppress(&kept_boxes, &kept_scores, thr);
        prop_assert_eq!(again, (0..keep.len()).collect::<Vec<_>>());
    });
}

// ============================================================================
// Assembler
// ============================================================================

#[test]
fn normalized_boxes_map_back_to_pixels() {
    proptest!(|(
        b in corner_box(),
        img_w in 800u32..4096,
        img_h in 800u32..4096,
        class in 0usize..80,
    )| {
        let out = to_normalized_boxes(&[0], &[b], &[class], img_w, img_h);
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out[0].class, class);
        prop_assert!(out[0].x > 0.0 && out[0].x < 1.0);
        prop_assert!(out[0].width > 0.0 && out[0].width <= 1.0);

        let back = out[0].to_pixel_corners(img_w, img_h);
        for (got, want) in back.iter().zip(b.iter()) {
            prop_assert!((got - want).abs() < 1e-2, "{:?} vs {:?}", back, b);
        }
    });
}
