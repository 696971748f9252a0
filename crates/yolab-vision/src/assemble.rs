use yolab_proto::BoundingBox;

/// Pixel corners -> normalized centre form, in the order of `selected`.
pub fn to_normalized_boxes(
    selected: &[usize],
    boxes: &[[f32; 4]],
    class_ids: &[usize],
    original_width: u32,
    original_height: u32,
) -> Vec<BoundingBox> {
    let (w, h) = (original_width as f32, original_height as f32);
    selected
        .iter()
        .map(|&i| {
            let [x1, y1, x2, y2] = boxes[i];
            BoundingBox {
                class: class_ids[i],
                x: (x1 + x2) / (2.0 * w),
                y: (y1 + y2) / (2.0 * h),
                width: (x2 - x1) / w,
                height: (y2 - y1) / h,
            }
        })
        .collect()
}
