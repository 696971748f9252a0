use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, RgbImage};
use tracing::debug;

use crate::error::VisionError;
use crate::half::{f32_slice_to_f16, HalfRounding};

const CHANNELS: usize = 3;

/// Where the pixels come from. Encoded variants are decoded with `image`.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Encoded(Vec<u8>),
    Rgb(RgbImage),
}

impl From<PathBuf> for ImageSource {
    fn from(p: PathBuf) -> Self {
        ImageSource::Path(p)
    }
}

impl From<&Path> for ImageSource {
    fn from(p: &Path) -> Self {
        ImageSource::Path(p.to_path_buf())
    }
}

impl From<RgbImage> for ImageSource {
    fn from(img: RgbImage) -> Self {
        ImageSource::Rgb(img)
    }
}

/// Original size over model input size, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeRatio {
    pub x: f32,
    pub y: f32,
}

impl ResizeRatio {
    pub const IDENTITY: ResizeRatio = ResizeRatio { x: 1.0, y: 1.0 };
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Planar RGB, `[3, H, W]`, half precision bit patterns.
    pub tensor: Vec<u16>,
    pub original_width: u32,
    pub original_height: u32,
    pub resize_ratio: ResizeRatio,
}

pub fn load_rgb(source: &ImageSource) -> Result<Cow<'_, RgbImage>, VisionError> {
    let img = match source {
        ImageSource::Rgb(img) => Cow::Borrowed(img),
        ImageSource::Path(p) => {
            let dynimg = image::open(p).map_err(|e| VisionError::ImageDecode {
                reason: format!("cannot decode {}", p.display()),
                source: Some(e),
            })?;
            Cow::Owned(dynimg.to_rgb8())
        }
        ImageSource::Encoded(bytes) => {
            let dynimg = image::load_from_memory(bytes).map_err(|e| VisionError::ImageDecode {
                reason: format!("cannot decode {} byte buffer", bytes.len()),
                source: Some(e),
            })?;
            Cow::Owned(dynimg.to_rgb8())
        }
    };

    if img.width() == 0 || img.height() == 0 {
        return Err(VisionError::ImageDecode {
            reason: format!("empty image {}x{}", img.width(), img.height()),
            source: None,
        });
    }
    Ok(img)
}

pub fn preprocess(
    source: &ImageSource,
    input_w: u32,
    input_h: u32,
    rounding: HalfRounding,
) -> Result<Preprocessed, VisionError> {
    let rgb = load_rgb(source)?;
    Ok(preprocess_rgb(&rgb, input_w, input_h, rounding))
}

/// Stretch to `input_w x input_h` (no letterboxing), scale to [0,1] and lay out
/// channel-major.
pub fn preprocess_rgb(rgb: &RgbImage, input_w: u32, input_h: u32, rounding: HalfRounding) -> Preprocessed {
    let (original_width, original_height) = rgb.dimensions();
    let resize_ratio = ResizeRatio {
        x: original_width as f32 / input_w as f32,
        y: original_height as f32 / input_h as f32,
    };

    let resized = if (original_width, original_height) == (input_w, input_h) {
        Cow::Borrowed(rgb)
    } else {
        Cow::Owned(image::imageops::resize(rgb, input_w, input_h, FilterType::Triangle))
    };

    let planar = to_planar(&resized);
    debug!(
        "vision: preprocessed {}x{} -> {}x{} ratio=({:.3},{:.3})",
        original_width, original_height, input_w, input_h, resize_ratio.x, resize_ratio.y
    );

    Preprocessed {
        tensor: f32_slice_to_f16(&planar, rounding),
        original_width,
        original_height,
        resize_ratio,
    }
}

/// HWC u8 -> CHW f32 in [0,1].
pub fn to_planar(rgb: &RgbImage) -> Vec<f32> {
    let w = rgb.width() as usize;
    let plane = w * rgb.height() as usize;
    let mut out = vec![0.0f32; plane * CHANNELS];
    for (x, y, px) in rgb.enumerate_pixels() {
        let idx = y as usize * w + x as usize;
        for c in 0..CHANNELS {
            out[c * plane + idx] = f32::from(px[c]) / 255.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::half::f16_to_f32;
    use image::Rgb;

    #[test]
    fn planar_layout_is_channel_major() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(0, 1, Rgb([0, 0, 255]));
        img.put_pixel(1, 1, Rgb([255, 255, 255]));

        let p = to_planar(&img);
        assert_eq!(p.len(), 12);
        assert_eq!(&p[0..4], &[1.0, 0.0, 0.0, 1.0]); // R plane
        assert_eq!(&p[4..8], &[0.0, 1.0, 0.0, 1.0]); // G plane
        assert_eq!(&p[8..12], &[0.0, 0.0, 1.0, 1.0]); // B plane
    }

    #[test]
    fn ratio_and_tensor_size() {
        let img = RgbImage::from_pixel(1280, 320, Rgb([51, 102, 204]));
        let out = preprocess_rgb(&img, 640, 640, HalfRounding::Truncate);
        assert_eq!(out.tensor.len(), 3 * 640 * 640);
        assert_eq!(out.resize_ratio, ResizeRatio { x: 2.0, y: 0.5 });
        assert_eq!((out.original_width, out.original_height), (1280, 320));

        // A flat image stays flat through the bilinear resize.
        let plane = 640 * 640;
        assert!((f16_to_f32(out.tensor[0]) - 0.2).abs() < 1e-3);
        assert!((f16_to_f32(out.tensor[plane + 17]) - 0.4).abs() < 1e-3);
        assert!((f16_to_f32(out.tensor[2 * plane + plane - 1]) - 0.8).abs() < 1e-3);
    }

    #[test]
    fn same_size_input_is_not_resampled() {
        let img = RgbImage::from_fn(4, 4, |x, y| Rgb([(x * 60) as u8, (y * 60) as u8, 0]));
        let out = preprocess_rgb(&img, 4, 4, HalfRounding::Truncate);
        assert_eq!(out.resize_ratio, ResizeRatio::IDENTITY);
        // Pixel (3, 1): R = 180, G = 60.
        let r = f16_to_f32(out.tensor[4 + 3]);
        let g = f16_to_f32(out.tensor[16 + 4 + 3]);
        assert!((r - 180.0 / 255.0).abs() < 1e-3);
        assert!((g - 60.0 / 255.0).abs() < 1e-3);
    }

    #[test]
    fn missing_file_is_decode_error() {
        let src = ImageSource::Path(PathBuf::from("/definitely/not/here.png"));
        let err = preprocess(&src, 640, 640, HalfRounding::Truncate).unwrap_err();
        assert!(matches!(err, VisionError::ImageDecode { source: Some(_), .. }));
    }

    #[test]
    fn garbage_bytes_are_decode_error() {
        let src = ImageSource::Encoded(vec![0u8, 1, 2, 3, 4]);
        assert!(matches!(
            load_rgb(&src).unwrap_err(),
            VisionError::ImageDecode { .. }
        ));
    }

    #[test]
    fn empty_image_is_rejected() {
        let src = ImageSource::Rgb(RgbImage::new(0, 10));
        assert!(matches!(
            load_rgb(&src).unwrap_err(),
            VisionError::ImageDecode { source: None, .. }
        ));
    }
}
