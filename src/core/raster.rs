//! 截图位图工具：解码、裁剪、灰度、JPEG 编码
//!
//! 整张截图可能是十亿像素级别，这里的函数都只产生新的图像（裁剪/转换），
//! 从不原地修改输入。

use std::io::Cursor;
use std::path::Path;

use image::io::Reader as ImageReader;
use image::{DynamicImage, GrayImage, ImageOutputFormat, RgbImage};

use crate::core::error::{Result, TimelineError};

/// Decode an image from disk as RGB, with transparency flattened onto white.
///
/// Decoder size limits are lifted: full-page screenshots routinely exceed the
/// default allocation cap.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(TimelineError::MissingSource(path.to_path_buf()));
    }

    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    let decoded = reader.decode()?;
    Ok(flatten_alpha(decoded))
}

/// RGBA → RGB over a white background; images without alpha are converted directly.
pub fn flatten_alpha(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.into_rgb8();
    }

    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);

    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            let blended = (src[c] as u32 * alpha + 255 * (255 - alpha)) / 255;
            dst[c] = blended as u8;
        }
    }
    rgb
}

/// Copy rows `[start, end)` into a new image. Bounds are clamped to the image.
pub fn crop_rows(img: &RgbImage, start: u32, end: u32) -> RgbImage {
    let end = end.min(img.height());
    let start = start.min(end);
    crop_box(img, 0, start, img.width(), end - start)
}

pub fn crop_box(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}

/// Luma grayscale, used by the edge detector.
pub fn to_luma(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

/// Per-pixel channel mean, matching how divider rows are measured.
#[inline]
pub fn channel_mean(pixel: &image::Rgb<u8>) -> f64 {
    (pixel[0] as f64 + pixel[1] as f64 + pixel[2] as f64) / 3.0
}

/// Population standard deviation over every channel byte of the image.
pub fn pixel_std(img: &RgbImage) -> f64 {
    let raw = img.as_raw();
    if raw.is_empty() {
        return 0.0;
    }

    let n = raw.len() as f64;
    let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = raw
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
    Ok(buffer.into_inner())
}
