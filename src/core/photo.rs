//! 帖子内嵌图片提取
//!
//! 策略：Canny 边缘 → 膨胀把零散笔画连成块 → 取最外层轮廓的外接矩形，
//! 再按尺寸、宽度占比、长宽比、像素标准差过滤掉文字块和空白背景。
//! 提取从不报错：没找到就是空列表。

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::raster::{crop_box, pixel_std, to_luma};
use crate::core::timeline::ids::image_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub min_size: u32,
    /// 图片宽度至少占内容列宽度的比例
    pub min_width_ratio: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// 框内像素标准差下限，低于此值视为背景
    pub min_std: f64,
    /// 任一边小于此值即标记为缩略图
    pub thumbnail_size: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// L∞ 膨胀半径（约等于 5x5 核迭代 3 次）
    pub dilate_radius: u8,
    pub jpeg_quality: u8,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            min_size: 80,
            min_width_ratio: 0.3,
            min_aspect: 0.1,
            max_aspect: 10.0,
            min_std: 20.0,
            thumbnail_size: 200,
            canny_low: 30.0,
            canny_high: 100.0,
            dilate_radius: 6,
            jpeg_quality: 92,
        }
    }
}

/// 外接框，坐标相对于所在图像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub fn contains(&self, other: &PixelBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// 照片来自哪个帖子区域，参与生成图片 id
#[derive(Debug, Clone, Copy)]
pub struct RegionProvenance<'a> {
    pub source_file: &'a str,
    pub chunk_index: u32,
    pub region_index: u32,
}

#[derive(Debug, Clone)]
pub struct ExtractedPhoto {
    pub id: String,
    /// 区域内坐标的框
    pub bounds: PixelBox,
    pub is_thumbnail: bool,
    pub pixels: RgbImage,
}

pub struct PhotoExtractor {
    config: PhotoConfig,
}

impl PhotoExtractor {
    pub fn new() -> Self {
        Self::with_config(PhotoConfig::default())
    }

    pub fn with_config(config: PhotoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhotoConfig {
        &self.config
    }

    /// 候选照片框，先从上到下再从左到右排序
    pub fn find_boxes(&self, region: &RgbImage) -> Vec<PixelBox> {
        let (width, height) = region.dimensions();
        if width < self.config.min_size || height < self.config.min_size {
            return Vec::new();
        }

        let gray = to_luma(region);
        let edges = imageproc::edges::canny(&gray, self.config.canny_low, self.config.canny_high);
        let dilated = imageproc::morphology::dilate(&edges, Norm::LInf, self.config.dilate_radius);

        // 四周补一圈 0，贴边的边缘块才会被当成独立的外轮廓
        let padded = pad_border(&dilated);
        let mut boxes: Vec<PixelBox> = find_contours::<u32>(&padded)
            .into_iter()
            .filter(|c| c.parent.is_none())
            .filter_map(|c| {
                bounding_box(
                    c.points
                        .iter()
                        .map(|p| (p.x.saturating_sub(1).min(width - 1), p.y.saturating_sub(1).min(height - 1))),
                )
            })
            .filter(|b| self.accepts(region, b))
            .collect();

        boxes.sort_by_key(|b| (b.y, b.x));
        debug!("🖼️ {} photo candidates in {}x{} region", boxes.len(), width, height);
        boxes
    }

    fn accepts(&self, region: &RgbImage, b: &PixelBox) -> bool {
        if b.width < self.config.min_size || b.height < self.config.min_size {
            return false;
        }
        if (b.width as f32) < region.width() as f32 * self.config.min_width_ratio {
            return false;
        }
        let aspect = b.width as f32 / b.height as f32;
        if aspect < self.config.min_aspect || aspect > self.config.max_aspect {
            return false;
        }
        let roi = crop_box(region, b.x, b.y, b.width, b.height);
        pixel_std(&roi) >= self.config.min_std
    }

    /// 查找并裁剪照片。id 由来源和框的原点计算，
    /// 相同输入得到相同的 id 和像素
    pub fn extract(&self, region: &RgbImage, provenance: RegionProvenance<'_>) -> Vec<ExtractedPhoto> {
        self.find_boxes(region)
            .into_iter()
            .map(|b| ExtractedPhoto {
                id: image_id(
                    provenance.source_file,
                    provenance.chunk_index,
                    provenance.region_index,
                    b.x,
                    b.y,
                ),
                bounds: b,
                is_thumbnail: b.width < self.config.thumbnail_size
                    || b.height < self.config.thumbnail_size,
                pixels: crop_box(region, b.x, b.y, b.width, b.height),
            })
            .collect()
    }
}

impl Default for PhotoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `mask` into a frame one pixel larger on every side, zero-filled.
fn pad_border(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut padded = GrayImage::new(width + 2, height + 2);
    for (x, y, px) in mask.enumerate_pixels() {
        padded.put_pixel(x + 1, y + 1, Luma([px[0]]));
    }
    padded
}

fn bounding_box(points: impl Iterator<Item = (u32, u32)>) -> Option<PixelBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y) in points {
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| PixelBox {
        x: x0,
        y: y0,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

    /// Paint an 8px checkerboard "photo" into `img`.
    pub fn paint_photo(img: &mut RgbImage, b: PixelBox) {
        for y in b.y..b.y + b.height {
            for x in b.x..b.x + b.width {
                let v = if ((x - b.x) / 8 + (y - b.y) / 8) % 2 == 0 { 20 } else { 230 };
                img.put_pixel(x, y, Rgb([v, v / 2, 255 - v]));
            }
        }
    }

    fn provenance() -> RegionProvenance<'static> {
        RegionProvenance {
            source_file: "fb1.png",
            chunk_index: 2,
            region_index: 1,
        }
    }

    #[test]
    fn test_uniform_region_has_no_photos() {
        let region = RgbImage::from_pixel(600, 400, Rgb([128, 128, 128]));
        assert!(PhotoExtractor::new().extract(&region, provenance()).is_empty());
    }

    #[test]
    fn test_finds_embedded_photo() {
        let mut region = RgbImage::from_pixel(600, 400, BACKGROUND);
        let photo = PixelBox { x: 50, y: 60, width: 400, height: 240 };
        paint_photo(&mut region, photo);

        let found = PhotoExtractor::new().extract(&region, provenance());
        assert_eq!(found.len(), 1);

        let b = found[0].bounds;
        assert!(b.contains(&photo));
        let region_box = PixelBox { x: 0, y: 0, width: 600, height: 400 };
        assert!(region_box.contains(&b));
        assert!(!found[0].is_thumbnail);
        assert_eq!(found[0].pixels.dimensions(), (b.width, b.height));
    }

    #[test]
    fn test_thin_text_line_rejected() {
        let mut region = RgbImage::from_pixel(600, 400, BACKGROUND);
        paint_photo(&mut region, PixelBox { x: 20, y: 100, width: 500, height: 10 });
        assert!(PhotoExtractor::new().find_boxes(&region).is_empty());
    }

    #[test]
    fn test_narrow_block_rejected() {
        let mut region = RgbImage::from_pixel(600, 400, BACKGROUND);
        paint_photo(&mut region, PixelBox { x: 20, y: 50, width: 100, height: 200 });
        assert!(PhotoExtractor::new().find_boxes(&region).is_empty());
    }

    #[test]
    fn test_small_photo_is_thumbnail() {
        let mut region = RgbImage::from_pixel(400, 300, BACKGROUND);
        paint_photo(&mut region, PixelBox { x: 40, y: 40, width: 160, height: 120 });

        let found = PhotoExtractor::new().extract(&region, provenance());
        assert_eq!(found.len(), 1);
        assert!(found[0].is_thumbnail);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let mut region = RgbImage::from_pixel(600, 500, BACKGROUND);
        paint_photo(&mut region, PixelBox { x: 30, y: 30, width: 500, height: 200 });
        paint_photo(&mut region, PixelBox { x: 30, y: 300, width: 300, height: 150 });

        let extractor = PhotoExtractor::new();
        let first = extractor.extract(&region, provenance());
        let second = extractor.extract(&region.clone(), provenance());

        assert_eq!(first.len(), 2);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.bounds, b.bounds);
            assert_eq!(a.pixels.as_raw(), b.pixels.as_raw());
        }
        assert_ne!(first[0].id, first[1].id);
        assert!(first[0].bounds.y < first[1].bounds.y);
    }

    #[test]
    fn test_full_width_photo_touching_edges() {
        let mut region = RgbImage::from_pixel(600, 400, BACKGROUND);
        let photo = PixelBox { x: 0, y: 80, width: 600, height: 250 };
        paint_photo(&mut region, photo);

        let found = PhotoExtractor::new().find_boxes(&region);
        assert_eq!(found.len(), 1);
        let b = found[0];
        assert!(b.x <= 2);
        assert!(b.x + b.width >= 598 && b.x + b.width <= 600);
        assert!(b.y <= photo.y && b.y + b.height >= photo.y + photo.height);
    }

    #[test]
    fn test_photo_found_beside_margin_stripe() {
        let mut region = RgbImage::from_pixel(600, 400, BACKGROUND);
        for y in 0..400 {
            for x in 5..25 {
                region.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let photo = PixelBox { x: 50, y: 60, width: 400, height: 250 };
        paint_photo(&mut region, photo);

        let found = PhotoExtractor::new().find_boxes(&region);
        assert_eq!(found.len(), 1);
        assert!(found[0].contains(&photo));
        assert!(found[0].x > 25);
    }

    #[test]
    fn test_pad_border() {
        let mask = GrayImage::from_pixel(3, 2, Luma([255]));
        let padded = pad_border(&mask);
        assert_eq!(padded.dimensions(), (5, 4));
        assert_eq!(padded.get_pixel(0, 0)[0], 0);
        assert_eq!(padded.get_pixel(1, 1)[0], 255);
        assert_eq!(padded.get_pixel(4, 3)[0], 0);
    }

    #[test]
    fn test_bounding_box() {
        let b = bounding_box([(5, 9), (2, 3), (7, 4)].into_iter()).unwrap();
        assert_eq!(b, PixelBox { x: 2, y: 3, width: 6, height: 7 });
        assert!(bounding_box(std::iter::empty()).is_none());
    }
}
