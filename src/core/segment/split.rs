//! 预处理：把整页截图按分隔带切成块文件，并写出清单
//!
//! 只在分隔带中心下刀，绝不切穿内容。清单里的每一项就是后续流水线的
//! 一个处理单元。

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::divider::{DividerDetector, Gap};
use super::region::{plan_chunks, ChunkConfig, ContentColumn};
use crate::core::checkpoint::{write_atomic, write_json_atomic};
use crate::core::error::{Result, TimelineError};
use crate::core::raster::{crop_box, crop_rows, encode_jpeg, load_rgb};

pub const MANIFEST_FILE: &str = "manifest.json";
const CHUNK_PREFIX: &str = "fb";

/// 一个处理单元：从源截图切出的块文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub file: String,
    pub source: String,
    /// 源在本次运行中的位置，从 1 开始
    pub source_index: u32,
    pub chunk_index: u32,
    pub y_start: u32,
    pub y_end: u32,
    pub height: u32,
    pub width: u32,
    #[serde(default)]
    pub dividers_inside: usize,
    /// 裁到内容列时记录原始宽度和裁剪范围；`width` 是裁剪后的宽度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<ColumnCrop>,
}

impl UnitDescriptor {
    /// 块像素在源截图中的水平偏移
    pub fn x_offset(&self) -> u32 {
        self.crop.map_or(0, |c| c.left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCrop {
    pub original_width: u32,
    pub left: u32,
    pub right_edge: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub total_chunks: usize,
    pub total_dividers_detected: usize,
    pub source_files: Vec<String>,
    pub max_chunk_height: u32,
    pub chunks: Vec<UnitDescriptor>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        if manifest.chunks.is_empty() {
            return Err(TimelineError::EmptyManifest);
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

pub struct SourceSplitter {
    config: ChunkConfig,
    jpeg_quality: u8,
}

impl SourceSplitter {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            jpeg_quality: 92,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// 块文件名：`fb{source_index}_chunk_{idx:03}.jpg`
    pub fn chunk_name(&self, source_index: u32, chunk_index: u32) -> String {
        format!("{}{}_chunk_{:03}.jpg", CHUNK_PREFIX, source_index, chunk_index)
    }

    /// 把一张截图切成块文件，写到 `out_dir` 下
    /// 返回单元描述和找到的所有间隙
    pub fn split_source(
        &self,
        source: &Path,
        source_index: u32,
        out_dir: &Path,
    ) -> Result<(Vec<UnitDescriptor>, Vec<Gap>)> {
        let source_name = file_name(source);
        info!("✂️ splitting {}", source_name);

        let img = load_rgb(source)?;
        let (width, height) = img.dimensions();
        let gaps = DividerDetector::with_config(self.config.divider.clone()).find_gaps(&img);
        debug!("   {}x{}, {} dividers", width, height, gaps.len());

        let regions = plan_chunks(&source_name, &gaps, height, self.config.max_chunk_height);
        fs::create_dir_all(out_dir)?;

        let mut units = Vec::with_capacity(regions.len());
        for (idx, region) in regions.iter().enumerate() {
            let chunk_index = idx as u32;
            let file = self.chunk_name(source_index, chunk_index);
            let chunk = crop_rows(&img, region.start_row, region.end_row);
            let (chunk, crop) = self.crop_to_column(chunk, source_index, chunk_index);
            write_atomic(&out_dir.join(&file), &encode_jpeg(&chunk, self.jpeg_quality)?)?;

            let dividers_inside = gaps
                .iter()
                .filter(|g| g.start_row >= region.start_row && g.end_row <= region.end_row)
                .count();
            debug!(
                "   {}: y={}-{} ({}px), {} dividers inside",
                file,
                region.start_row,
                region.end_row,
                region.height(),
                dividers_inside
            );

            units.push(UnitDescriptor {
                file,
                source: source_name.clone(),
                source_index,
                chunk_index,
                y_start: region.start_row,
                y_end: region.end_row,
                height: region.height(),
                width: chunk.width(),
                dividers_inside,
                crop,
            });
        }

        Ok((units, gaps))
    }

    fn crop_to_column(&self, chunk: RgbImage, source_index: u32, chunk_index: u32) -> (RgbImage, Option<ColumnCrop>) {
        let column: ContentColumn = match self.config.content_column {
            Some(c) => c,
            None => return (chunk, None),
        };
        if column.keep_header && source_index == 1 && chunk_index == 0 {
            debug!("   header chunk kept full-width");
            return (chunk, None);
        }
        let original_width = chunk.width();
        if original_width < column.right {
            debug!("   {}px wide, narrower than the content column; left as is", original_width);
            return (chunk, None);
        }

        let cropped = crop_box(&chunk, column.left, 0, column.width(), chunk.height());
        let crop = ColumnCrop {
            original_width,
            left: column.left,
            right_edge: column.right,
        };
        (cropped, Some(crop))
    }

    /// 按给定顺序切分所有源并写出 `manifest.json`
    /// 先删除上次切分留下的块文件
    pub fn split_all(&self, sources: &[PathBuf], out_dir: &Path) -> Result<Manifest> {
        fs::create_dir_all(out_dir)?;
        clear_old_chunks(out_dir)?;

        let mut manifest = Manifest {
            max_chunk_height: self.config.max_chunk_height,
            ..Manifest::default()
        };

        for (i, source) in sources.iter().enumerate() {
            let (units, gaps) = self.split_source(source, i as u32 + 1, out_dir)?;
            manifest.total_dividers_detected += gaps.len();
            manifest.source_files.push(file_name(source));
            manifest.chunks.extend(units);
        }
        manifest.total_chunks = manifest.chunks.len();

        manifest.save(&out_dir.join(MANIFEST_FILE))?;
        info!(
            "✅ {} chunks from {} sources, {} dividers",
            manifest.total_chunks,
            manifest.source_files.len(),
            manifest.total_dividers_detected
        );
        Ok(manifest)
    }
}

fn clear_old_chunks(out_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        let is_jpeg = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("jpg"));
        if is_jpeg || path.file_name().map_or(false, |n| n == MANIFEST_FILE) {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
