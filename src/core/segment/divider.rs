//! 分隔带检测：找出明亮且颜色均匀的连续行
//!
//! 信息流截图里，帖子之间是整行宽的浅灰/白色条带。逐行计算均值和标准差，
//! 同时满足"足够亮"和"足够均匀"的行即为分隔行，连续的分隔行构成一个 Gap。

use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::raster::channel_mean;

/// 一段连续的分隔行 `[start_row, end_row)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start_row: u32,
    pub end_row: u32,
}

impl Gap {
    pub fn height(&self) -> u32 {
        self.end_row - self.start_row
    }

    pub fn center(&self) -> u32 {
        self.start_row + self.height() / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowStats {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DividerConfig {
    /// 行均值下限 (0-255)
    pub brightness_threshold: f64,
    /// 行标准差上限
    pub uniformity_threshold: f64,
    /// 连续分隔行的最小高度，低于此值视为噪声
    pub min_gap_height: u32,
}

impl Default for DividerConfig {
    fn default() -> Self {
        Self::for_posts()
    }
}

impl DividerConfig {
    /// 整张截图切块：只认非常白、非常均匀的分隔带
    pub fn for_chunking() -> Self {
        Self {
            brightness_threshold: 225.0,
            uniformity_threshold: 6.0,
            min_gap_height: 8,
        }
    }

    /// 块内切帖子：阈值稍宽
    pub fn for_posts() -> Self {
        Self {
            brightness_threshold: 220.0,
            uniformity_threshold: 8.0,
            min_gap_height: 8,
        }
    }
}

pub struct DividerDetector {
    config: DividerConfig,
}

impl DividerDetector {
    pub fn new() -> Self {
        Self::with_config(DividerConfig::default())
    }

    pub fn with_config(config: DividerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DividerConfig {
        &self.config
    }

    /// 每行通道均值灰度的均值和总体标准差
    pub fn row_profile(img: &RgbImage) -> Vec<RowStats> {
        let width = img.width() as usize;
        let raw = img.as_raw();
        if width == 0 {
            return vec![RowStats { mean: 0.0, std: 0.0 }; img.height() as usize];
        }

        raw.par_chunks_exact(width * 3)
            .map(|row| {
                let mut sum = 0.0;
                let mut sum_sq = 0.0;
                for px in row.chunks_exact(3) {
                    let gray = channel_mean(&image::Rgb([px[0], px[1], px[2]]));
                    sum += gray;
                    sum_sq += gray * gray;
                }
                let n = width as f64;
                let mean = sum / n;
                // 数值误差可能让方差略小于 0
                let variance = (sum_sq / n - mean * mean).max(0.0);
                RowStats {
                    mean,
                    std: variance.sqrt(),
                }
            })
            .collect()
    }

    pub fn is_divider_row(&self, stats: &RowStats) -> bool {
        stats.mean >= self.config.brightness_threshold
            && stats.std <= self.config.uniformity_threshold
    }

    /// 找出有序且互不重叠的间隙，触及最后一行的也算
    pub fn find_gaps(&self, img: &RgbImage) -> Vec<Gap> {
        let profile = Self::row_profile(img);
        let flags: Vec<bool> = profile.iter().map(|s| self.is_divider_row(s)).collect();
        self.gaps_from_flags(&flags)
    }

    pub fn gaps_from_flags(&self, flags: &[bool]) -> Vec<Gap> {
        let mut gaps = Vec::new();
        let mut run_start: Option<usize> = None;

        for (y, &is_divider) in flags.iter().enumerate() {
            match (is_divider, run_start) {
                (true, None) => run_start = Some(y),
                (false, Some(start)) => {
                    self.push_run(&mut gaps, start, y);
                    run_start = None;
                }
                _ => {}
            }
        }

        if let Some(start) = run_start {
            self.push_run(&mut gaps, start, flags.len());
        }

        gaps
    }

    fn push_run(&self, gaps: &mut Vec<Gap>, start: usize, end: usize) {
        if end - start >= self.config.min_gap_height as usize {
            gaps.push(Gap {
                start_row: start as u32,
                end_row: end as u32,
            });
        }
    }
}

impl Default for DividerDetector {
    fn default() -> Self {
        Self::new()
    }
}
