//! 运行配置（JSON5），所有字段都有默认值，配置文件只需写要改的部分

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::dates::DEFAULT_EXTRAPOLATION_DAYS;
use crate::core::error::{Result, TimelineError};
use crate::core::photo::PhotoConfig;
use crate::core::segment::{ChunkConfig, PostConfig};
use crate::core::signals::{default_tag_rules, TagRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 动态流的主人，写入时间线文档
    pub subject: String,
    pub chunks_dir: PathBuf,
    pub output_dir: PathBuf,
    /// 单元之间的停顿，压低持续负载
    pub cooldown_ms: u64,
    pub chunking: ChunkConfig,
    pub posts: PostConfig,
    pub photos: PhotoConfig,
    pub tags: Vec<TagRule>,
    /// 源文件名，最新的在前
    pub source_order: Vec<String>,
    pub extrapolation_days: i64,
    /// 逐行统计等并行计算的线程数上限，默认 1（完全顺序）
    pub worker_threads: usize,
    /// 按日期重命名后的图片导出目录
    pub export_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subject: String::new(),
            chunks_dir: PathBuf::from("chunks"),
            output_dir: PathBuf::from("output"),
            cooldown_ms: 2000,
            chunking: ChunkConfig::default(),
            posts: PostConfig::default(),
            photos: PhotoConfig::default(),
            tags: default_tag_rules(),
            source_order: Vec::new(),
            extrapolation_days: DEFAULT_EXTRAPOLATION_DAYS,
            worker_threads: 1,
            export_dir: PathBuf::from("organized_images"),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json5(&raw)
    }

    pub fn from_json5(raw: &str) -> Result<Self> {
        let config: PipelineConfig = json5::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 无停顿，用于测试和小输入
    pub fn for_quick_run() -> Self {
        Self {
            cooldown_ms: 0,
            ..Self::default()
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// 图像处理所在的有界线程池，持续负载不超过
    /// `worker_threads` 个核
    pub fn worker_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .thread_name(|i| format!("feed-timeline-{i}"))
            .build()
            .map_err(|e| TimelineError::Config(format!("worker pool: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(TimelineError::Config("worker_threads must be at least 1".into()));
        }
        if self.chunking.max_chunk_height == 0 {
            return Err(TimelineError::Config("chunking.max_chunk_height must be > 0".into()));
        }
        if let Some(column) = &self.chunking.content_column {
            if column.left >= column.right {
                return Err(TimelineError::Config(format!(
                    "chunking.content_column left {} must be < right {}",
                    column.left, column.right
                )));
            }
        }
        if self.photos.min_aspect > self.photos.max_aspect {
            return Err(TimelineError::Config(format!(
                "photos.min_aspect {} exceeds max_aspect {}",
                self.photos.min_aspect, self.photos.max_aspect
            )));
        }
        if !(1..=100).contains(&self.photos.jpeg_quality) {
            return Err(TimelineError::Config(format!(
                "photos.jpeg_quality {} outside 1..=100",
                self.photos.jpeg_quality
            )));
        }
        if self.extrapolation_days <= 0 {
            return Err(TimelineError::Config("extrapolation_days must be positive".into()));
        }
        Ok(())
    }
}
