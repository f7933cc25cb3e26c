//! 时间线文档数据模型：帖子、图片、待抓取目标、统计

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::photo::PixelBox;
use crate::core::signals::{DatePrecision, Signals};

pub const SCHEMA_VERSION: &str = "1.0";

/// 帖子日期的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// 从帖子自带的日期提示解析
    Parsed,
    /// 通过宽松的正文搜索找到
    Ocr,
    /// 与已知日期列表对齐
    #[serde(rename = "facebook_aligned")]
    Aligned,
    Interpolated,
    Extrapolated,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub source_file: String,
    pub chunk_file: String,
    pub chunk_index: u32,
    pub region_index: u32,
    /// 块内的行范围
    pub y_local: u32,
    pub y_local_end: u32,
    /// 源截图内的行范围
    pub y_global: u32,
    pub y_global_end: u32,
    pub height: u32,
    pub slice_file: Option<String>,
    pub ocr_text: String,
    pub signals: Signals,
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub date_parsed: Option<NaiveDate>,
    #[serde(default)]
    pub date_assigned: Option<NaiveDate>,
    #[serde(default)]
    pub date_precision: DatePrecision,
    #[serde(default)]
    pub date_source: DateSource,
    #[serde(default)]
    pub needs_review: bool,
}

impl Post {
    pub fn has_images(&self) -> bool {
        !self.image_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub post_id: String,
    pub source_file: String,
    pub chunk_index: u32,
    pub region_index: u32,
    /// 源截图坐标中的框
    pub region: PixelBox,
    pub width: u32,
    pub height: u32,
    pub saved_path: String,
    pub is_thumbnail: bool,
    pub needs_crawl: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlKind {
    /// 缩略图，需要抓取原图
    FullImage,
    /// 正文被 "See more" 截断
    TruncatedText,
    /// 帖子只显示了相册的一部分
    Album,
}

impl CrawlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlKind::FullImage => "full_image",
            CrawlKind::TruncatedText => "truncated_text",
            CrawlKind::Album => "album",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    #[default]
    Pending,
    Crawled,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub id: String,
    pub kind: CrawlKind,
    /// 目标指向的帖子或图片 id
    pub related: String,
    /// 一小段 OCR 摘录，方便定位原帖
    pub context: String,
    #[serde(default)]
    pub hint: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub status: CrawlStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub total_posts_extracted: usize,
    pub total_images_extracted: usize,
    pub total_crawl_targets: usize,
    pub ocr_engine: String,
    pub chunks_processed: usize,
    pub chunks_total: usize,
    pub failed_units: usize,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub schema_version: String,
    pub subject: String,
    pub extracted_timestamp: DateTime<Utc>,
    pub source_files: Vec<String>,
    pub posts: Vec<Post>,
    pub images: Vec<ImageRecord>,
    pub crawl_targets: Vec<CrawlTarget>,
    #[serde(default)]
    pub stats: Stats,
}

/// 一个单元处理后对时间线的全部贡献
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOutput {
    pub posts: Vec<Post>,
    pub images: Vec<ImageRecord>,
    pub crawl_targets: Vec<CrawlTarget>,
}

impl Timeline {
    pub fn new(subject: impl Into<String>, source_files: Vec<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            subject: subject.into(),
            extracted_timestamp: Utc::now(),
            source_files,
            posts: Vec::new(),
            images: Vec::new(),
            crawl_targets: Vec::new(),
            stats: Stats::default(),
        }
    }

    /// 按 id 合并单元的记录：已有的原地替换，
    /// 新的按到达顺序追加
    pub fn merge(&mut self, unit: UnitOutput) {
        upsert(&mut self.posts, unit.posts, |p| p.id.clone());
        upsert(&mut self.images, unit.images, |i| i.id.clone());
        upsert(&mut self.crawl_targets, unit.crawl_targets, |c| c.id.clone());
    }

    pub fn refresh_stats(&mut self) {
        self.stats.total_posts_extracted = self.posts.len();
        self.stats.total_images_extracted = self.images.len();
        self.stats.total_crawl_targets = self.crawl_targets.len();
    }

    pub fn image(&self, id: &str) -> Option<&ImageRecord> {
        self.images.iter().find(|i| i.id == id)
    }

    /// 图片 id 不能各自对应唯一图片记录的帖子
    pub fn dangling_image_refs(&self) -> Vec<&str> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for image in &self.images {
            *counts.entry(image.id.as_str()).or_default() += 1;
        }
        self.posts
            .iter()
            .flat_map(|p| p.image_ids.iter())
            .filter(|id| counts.get(id.as_str()) != Some(&1))
            .map(String::as_str)
            .collect()
    }
}

fn upsert<T>(existing: &mut Vec<T>, incoming: Vec<T>, key: impl Fn(&T) -> String) {
    let mut index: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, item)| (key(item), i))
        .collect();

    for item in incoming {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => existing[i] = item,
            None => {
                index.insert(k, existing.len());
                existing.push(item);
            }
        }
    }
}
