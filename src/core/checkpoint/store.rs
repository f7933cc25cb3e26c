//! 断点续跑存储：时间线文档 + 已完成单元集合
//!
//! 每个单元结束后先写时间线、再写进度。进度里出现的单元，其产出一定
//! 已经落盘；反过来不成立，所以合并按 id 去重。

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::durable::write_json_atomic;
use crate::core::error::Result;
use crate::core::timeline::Timeline;

pub const TIMELINE_FILE: &str = "timeline.json";
pub const PROGRESS_FILE: &str = "progress.json";
pub const IMAGES_DIR: &str = "images";
pub const SLICES_DIR: &str = "slices";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub completed_units: BTreeSet<String>,
    pub last_unit: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn is_complete(&self, unit: &str) -> bool {
        self.completed_units.contains(unit)
    }

    pub fn mark_complete(&mut self, unit: &str) {
        self.completed_units.insert(unit.to_string());
        self.last_unit = Some(unit.to_string());
        self.updated_at = Some(Utc::now());
    }
}

pub struct CheckpointStore {
    output_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.output_dir.join(TIMELINE_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output_dir.join(PROGRESS_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_DIR)
    }

    pub fn slices_dir(&self) -> PathBuf {
        self.output_dir.join(SLICES_DIR)
    }

    /// 创建输出、图片和切片目录
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(self.images_dir())?;
        fs::create_dir_all(self.slices_dir())?;
        Ok(())
    }

    /// 文件不存在时返回空进度；文件无法读取则报错，
    /// 不会悄悄从头开始
    pub fn load_progress(&self) -> Result<Progress> {
        let path = self.progress_path();
        if !path.exists() {
            return Ok(Progress::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load_timeline(&self) -> Result<Option<Timeline>> {
        let path = self.timeline_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Timeline first, then progress.
    pub fn save(&self, timeline: &Timeline, progress: &Progress) -> Result<()> {
        write_json_atomic(&self.timeline_path(), timeline)?;
        write_json_atomic(&self.progress_path(), progress)?;
        Ok(())
    }

    /// 强制模式：删除时间线、进度以及所有已提取文件
    pub fn reset(&self) -> Result<()> {
        for file in [self.timeline_path(), self.progress_path()] {
            if file.exists() {
                fs::remove_file(&file)?;
            }
        }
        for dir in [self.images_dir(), self.slices_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        info!("🧹 cleared previous output in {:?}", self.output_dir);
        self.prepare()
    }

    /// 读取进度及其对应的时间线；只有进度没有时间线时，
    /// 视为过期并忽略
    pub fn resume_state(&self) -> Result<(Progress, Option<Timeline>)> {
        let progress = self.load_progress()?;
        let timeline = self.load_timeline()?;
        if timeline.is_none() && !progress.completed_units.is_empty() {
            warn!(
                "⚠️ progress lists {} units but no timeline exists, starting over",
                progress.completed_units.len()
            );
            return Ok((Progress::default(), None));
        }
        Ok((progress, timeline))
    }
}
