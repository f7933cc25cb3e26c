//! 日期修正：对已生成的时间线做日期重建并原地改写，之后可按日期导出图片

use std::path::Path;

use log::info;

use crate::core::checkpoint::write_json_atomic;
use crate::core::dates::{load_known_dates, DateReconstructor, ReconstructionReport};
use crate::core::error::Result;
use crate::core::export::{ExportReport, ImageExporter};
use crate::core::timeline::Timeline;

pub struct DateFixer {
    source_order: Vec<String>,
    extrapolation_days: i64,
}

impl DateFixer {
    /// `source_order` 为空时退回到时间线自己的源列表
    pub fn create(source_order: Vec<String>, extrapolation_days: i64) -> Self {
        Self {
            source_order,
            extrapolation_days,
        }
    }

    fn reconstructor(&self, timeline: &Timeline) -> DateReconstructor {
        let order = if self.source_order.is_empty() {
            timeline.source_files.clone()
        } else {
            self.source_order.clone()
        };
        DateReconstructor::new(order).with_extrapolation_days(self.extrapolation_days)
    }

    pub fn fix(&self, timeline: &mut Timeline, known_dates: &[chrono::NaiveDate]) -> ReconstructionReport {
        self.reconstructor(timeline)
            .reconstruct(&mut timeline.posts, known_dates)
    }

    /// 把已修正日期的时间线里的图片按 `{日期}_{描述}.jpg` 复制到 `export_dir`
    ///
    /// 图片路径相对时间线文件所在目录解析，帖子按滚动顺序处理。
    pub fn export_images(&self, timeline_path: &Path, export_dir: &Path) -> Result<ExportReport> {
        let raw = std::fs::read_to_string(timeline_path)?;
        let timeline: Timeline = serde_json::from_str(&raw)?;
        let order = self.reconstructor(&timeline).scroll_order(&timeline.posts);
        let output_dir = timeline_path.parent().unwrap_or_else(|| Path::new("."));
        ImageExporter::new(export_dir).export(&timeline, &order, output_dir)
    }

    /// 读取 `timeline_path`，重建日期（可选对照已知日期文件），
    /// 再原子地写回
    pub fn fix_file(&self, timeline_path: &Path, known_dates_path: Option<&Path>) -> Result<ReconstructionReport> {
        let raw = std::fs::read_to_string(timeline_path)?;
        let mut timeline: Timeline = serde_json::from_str(&raw)?;

        let known = match known_dates_path {
            Some(path) => {
                let dates = load_known_dates(path)?;
                info!("📅 {} known dates from {:?}", dates.len(), path);
                dates
            }
            None => Vec::new(),
        };

        let report = self.fix(&mut timeline, &known);
        write_json_atomic(timeline_path, &timeline)?;
        Ok(report)
    }
}
