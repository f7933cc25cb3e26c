//! 时间线提取器：截图切块 + 逐块处理

use std::path::{Path, PathBuf};

use log::info;

use crate::core::config::PipelineConfig;
use crate::core::error::Result;
use crate::core::ocr::OcrContext;
use crate::core::pipeline::{prune_orphan_images, RunMode, RunSummary, TimelinePipeline};
use crate::core::segment::{Manifest, SourceSplitter, MANIFEST_FILE};

/// 截图 → 时间线
///
/// ```ignore
/// let extractor = TimelineExtractor::create(config, OcrContext::tesseract());
/// extractor.split(&screenshots)?;
/// let summary = extractor.extract(RunMode::Resume)?;
/// ```
pub struct TimelineExtractor {
    pipeline: TimelinePipeline,
}

impl TimelineExtractor {
    pub fn create(config: PipelineConfig, ocr: OcrContext) -> Self {
        info!("🎬 TimelineExtractor: created ({})", config.subject);
        Self {
            pipeline: TimelinePipeline::new(config, ocr),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.pipeline.config()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config().chunks_dir.join(MANIFEST_FILE)
    }

    /// 把源截图（最新的在前）切成块并写出 manifest
    pub fn split(&self, sources: &[PathBuf]) -> Result<Manifest> {
        let config = self.config();
        let splitter = SourceSplitter::new(config.chunking.clone()).with_jpeg_quality(config.photos.jpeg_quality);
        config
            .worker_pool()?
            .install(|| splitter.split_all(sources, &config.chunks_dir))
    }

    /// 处理 `chunks_dir` 中 manifest 的每个单元
    pub fn extract(&self, mode: RunMode) -> Result<RunSummary> {
        let manifest = Manifest::load(&self.manifest_path())?;
        self.extract_manifest(&manifest, mode)
    }

    pub fn extract_manifest(&self, manifest: &Manifest, mode: RunMode) -> Result<RunSummary> {
        let summary = self.pipeline.run(manifest, mode)?;
        let store = self.pipeline.store();
        if let Some(timeline) = store.load_timeline()? {
            let removed = prune_orphan_images(store, &timeline)?;
            if removed > 0 {
                info!("🧹 removed {} unreferenced image files", removed);
            }
        }
        Ok(summary)
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.pipeline.store().timeline_path()
    }

    pub fn output_dir(&self) -> &Path {
        self.pipeline.store().output_dir()
    }
}

impl Drop for TimelineExtractor {
    fn drop(&mut self) {
        info!("🗑️ TimelineExtractor: released");
    }
}
