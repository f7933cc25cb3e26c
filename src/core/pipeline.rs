//! 可续跑的逐块处理流水线
//!
//! 一次只处理一个单元（块）：切帖子 → 存切片 → OCR → 信号 → 内嵌图片 → 待抓取目标。
//! 单元结束后立刻合并进时间线并落盘（先时间线、后进度），解码出的整块图像
//! 在单元结束时释放，峰值内存约等于一个块的大小。
//!
//! 单元内的失败（图片损坏、缺失等）只记录并跳过；检查点写不进去则整次运行失败。

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use image::RgbImage;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::core::checkpoint::store::{IMAGES_DIR, SLICES_DIR};
use crate::core::checkpoint::{write_atomic, CheckpointStore, Progress};
use crate::core::config::PipelineConfig;
use crate::core::error::{Result, TimelineError};
use crate::core::ocr::OcrContext;
use crate::core::photo::{ExtractedPhoto, PhotoExtractor, PixelBox, RegionProvenance};
use crate::core::raster::{crop_rows, encode_jpeg, load_rgb};
use crate::core::segment::{segment_posts, DividerDetector, Manifest, PostConfig, Region, UnitDescriptor};
use crate::core::signals::{parse_date_hint, DatePrecision, SignalExtractor, Signals};
use crate::core::timeline::ids::{crawl_id, post_id};
use crate::core::timeline::{
    CrawlKind, CrawlStatus, CrawlTarget, DateSource, ImageRecord, Post, Priority, Timeline, UnitOutput,
};

const SLICE_JPEG_QUALITY: u8 = 90;
/// 抓取目标上下文里保留的 OCR 摘录长度
const CONTEXT_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 跳过进度文件中已完成的单元
    Resume,
    /// 丢弃之前的全部输出，从头开始
    Force,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
    pub total_posts: usize,
    pub total_images: usize,
    pub total_crawl_targets: usize,
    pub posts_with_date_hint: usize,
    pub posts_with_more_text: usize,
    pub posts_with_more_photos: usize,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    fn finish(mut self, timeline: &Timeline, started: Instant) -> Self {
        self.total_posts = timeline.posts.len();
        self.total_images = timeline.images.len();
        self.total_crawl_targets = timeline.crawl_targets.len();
        self.posts_with_date_hint = count_posts(timeline, |s| s.date_hint.is_some());
        self.posts_with_more_text = count_posts(timeline, |s| s.has_more_text);
        self.posts_with_more_photos = count_posts(timeline, |s| s.has_more_photos);
        self.elapsed_seconds = started.elapsed().as_secs_f64();
        self
    }
}

fn count_posts(timeline: &Timeline, pred: impl Fn(&Signals) -> bool) -> usize {
    timeline.posts.iter().filter(|p| pred(&p.signals)).count()
}

/// 把一个块处理成帖子、图片和抓取目标
pub struct ChunkProcessor {
    posts: PostConfig,
    photos: PhotoExtractor,
    signals: SignalExtractor,
    images_dir: PathBuf,
    slices_dir: PathBuf,
}

impl ChunkProcessor {
    pub fn new(config: &PipelineConfig, output_dir: &Path) -> Self {
        Self {
            posts: config.posts.clone(),
            photos: PhotoExtractor::with_config(config.photos.clone()),
            signals: SignalExtractor::with_tag_rules(&config.tags),
            images_dir: output_dir.join(IMAGES_DIR),
            slices_dir: output_dir.join(SLICES_DIR),
        }
    }

    pub fn process_unit(&self, unit: &UnitDescriptor, chunks_dir: &Path, ocr: &OcrContext) -> Result<UnitOutput> {
        let img = load_rgb(&chunks_dir.join(&unit.file))?;
        let height = img.height();

        let gaps = DividerDetector::with_config(self.posts.divider.clone()).find_gaps(&img);
        let segmentation = segment_posts(&unit.file, &gaps, height, &self.posts);
        debug!(
            "   {}: {} gaps, {} posts, {} noise slices",
            unit.file,
            gaps.len(),
            segmentation.posts.len(),
            segmentation.noise.len()
        );

        let mut output = UnitOutput::default();
        for (region_index, region) in segmentation.posts.iter().enumerate() {
            self.process_region(unit, &img, region, region_index as u32, ocr, &mut output)?;
        }
        Ok(output)
    }

    fn process_region(
        &self,
        unit: &UnitDescriptor,
        chunk: &RgbImage,
        region: &Region,
        region_index: u32,
        ocr: &OcrContext,
        output: &mut UnitOutput,
    ) -> Result<()> {
        let pixels = crop_rows(chunk, region.start_row, region.end_row);
        let y_global = unit.y_start + region.start_row;
        let pid = post_id(&unit.source, unit.chunk_index, region_index, y_global);

        let slice_file = format!(
            "slice_{}_{:03}_{:03}.jpg",
            unit.source_index, unit.chunk_index, region_index
        );
        write_atomic(
            &self.slices_dir.join(&slice_file),
            &encode_jpeg(&pixels, SLICE_JPEG_QUALITY)?,
        )?;

        let ocr_text = ocr.recognize_or_marker(&pixels);
        let signals = self.signals.extract(&ocr_text);

        let photos = self.photos.extract(
            &pixels,
            RegionProvenance {
                source_file: &unit.source,
                chunk_index: unit.chunk_index,
                region_index,
            },
        );

        let mut image_ids = Vec::with_capacity(photos.len());
        for photo in &photos {
            let record = self.save_photo(unit, &pid, region_index, y_global, photo)?;
            if record.is_thumbnail {
                output.crawl_targets.push(crawl_target(
                    CrawlKind::FullImage,
                    &record.id,
                    format!("Post {}, thumbnail {}", pid, record.id),
                    None,
                    Priority::High,
                ));
            }
            image_ids.push(record.id.clone());
            output.images.push(record);
        }

        let snippet = excerpt(&ocr_text);
        if signals.has_more_text {
            output.crawl_targets.push(crawl_target(
                CrawlKind::TruncatedText,
                &pid,
                format!("Post {} has 'See more': {}", pid, snippet),
                None,
                Priority::Medium,
            ));
        }
        if signals.has_more_photos {
            output.crawl_targets.push(crawl_target(
                CrawlKind::Album,
                &pid,
                format!("Post {}: {}", pid, snippet),
                signals.more_photos_hint.clone(),
                Priority::High,
            ));
        }

        let date_parsed = signals.date_hint.as_deref().and_then(parse_date_hint);
        output.posts.push(Post {
            id: pid,
            source_file: unit.source.clone(),
            chunk_file: unit.file.clone(),
            chunk_index: unit.chunk_index,
            region_index,
            y_local: region.start_row,
            y_local_end: region.end_row,
            y_global,
            y_global_end: unit.y_start + region.end_row,
            height: region.height(),
            slice_file: Some(slice_file),
            ocr_text,
            signals,
            image_ids,
            date_parsed,
            date_assigned: None,
            date_precision: DatePrecision::None,
            date_source: DateSource::None,
            needs_review: true,
        });
        Ok(())
    }

    fn save_photo(
        &self,
        unit: &UnitDescriptor,
        post_id: &str,
        region_index: u32,
        y_global: u32,
        photo: &ExtractedPhoto,
    ) -> Result<ImageRecord> {
        let name = format!("img_{}.jpg", photo.id);
        let bytes = encode_jpeg(&photo.pixels, self.photos.config().jpeg_quality)?;
        write_atomic(&self.images_dir.join(&name), &bytes)?;

        let b = photo.bounds;
        Ok(ImageRecord {
            id: photo.id.clone(),
            post_id: post_id.to_string(),
            source_file: unit.source.clone(),
            chunk_index: unit.chunk_index,
            region_index,
            region: PixelBox {
                x: unit.x_offset() + b.x,
                y: y_global + b.y,
                width: b.width,
                height: b.height,
            },
            width: b.width,
            height: b.height,
            saved_path: format!("{}/{}", IMAGES_DIR, name),
            is_thumbnail: photo.is_thumbnail,
            needs_crawl: photo.is_thumbnail,
        })
    }
}

fn crawl_target(kind: CrawlKind, related: &str, context: String, hint: Option<String>, priority: Priority) -> CrawlTarget {
    CrawlTarget {
        id: crawl_id(kind.as_str(), related),
        kind,
        related: related.to_string(),
        context,
        hint,
        priority,
        status: CrawlStatus::Pending,
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(CONTEXT_CHARS).collect()
}

/// 按 manifest 顺序执行，可断点续跑
pub struct TimelinePipeline {
    config: PipelineConfig,
    processor: ChunkProcessor,
    store: CheckpointStore,
    ocr: OcrContext,
}

impl TimelinePipeline {
    pub fn new(config: PipelineConfig, ocr: OcrContext) -> Self {
        let processor = ChunkProcessor::new(&config, &config.output_dir);
        let store = CheckpointStore::new(config.output_dir.clone());
        Self {
            config,
            processor,
            store,
            ocr,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, manifest: &Manifest, mode: RunMode) -> Result<RunSummary> {
        if manifest.chunks.is_empty() {
            return Err(TimelineError::EmptyManifest);
        }
        let started = Instant::now();
        let (mut progress, mut timeline) = self.initial_state(manifest, mode)?;
        let pool = self.config.worker_pool()?;

        let total = manifest.chunks.len();
        let already_done = manifest
            .chunks
            .iter()
            .filter(|u| progress.is_complete(&u.file))
            .count();
        info!("🎬 timeline extraction: {}", self.config.subject);
        info!("   units: {}, done: {}, remaining: {}", total, already_done, total - already_done);
        info!("   mode: {:?}, worker threads: {}", mode, pool.current_num_threads());

        let mut summary = RunSummary::default();
        for (i, unit) in manifest.chunks.iter().enumerate() {
            if progress.is_complete(&unit.file) {
                info!("[{}/{}] {} - SKIP (done)", i + 1, total, unit.file);
                summary.skipped += 1;
                continue;
            }

            let t0 = Instant::now();
            let processed = pool.install(|| {
                self.processor
                    .process_unit(unit, &self.config.chunks_dir, &self.ocr)
            });
            match processed {
                Ok(output) => {
                    info!(
                        "[{}/{}] {} OK - {} posts, {} imgs [{:.1}s]",
                        i + 1,
                        total,
                        unit.file,
                        output.posts.len(),
                        output.images.len(),
                        t0.elapsed().as_secs_f64()
                    );
                    timeline.merge(output);
                    progress.mark_complete(&unit.file);
                    summary.processed += 1;
                }
                Err(e) => {
                    error!("[{}/{}] {} ERROR: {}", i + 1, total, unit.file, e);
                    summary.failures.push(UnitFailure {
                        unit: unit.file.clone(),
                        error: e.to_string(),
                    });
                }
            }

            self.update_stats(&mut timeline, &progress, manifest, &summary, started);
            self.store.save(&timeline, &progress)?;

            if i + 1 < total && !self.config.cooldown().is_zero() {
                thread::sleep(self.config.cooldown());
            }
        }

        let summary = summary.finish(&timeline, started);
        log_summary(&summary);
        Ok(summary)
    }

    fn initial_state(&self, manifest: &Manifest, mode: RunMode) -> Result<(Progress, Timeline)> {
        let fresh = || Timeline::new(self.config.subject.clone(), manifest.source_files.clone());
        match mode {
            RunMode::Force => {
                self.store.reset()?;
                Ok((Progress::default(), fresh()))
            }
            RunMode::Resume => {
                self.store.prepare()?;
                let (progress, timeline) = self.store.resume_state()?;
                Ok((progress, timeline.unwrap_or_else(fresh)))
            }
        }
    }

    fn update_stats(
        &self,
        timeline: &mut Timeline,
        progress: &Progress,
        manifest: &Manifest,
        summary: &RunSummary,
        started: Instant,
    ) {
        timeline.refresh_stats();
        let stats = &mut timeline.stats;
        stats.ocr_engine = self.ocr.engine_name();
        stats.chunks_processed = manifest
            .chunks
            .iter()
            .filter(|u| progress.is_complete(&u.file))
            .count();
        stats.chunks_total = manifest.chunks.len();
        stats.failed_units = summary.failures.len();
        stats.elapsed_seconds = started.elapsed().as_secs_f64();
    }
}

fn log_summary(summary: &RunSummary) {
    info!("✅ extraction complete");
    info!("   posts:         {}", summary.total_posts);
    info!("   images:        {}", summary.total_images);
    info!("   crawl targets: {}", summary.total_crawl_targets);
    info!(
        "   units: {} processed, {} skipped, {} failed",
        summary.processed,
        summary.skipped,
        summary.failures.len()
    );
    info!("   with date hint: {}", summary.posts_with_date_hint);
    info!("   'see more':     {}", summary.posts_with_more_text);
    info!("   more photos:    {}", summary.posts_with_more_photos);
    for failure in &summary.failures {
        error!("   ✗ {}: {}", failure.unit, failure.error);
    }
}

/// 删除不再被任何帖子引用的已提取文件
pub fn prune_orphan_images(store: &CheckpointStore, timeline: &Timeline) -> Result<usize> {
    let dir = store.images_dir();
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let referenced = timeline
            .images
            .iter()
            .any(|i| i.saved_path.ends_with(&name));
        if !referenced {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
