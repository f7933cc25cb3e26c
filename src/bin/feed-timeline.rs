//! 命令行入口：切块 / 提取 / 日期修正 / 按日期导出图片

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use feed_timeline::api::{DateFixer, TimelineExtractor};
use feed_timeline::core::config::PipelineConfig;
use feed_timeline::core::error::{OcrError, Result, TimelineError};
use feed_timeline::core::ocr::{NoopRecognizer, OcrContext, TextRecognizer};
use feed_timeline::core::pipeline::RunMode;

#[derive(Parser)]
#[command(name = "feed-timeline")]
#[command(about = "Rebuild a dated post timeline from scrolled-feed screenshots")]
struct Cli {
    /// JSON5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split screenshots (newest first) into chunks and write the manifest
    Split { sources: Vec<PathBuf> },

    /// Process every chunk in the manifest
    Extract {
        /// Discard previous output and start clean
        #[arg(long, conflicts_with = "resume")]
        force: bool,
        /// Skip chunks already completed (default)
        #[arg(long)]
        resume: bool,
        /// Skip OCR; posts get empty text
        #[arg(long)]
        no_ocr: bool,
    },

    /// Reconstruct post dates in an existing timeline
    FixDates {
        /// Known dates, one per line, newest first
        #[arg(long)]
        known_dates: Option<PathBuf>,
        /// Timeline file (defaults to <output_dir>/timeline.json)
        #[arg(long)]
        timeline: Option<PathBuf>,
    },

    /// Copy images out as <date>_<description>.jpg, after fix-dates
    ExportImages {
        /// Timeline file (defaults to <output_dir>/timeline.json)
        #[arg(long)]
        timeline: Option<PathBuf>,
        /// Target directory (defaults to export_dir from the config)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    feed_timeline::init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Split { sources } => {
            if sources.is_empty() {
                return Err(TimelineError::Config("no source screenshots given".into()));
            }
            let extractor = TimelineExtractor::create(config, OcrContext::new(noop_engine));
            let manifest = extractor.split(&sources)?;
            info!("📄 manifest: {:?} ({} chunks)", extractor.manifest_path(), manifest.total_chunks);
        }
        Commands::Extract { force, resume, no_ocr } => {
            let ocr = if no_ocr {
                OcrContext::new(noop_engine)
            } else {
                OcrContext::tesseract()
            };
            let mode = run_mode(force, resume);
            let extractor = TimelineExtractor::create(config, ocr);
            let summary = extractor.extract(mode)?;
            info!("📄 timeline: {:?}", extractor.timeline_path());
            if !summary.failures.is_empty() {
                info!("   {} units failed, re-run with --resume to retry", summary.failures.len());
            }
        }
        Commands::FixDates { known_dates, timeline } => {
            let timeline_path = timeline.unwrap_or_else(|| config.output_dir.join("timeline.json"));
            let report = DateFixer::create(config.source_order.clone(), config.extrapolation_days)
                .fix_file(&timeline_path, known_dates.as_deref())?;
            info!(
                "📅 {} posts: {} aligned, {} parsed, {} ocr, {} interpolated, {} extrapolated, {} undated, {} known dates unused",
                report.total_posts,
                report.aligned,
                report.parsed,
                report.ocr,
                report.interpolated,
                report.extrapolated,
                report.undated,
                report.known_dates_unused
            );
        }
        Commands::ExportImages { timeline, out } => {
            let timeline_path = timeline.unwrap_or_else(|| config.output_dir.join("timeline.json"));
            let export_dir = out.unwrap_or_else(|| config.export_dir.clone());
            let report = DateFixer::create(config.source_order.clone(), config.extrapolation_days)
                .export_images(&timeline_path, &export_dir)?;
            for (source, count) in &report.by_source {
                info!("   {:?}: {}", source, count);
            }
            for (description, count) in &report.by_description {
                info!("   {}: {}", description, count);
            }
            if !report.missing.is_empty() {
                info!("   ⚠️ {} images missing", report.missing.len());
            }
        }
    }

    Ok(())
}

/// `--force` 与 `--resume` 互斥；都没给时按续跑处理
fn run_mode(force: bool, resume: bool) -> RunMode {
    match (force, resume) {
        (true, _) => RunMode::Force,
        (false, true) => RunMode::Resume,
        (false, false) => {
            info!("   no --force/--resume given, resuming");
            RunMode::Resume
        }
    }
}

fn noop_engine() -> std::result::Result<Box<dyn TextRecognizer>, OcrError> {
    Ok(Box::new(NoopRecognizer))
}
