use std::collections::HashSet;
use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};

use feed_timeline::api::{DateFixer, TimelineExtractor};
use feed_timeline::core::checkpoint::{write_json_atomic, CheckpointStore, Progress};
use feed_timeline::core::config::PipelineConfig;
use feed_timeline::core::ocr::{FixedTextRecognizer, OcrContext};
use feed_timeline::core::pipeline::RunMode;
use feed_timeline::core::segment::{Manifest, UnitDescriptor};
use feed_timeline::core::timeline::{DateSource, Timeline};

const WIDTH: u32 = 300;

/// A striped post, a light divider band, then a white card holding a photo.
/// The dark margin column keeps the card rows from reading as dividers.
fn chunk_image() -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, 430, Rgb([240, 240, 240]));
    for y in 0..150 {
        for x in 0..WIDTH {
            let v = if (x / 7 + y / 5) % 2 == 0 { 30 } else { 200 };
            img.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    for y in 170..430 {
        for x in 0..WIDTH {
            let v = if (5..15).contains(&x) { 30 } else { 255 };
            img.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    for y in 200..420 {
        for x in 40..260 {
            let v = if ((x - 40) / 8 + (y - 200) / 8) % 2 == 0 { 20 } else { 230 };
            img.put_pixel(x, y, Rgb([v, v / 2, 255 - v]));
        }
    }
    img
}

fn write_chunks(dir: &Path, count: u32) -> Manifest {
    fs::create_dir_all(dir).unwrap();
    let img = chunk_image();
    let chunks: Vec<UnitDescriptor> = (0..count)
        .map(|i| {
            let file = format!("fb1_chunk_{:03}.png", i);
            img.save(dir.join(&file)).unwrap();
            UnitDescriptor {
                file,
                source: "fb1.png".into(),
                source_index: 1,
                chunk_index: i,
                y_start: i * img.height(),
                y_end: (i + 1) * img.height(),
                height: img.height(),
                width: WIDTH,
                dividers_inside: 1,
                crop: None,
            }
        })
        .collect();

    Manifest {
        total_chunks: chunks.len(),
        total_dividers_detected: chunks.len(),
        source_files: vec!["fb1.png".into()],
        max_chunk_height: 2000,
        chunks,
    }
}

fn extractor(root: &Path) -> TimelineExtractor {
    let config = PipelineConfig {
        subject: "Test Studio".into(),
        chunks_dir: root.join("chunks"),
        output_dir: root.join("out"),
        ..PipelineConfig::for_quick_run()
    };
    let ocr = OcrContext::with_recognizer(Box::new(FixedTextRecognizer::new(
        "Test Studio\nMarch 21, 2015\nKiln opening. See more",
    )));
    TimelineExtractor::create(config, ocr)
}

fn load_timeline(root: &Path) -> Timeline {
    CheckpointStore::new(root.join("out"))
        .load_timeline()
        .unwrap()
        .unwrap()
}

fn unique_post_ids(timeline: &Timeline) -> usize {
    timeline.posts.iter().map(|p| p.id.as_str()).collect::<HashSet<_>>().len()
}

#[test]
fn resume_skips_completed_units() {
    let root = tempfile::tempdir().unwrap();
    let manifest = write_chunks(&root.path().join("chunks"), 3);
    let extractor = extractor(root.path());

    let partial = Manifest {
        chunks: manifest.chunks[..2].to_vec(),
        ..manifest.clone()
    };
    let first = extractor.extract_manifest(&partial, RunMode::Resume).unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.total_posts, 4);

    let second = extractor.extract_manifest(&manifest, RunMode::Resume).unwrap();
    assert_eq!(second.skipped, 2);
    assert_eq!(second.processed, 1);
    assert!(second.failures.is_empty());

    let timeline = load_timeline(root.path());
    assert_eq!(timeline.posts.len(), 6);
    assert_eq!(unique_post_ids(&timeline), 6);
    assert_eq!(timeline.stats.chunks_processed, 3);
    assert_eq!(timeline.stats.chunks_total, 3);
    assert_eq!(timeline.stats.total_posts_extracted, 6);
    assert_eq!(timeline.subject, "Test Studio");
    assert!(timeline.dangling_image_refs().is_empty());
}

#[test]
fn unit_persisted_but_not_marked_is_reprocessed_idempotently() {
    let root = tempfile::tempdir().unwrap();
    let manifest = write_chunks(&root.path().join("chunks"), 2);
    let extractor = extractor(root.path());
    extractor.extract_manifest(&manifest, RunMode::Resume).unwrap();
    let before = load_timeline(root.path());

    // crash between the timeline write and the progress write
    let store = CheckpointStore::new(root.path().join("out"));
    let mut progress = Progress::default();
    progress.mark_complete(&manifest.chunks[0].file);
    write_json_atomic(&store.progress_path(), &progress).unwrap();

    let summary = extractor.extract_manifest(&manifest, RunMode::Resume).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);

    let after = load_timeline(root.path());
    assert_eq!(after.posts.len(), before.posts.len());
    let ids = |t: &Timeline| t.posts.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&after), ids(&before));
}

#[test]
fn force_starts_clean() {
    let root = tempfile::tempdir().unwrap();
    let manifest = write_chunks(&root.path().join("chunks"), 2);
    let extractor = extractor(root.path());
    extractor.extract_manifest(&manifest, RunMode::Resume).unwrap();

    let stray = root.path().join("out").join("slices").join("stray.jpg");
    fs::write(&stray, b"x").unwrap();

    let summary = extractor.extract_manifest(&manifest, RunMode::Force).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 0);
    assert!(!stray.exists());
    assert_eq!(load_timeline(root.path()).posts.len(), 4);
}

#[test]
fn failed_unit_is_itemised_and_run_continues() {
    let root = tempfile::tempdir().unwrap();
    let mut manifest = write_chunks(&root.path().join("chunks"), 2);
    let mut missing = manifest.chunks[1].clone();
    missing.file = "fb1_chunk_999.png".into();
    missing.chunk_index = 999;
    manifest.chunks.insert(1, missing);

    let summary = extractor(root.path())
        .extract_manifest(&manifest, RunMode::Resume)
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].unit, "fb1_chunk_999.png");

    let timeline = load_timeline(root.path());
    assert_eq!(timeline.posts.len(), 4);
    assert_eq!(timeline.stats.failed_units, 1);

    let progress = CheckpointStore::new(root.path().join("out")).load_progress().unwrap();
    assert!(!progress.is_complete("fb1_chunk_999.png"));
}

#[test]
fn signals_and_dates_flow_into_the_timeline() {
    let root = tempfile::tempdir().unwrap();
    let manifest = write_chunks(&root.path().join("chunks"), 1);
    let extractor = extractor(root.path());
    let summary = extractor.extract_manifest(&manifest, RunMode::Resume).unwrap();

    assert_eq!(summary.posts_with_date_hint, 2);
    assert_eq!(summary.posts_with_more_text, 2);

    let timeline = load_timeline(root.path());
    assert!(timeline.posts.iter().all(|p| p.signals.tags.contains("kiln")));
    assert_eq!(
        timeline.crawl_targets.iter().filter(|c| c.related == timeline.posts[0].id).count(),
        1
    );

    let report = DateFixer::create(Vec::new(), 14)
        .fix_file(&extractor.timeline_path(), None)
        .unwrap();
    assert_eq!(report.parsed, 2);

    let fixed = load_timeline(root.path());
    assert!(fixed.posts.iter().all(|p| p.date_source == DateSource::Parsed));
    assert!(fixed
        .posts
        .iter()
        .all(|p| p.date_assigned == chrono::NaiveDate::from_ymd_opt(2015, 3, 21)));
}

#[test]
fn every_image_lies_inside_its_post() {
    let root = tempfile::tempdir().unwrap();
    let manifest = write_chunks(&root.path().join("chunks"), 2);
    extractor(root.path())
        .extract_manifest(&manifest, RunMode::Resume)
        .unwrap();

    let timeline = load_timeline(root.path());
    assert_eq!(timeline.posts.len(), 4);
    assert!(timeline.dangling_image_refs().is_empty());

    let cards: Vec<_> = timeline.posts.iter().filter(|p| p.y_local == 170).collect();
    assert_eq!(cards.len(), 2);
    for card in &cards {
        assert_eq!(card.image_ids.len(), 1);
        let image = timeline.image(&card.image_ids[0]).unwrap();
        assert!(!image.is_thumbnail);
        assert!(image.width >= 220 && image.height >= 200);
    }

    for image in &timeline.images {
        let owner = timeline.posts.iter().find(|p| p.id == image.post_id).unwrap();
        assert!(owner.image_ids.contains(&image.id));
        assert!(image.region.y >= owner.y_global);
        assert!(image.region.y + image.region.height <= owner.y_global_end);
        assert!(image.region.x + image.region.width <= WIDTH);
        assert!(root.path().join("out").join(&image.saved_path).exists());
    }
}
