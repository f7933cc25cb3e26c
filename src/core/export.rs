//! 按日期整理图片：日期重建之后，把提取出的图片复制成
//! `{日期}_{描述}{_序号}.jpg` 并写出对照清单
//!
//! 描述词来自按顺序求值的关键词表，第一条命中即用；表里没有命中时退回默认描述。
//! 帖子按滚动顺序处理，所以同名冲突时较新的帖子拿到不带计数的名字。

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::checkpoint::write_json_atomic;
use crate::core::error::Result;
use crate::core::signals::DatePrecision;
use crate::core::timeline::{DateSource, Post, Timeline};

pub const EXPORT_MANIFEST_FILE: &str = "manifest.json";
pub const FALLBACK_DESCRIPTION: &str = "ceramics";
const POST_ID_CHARS: usize = 8;
const PREVIEW_CHARS: usize = 100;

static ADDED_N_PHOTOS: Lazy<Regex> = Lazy::new(|| Regex::new(r"added\s+\d+\s+new\s+photo").unwrap());
static PAGE_PROFILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"followers|following|recommend").unwrap());
static SALE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsale\b").unwrap());

/// 描述规则的命中条件
enum Cue {
    /// 每组至少出现一个关键词
    AllOf(&'static [&'static [&'static str]]),
    Pattern(&'static Lazy<Regex>),
}

impl Cue {
    fn matches(&self, lowered: &str) -> bool {
        match self {
            Cue::AllOf(groups) => groups.iter().all(|g| g.iter().any(|k| lowered.contains(k))),
            Cue::Pattern(re) => re.is_match(lowered),
        }
    }
}

/// 越具体的放越前面；OCR 常见错字（"pottsry"、"postion"）一并收录
static DESCRIPTIONS: &[(Cue, &str)] = &[
    (Cue::AllOf(&[&["holiday"], &["sale", "pottery"]]), "holiday-pottery-sale"),
    (Cue::AllOf(&[&["pottery sal", "pottsry sal"]]), "pottery-sale"),
    (Cue::AllOf(&[&["clearance sale"]]), "clearance-sale"),
    (Cue::AllOf(&[&["spring cleaning"]]), "spring-sale"),
    (Cue::AllOf(&[&["mother"], &["sale", "day", "cale"]]), "mothers-day-sale"),
    (Cue::AllOf(&[&["father"], &["sale", "day"]]), "fathers-day-sale"),
    (Cue::AllOf(&[&["gofund"]]), "gofundme"),
    (Cue::AllOf(&[&["resident"], &["position", "postion"]]), "resident-artist-ad"),
    (Cue::AllOf(&[&["pace avail"], &["firing"]]), "firing-space-available"),
    (Cue::AllOf(&[&["pace avail"]]), "studio-space-available"),
    (Cue::AllOf(&[&["firing dat"]]), "firing-schedule"),
    (Cue::AllOf(&[&["firing"], &["anagama"]]), "anagama-firing"),
    (Cue::AllOf(&[&["firing"]]), "kiln-firing"),
    (Cue::AllOf(&[&["nobo"]]), "noborigama"),
    (Cue::AllOf(&[&["unload"]]), "kiln-unloading"),
    (Cue::AllOf(&[&["eastern market"]]), "eastern-market"),
    (Cue::AllOf(&[&["sounds & sights", "sounds and sights"]]), "festival"),
    (Cue::AllOf(&[&["artist profile"]]), "artist-profile"),
    (Cue::Pattern(&ADDED_N_PHOTOS), FALLBACK_DESCRIPTION),
    (Cue::AllOf(&[&["added new photo"]]), FALLBACK_DESCRIPTION),
    (Cue::Pattern(&PAGE_PROFILE), "page-profile"),
    (Cue::Pattern(&SALE_WORD), "pottery-sale"),
];

/// 根据帖子的 OCR 文本生成可用作文件名的描述
pub fn describe(ocr_text: &str) -> &'static str {
    let lowered = ocr_text.trim().to_lowercase();
    DESCRIPTIONS
        .iter()
        .find(|(cue, _)| cue.matches(&lowered))
        .map(|(_, slug)| *slug)
        .unwrap_or(FALLBACK_DESCRIPTION)
}

/// 文件名里的日期：月精度只写到月，没有日期写 `unknown`
pub fn date_label(post: &Post) -> String {
    match post.date_assigned {
        Some(date) if post.date_precision == DatePrecision::Month => date.format("%Y-%m").to_string(),
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => "unknown".to_string(),
    }
}

/// 清单里的一行：原文件名 → 新文件名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub original: String,
    pub renamed: String,
    /// 帖子 id 前 8 位
    pub post_id: String,
    pub date: String,
    pub date_precision: DatePrecision,
    pub date_source: DateSource,
    pub description: String,
    pub chunk: String,
    pub ocr_preview: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub exported: usize,
    /// 时间线引用了、但找不到记录或文件的图片
    pub missing: Vec<String>,
    pub by_source: BTreeMap<DateSource, usize>,
    pub by_description: BTreeMap<String, usize>,
}

pub struct ImageExporter {
    export_dir: PathBuf,
}

impl ImageExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Copy every image of every image-bearing post, visiting posts in
    /// `order` (indices into `timeline.posts`, scroll order). Image paths are
    /// resolved against `output_dir`. Files written by a previous export are
    /// removed first.
    pub fn export(&self, timeline: &Timeline, order: &[usize], output_dir: &Path) -> Result<ExportReport> {
        self.clear_previous()?;
        fs::create_dir_all(&self.export_dir)?;

        let mut used = HashSet::new();
        let mut entries = Vec::new();
        let mut report = ExportReport::default();

        for post in order.iter().filter_map(|&i| timeline.posts.get(i)) {
            if !post.has_images() {
                continue;
            }
            let date = date_label(post);
            let description = describe(&post.ocr_text);
            let numbered = post.image_ids.len() > 1;

            for (n, image_id) in post.image_ids.iter().enumerate() {
                let record = match timeline.image(image_id) {
                    Some(record) => record,
                    None => {
                        warn!("⚠️ post {} references unknown image {}", post.id, image_id);
                        report.missing.push(image_id.clone());
                        continue;
                    }
                };
                let source = output_dir.join(&record.saved_path);
                if !source.exists() {
                    warn!("⚠️ missing image file {:?}", source);
                    report.missing.push(record.saved_path.clone());
                    continue;
                }

                let suffix = if numbered { format!("_{:02}", n + 1) } else { String::new() };
                let renamed = unique_name(&mut used, &format!("{date}_{description}{suffix}"));
                fs::copy(&source, self.export_dir.join(&renamed))?;
                debug!("   {} -> {}", record.saved_path, renamed);

                *report.by_source.entry(post.date_source).or_default() += 1;
                *report.by_description.entry(description.to_string()).or_default() += 1;
                entries.push(ExportEntry {
                    original: file_name(&record.saved_path),
                    renamed,
                    post_id: post.id.chars().take(POST_ID_CHARS).collect(),
                    date: date.clone(),
                    date_precision: post.date_precision,
                    date_source: post.date_source,
                    description: description.to_string(),
                    chunk: post.chunk_file.clone(),
                    ocr_preview: post.ocr_text.chars().take(PREVIEW_CHARS).collect(),
                });
            }
        }

        report.exported = entries.len();
        write_json_atomic(&self.export_dir.join(EXPORT_MANIFEST_FILE), &entries)?;
        info!(
            "🗂️ {} images exported to {:?}, {} missing",
            report.exported,
            self.export_dir,
            report.missing.len()
        );
        Ok(report)
    }

    /// 只删除上一次导出清单里列出的文件
    fn clear_previous(&self) -> Result<()> {
        let manifest = self.export_dir.join(EXPORT_MANIFEST_FILE);
        if !manifest.exists() {
            return Ok(());
        }
        let previous: Vec<ExportEntry> = serde_json::from_str(&fs::read_to_string(&manifest)?)?;
        for entry in &previous {
            let path = self.export_dir.join(&entry.renamed);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        fs::remove_file(&manifest)?;
        Ok(())
    }
}

/// `{stem}.jpg`, or `{stem}_2.jpg`, `{stem}_3.jpg`, ... once taken.
fn unique_name(used: &mut HashSet<String>, stem: &str) -> String {
    let mut name = format!("{stem}.jpg");
    let mut counter = 2;
    while used.contains(&name) {
        name = format!("{stem}_{counter}.jpg");
        counter += 1;
    }
    used.insert(name.clone());
    name
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
