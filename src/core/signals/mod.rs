//! 内容信号提取：标签、日期提示、帖子类型、"查看更多"/"更多照片"/视频标记
//!
//! 任何规则未命中时对应字段保持零值，从不报错。OCR 错误标记文本
//! (`[OCR ERROR: ...]`) 按普通文本处理。

pub mod dates;
pub mod rules;

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use dates::{find_date_hint, parse_date_from_text, parse_date_hint, DatePrecision};
pub use rules::{default_tag_rules, PostType, Rule, TagRule};

/// `N photo` mentions only count as "more photos" above this.
const ALBUM_COUNT_THRESHOLD: u32 = 3;

static PLUS_PHOTOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+\s*(\d+)\s*(?:photo|image|pic)s?").unwrap());
static COUNT_PHOTOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:photo|image|pic)s?").unwrap());
static LINKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static REACTIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+[,.]?\d*)\s*(?:like|reaction)s?").unwrap());
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+[,.]?\d*)\s*comments?").unwrap());
static SHARES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+[,.]?\d*)\s*shares?").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub tags: BTreeSet<String>,
    pub date_hint: Option<String>,
    pub post_type: PostType,
    /// "See more" truncation marker
    pub has_more_text: bool,
    pub has_more_photos: bool,
    pub more_photos_hint: Option<String>,
    pub has_video: bool,
    pub links: Vec<String>,
    pub reactions: Option<String>,
    pub comments: Option<String>,
    pub shares: Option<String>,
}

pub struct SignalExtractor {
    rules: Vec<Rule>,
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self::with_tag_rules(&default_tag_rules())
    }

    pub fn with_tag_rules(tags: &[TagRule]) -> Self {
        Self {
            rules: rules::build_rule_table(tags),
        }
    }

    /// 追加一条规则，排在现有规则之后求值
    ///
    /// 类型规则仍遵守"先命中者胜"：追加的类型规则只在内置规则都没命中时生效。
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn extract(&self, text: &str) -> Signals {
        let mut signals = Signals::default();
        if text.trim().is_empty() {
            return signals;
        }

        let lowered = text.to_lowercase();

        if let Some(hint) = more_photos_hint(&lowered) {
            signals.has_more_photos = true;
            signals.more_photos_hint = Some(hint);
        }

        signals.date_hint = find_date_hint(text);
        signals.links = LINKS
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        signals.reactions = first_match(&REACTIONS, &lowered);
        signals.comments = first_match(&COMMENTS, &lowered);
        signals.shares = first_match(&SHARES, &lowered);

        rules::apply_rules(&self.rules, &lowered, &mut signals);
        signals
    }
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 显式的 `+N photos` 优先；单独的 `N photos` 仅在 N > 3 时计入
fn more_photos_hint(lowered: &str) -> Option<String> {
    if let Some(m) = PLUS_PHOTOS.find(lowered) {
        return Some(m.as_str().to_string());
    }

    let caps = COUNT_PHOTOS.captures(lowered)?;
    let count: u32 = caps[1].parse().ok()?;
    if count > ALBUM_COUNT_THRESHOLD {
        Some(caps[0].to_string())
    } else {
        None
    }
}

fn first_match(re: &Regex, text: &str) -> Option<String> {
    re.find(text).map(|m| m.as_str().to_string())
}
