//! 规则表：对小写化的 OCR 文本逐条求值
//!
//! 每条规则是 (匹配条件, 效果)。标签可以同时命中多个；帖子类型按表中顺序
//! 取第一条命中的规则：video > check-in > photo > share > post。
//! 新增规则只需往表里追加，不改控制流。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Signals;

/// 签到短语按整词匹配，"was at" 不能命中 "was attending"
static CHECK_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:checked in|was at|was here)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostType {
    #[default]
    Post,
    Photo,
    Video,
    CheckIn,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    MoreText,
    Video,
}

/// 作用于小写文本和已收集信号的判断条件
pub type Predicate = fn(&str, &Signals) -> bool;

#[derive(Clone)]
pub enum Matcher {
    /// 任一关键词以子串形式出现
    AnyKeyword(Vec<String>),
    Pattern(Regex),
    Predicate(Predicate),
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::AnyKeyword(keywords) => f.debug_tuple("AnyKeyword").field(keywords).finish(),
            Matcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Matcher {
    fn matches(&self, text: &str, signals: &Signals) -> bool {
        match self {
            Matcher::AnyKeyword(keywords) => keywords.iter().any(|k| text.contains(k.as_str())),
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Predicate(f) => f(text, signals),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Tag(String),
    Flag(Flag),
    /// 仅在前面没有类型规则命中时生效
    PostType(PostType),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub effect: Effect,
}

impl Rule {
    pub fn keywords(words: &[&str], effect: Effect) -> Self {
        Self {
            matcher: Matcher::AnyKeyword(words.iter().map(|w| w.to_string()).collect()),
            effect,
        }
    }

    pub fn pattern(re: &Regex, effect: Effect) -> Self {
        Self {
            matcher: Matcher::Pattern(re.clone()),
            effect,
        }
    }

    pub fn predicate(f: Predicate, effect: Effect) -> Self {
        Self {
            matcher: Matcher::Predicate(f),
            effect,
        }
    }
}

/// A tag and the keywords that trigger it, as found in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub keywords: Vec<String>,
}

impl TagRule {
    pub fn new(tag: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub fn default_tag_rules() -> Vec<TagRule> {
    vec![
        TagRule::new("kiln", &["kiln", "anagama", "firing", "fire"]),
        TagRule::new("pottery", &["pottery", "ceramic", "clay", "glaze"]),
        TagRule::new("sale", &["sale", "price", "$", "available"]),
        TagRule::new("event", &["event", "festival", "market", "show", "exhibition"]),
        TagRule::new("wood", &["wood", "firewood", "cord", "ash"]),
        TagRule::new("teabowl", &["teabowl", "tea bowl", "chawan"]),
        TagRule::new("community", &["together", "team", "friends", "volunteer"]),
    ]
}

fn flag_rules() -> Vec<Rule> {
    vec![
        Rule::keywords(&["see more", "see\nmore"], Effect::Flag(Flag::MoreText)),
        Rule::keywords(&["video", "watch", "▶", "►"], Effect::Flag(Flag::Video)),
    ]
}

fn is_video(_: &str, s: &Signals) -> bool {
    s.has_video
}

fn is_photo(text: &str, s: &Signals) -> bool {
    s.has_more_photos || text.contains("photo") || text.contains("album")
}

fn type_rules() -> Vec<Rule> {
    vec![
        Rule::predicate(is_video, Effect::PostType(PostType::Video)),
        Rule::pattern(&CHECK_IN, Effect::PostType(PostType::CheckIn)),
        Rule::predicate(is_photo, Effect::PostType(PostType::Photo)),
        Rule::keywords(&["shared"], Effect::PostType(PostType::Share)),
    ]
}

/// 先标记，再标签，最后按优先级排列的帖子类型规则
pub fn build_rule_table(tags: &[TagRule]) -> Vec<Rule> {
    let mut rules = flag_rules();
    rules.extend(tags.iter().map(|t| Rule {
        matcher: Matcher::AnyKeyword(t.keywords.iter().map(|k| k.to_lowercase()).collect()),
        effect: Effect::Tag(t.tag.clone()),
    }));
    rules.extend(type_rules());
    rules
}

/// 依次用 `rules` 匹配 `lowered`，更新 `signals`
pub fn apply_rules(rules: &[Rule], lowered: &str, signals: &mut Signals) {
    let mut type_resolved = false;

    for rule in rules {
        if let Effect::PostType(_) = rule.effect {
            if type_resolved {
                continue;
            }
        }
        if !rule.matcher.matches(lowered, signals) {
            continue;
        }
        match &rule.effect {
            Effect::Tag(tag) => {
                signals.tags.insert(tag.clone());
            }
            Effect::Flag(Flag::MoreText) => signals.has_more_text = true,
            Effect::Flag(Flag::Video) => signals.has_video = true,
            Effect::PostType(post_type) => {
                signals.post_type = *post_type;
                type_resolved = true;
            }
        }
    }
}
