//! 日期提示提取与解析
//!
//! `find_date_hint` 只负责从文本中找出第一个像日期的片段；
//! `parse_date_hint` 把片段解析成日历日期；`parse_date_from_text` 用更宽松的
//! 规则直接在整段 OCR 文本里找日期（含"月 年"这种只精确到月的写法）。

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TimelineError};

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// 只有月份的日期所接受的最早年份
const MIN_PLAUSIBLE_YEAR: i32 = 2005;
/// 月精度的日期放在月中
const MONTH_PRECISION_DAY: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Day,
    Month,
    Estimated,
    #[default]
    None,
}

/// 按顺序尝试的日期提示模式，先匹配者优先
static DATE_HINT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s*\d{4}",
        r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},?\s*\d{4}",
        r"\b\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})\b",
        r"(?i)\b\d+\s+(?:hour|day|week|month|year)s?\s+ago\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NAMED_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z]{3,9})\.?\s+(\d{1,2}),?\s*(\d{4})$").unwrap());

static NUMERIC_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})$").unwrap());

static TEXT_MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?,?\s*(\d{4})",
    )
    .unwrap()
});

static TEXT_WEEKDAY_SHORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:mon|tue|wed|thu|fri|sat|sun)[;,]\s*(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+(\d{1,2}),?\s*(\d{4})",
    )
    .unwrap()
});

static TEXT_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{4})\b",
    )
    .unwrap()
});

static TEXT_DAY_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(decemb[ec]r|january|february|march|april|may|june|july|august|september|october|november)\s+(\d{1,2})(?:st|nd|rd|th)?\s+(?:and|&)\s+\d{1,2}(?:st|nd|rd|th)?,?\s*(\d{4})",
    )
    .unwrap()
});

/// 1-based month number for a full or abbreviated (≥3 letters) English month name.
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    // OCR 常把 December 读成 Decembcr / Decembec
    if lower.starts_with("decemb") {
        return Some(12);
    }
    MONTHS
        .iter()
        .position(|full| full.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

/// `text` 中第一个像日期的片段，依次尝试各模式
pub fn find_date_hint(text: &str) -> Option<String> {
    DATE_HINT_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

/// Parse a hint such as `"March 3, 2015"`, `"Mar 3 2015"` or `"3/14/15"`.
/// Relative hints ("2 years ago") have no anchor and yield `None`.
pub fn parse_date_hint(hint: &str) -> Option<NaiveDate> {
    let clean = hint.trim().trim_end_matches('.');

    if let Some(caps) = NAMED_HINT.captures(clean) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = NUMERIC_HINT.captures(clean) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Two-digit years follow the strptime pivot: 00-68 → 20xx, 69-99 → 19xx.
fn expand_year(raw: &str) -> Option<i32> {
    let value: i32 = raw.parse().ok()?;
    if raw.len() == 4 {
        Some(value)
    } else if value <= 68 {
        Some(2000 + value)
    } else {
        Some(1900 + value)
    }
}

/// 在 OCR 正文中搜索日期，连同精度一起返回
pub fn parse_date_from_text(text: &str) -> Option<(NaiveDate, DatePrecision)> {
    if text.is_empty() {
        return None;
    }

    for re in [&*TEXT_MONTH_DAY_YEAR, &*TEXT_WEEKDAY_SHORT] {
        if let Some(date) = re.captures(text).and_then(|c| ymd_from_captures(&c)) {
            return Some((date, DatePrecision::Day));
        }
    }

    if let Some(caps) = TEXT_MONTH_YEAR.captures(text) {
        let month = month_number(&caps[1]);
        let year: Option<i32> = caps[2].parse().ok();
        if let (Some(month), Some(year)) = (month, year) {
            if (MIN_PLAUSIBLE_YEAR..=Utc::now().year()).contains(&year) {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, MONTH_PRECISION_DAY) {
                    return Some((date, DatePrecision::Month));
                }
            }
        }
    }

    TEXT_DAY_RANGE
        .captures(text)
        .and_then(|c| ymd_from_captures(&c))
        .map(|date| (date, DatePrecision::Day))
}

fn ymd_from_captures(caps: &regex::Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// One entry of an externally supplied known-date list: ISO `2015-03-21`
/// or a hint-style date such as `March 21, 2015`.
pub fn parse_known_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_hint(trimmed))
        .ok_or_else(|| TimelineError::InvalidDate(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("January"), Some(1));
        assert_eq!(month_number("sep"), Some(9));
        assert_eq!(month_number("Sept"), Some(9));
        assert_eq!(month_number("Decembcr"), Some(12));
        assert_eq!(month_number("ma"), None);
        assert_eq!(month_number("foo"), None);
    }

    #[test]
    fn test_find_date_hint_order() {
        assert_eq!(
            find_date_hint("Posted March 21, 2015 at the kiln").as_deref(),
            Some("March 21, 2015")
        );
        assert_eq!(find_date_hint("Nov 9 2012 firing").as_deref(), Some("Nov 9 2012"));
        assert_eq!(find_date_hint("sale on 6/1/2020").as_deref(), Some("6/1/2020"));
        assert_eq!(find_date_hint("3 years ago").as_deref(), Some("3 years ago"));
        assert_eq!(find_date_hint("no dates here"), None);
    }

    #[test]
    fn test_first_pattern_wins_over_later_ones() {
        let text = "2 days ago we said: see you July 4, 2016";
        assert_eq!(find_date_hint(text).as_deref(), Some("July 4, 2016"));
    }

    #[test]
    fn test_parse_date_hint() {
        assert_eq!(parse_date_hint("March 21, 2015"), Some(ymd(2015, 3, 21)));
        assert_eq!(parse_date_hint("March 21 2015"), Some(ymd(2015, 3, 21)));
        assert_eq!(parse_date_hint("Mar 21, 2015."), Some(ymd(2015, 3, 21)));
        assert_eq!(parse_date_hint("06/01/2020"), Some(ymd(2020, 6, 1)));
        assert_eq!(parse_date_hint("6/1/20"), Some(ymd(2020, 6, 1)));
        assert_eq!(parse_date_hint("6/1/99"), Some(ymd(1999, 6, 1)));
        assert_eq!(parse_date_hint("February 30, 2015"), None);
        assert_eq!(parse_date_hint("3 years ago"), None);
        assert_eq!(parse_date_hint(""), None);
    }

    #[test]
    fn test_parse_date_from_text_day_precision() {
        assert_eq!(
            parse_date_from_text("Ken Shenstone\nOctober 17th, 2015 ·"),
            Some((ymd(2015, 10, 17), DatePrecision::Day))
        );
        assert_eq!(
            parse_date_from_text("Fri, Nov 9 2012 opening"),
            Some((ymd(2012, 11, 9), DatePrecision::Day))
        );
        assert_eq!(
            parse_date_from_text("Sale December 10th and 11th, 2016"),
            Some((ymd(2016, 12, 10), DatePrecision::Day))
        );
    }

    #[test]
    fn test_parse_date_from_text_month_precision() {
        assert_eq!(
            parse_date_from_text("kiln opening in May 2019!"),
            Some((ymd(2019, 5, 15), DatePrecision::Month))
        );
        assert_eq!(parse_date_from_text("May 1890 archive"), None);
        assert_eq!(parse_date_from_text(""), None);
    }

    #[test]
    fn test_parse_known_date() {
        assert_eq!(parse_known_date("2020-06-01").unwrap(), ymd(2020, 6, 1));
        assert_eq!(parse_known_date(" February 26, 2020 ").unwrap(), ymd(2020, 2, 26));
        assert!(matches!(
            parse_known_date("someday"),
            Err(TimelineError::InvalidDate(_))
        ));
    }
}
