//! 时间线日期重建
//!
//! 所有帖子按"滚动顺序"排好后分三步：
//! - A：帖子自身文本里能解析出的日期直接采用；
//! - B：带图帖子与外部已知日期列表（新 → 旧）顺序对齐，保证日期单调不增；
//! - C：仍无日期的帖子在相邻已定日期之间按位置线性插值，单边时按固定步长外推。
//!
//! 整个过程是确定性的：相同顺序 + 相同已知日期列表 → 相同结果。

use std::fs;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::signals::dates::parse_known_date;
use crate::core::signals::{parse_date_from_text, parse_date_hint, DatePrecision};
use crate::core::timeline::{DateSource, Post};

pub const DEFAULT_EXTRAPOLATION_DAYS: i64 = 14;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub total_posts: usize,
    pub parsed: usize,
    pub ocr: usize,
    pub aligned: usize,
    pub interpolated: usize,
    pub extrapolated: usize,
    pub undated: usize,
    pub known_dates_total: usize,
    pub known_dates_unused: usize,
}

impl ReconstructionReport {
    fn tally(posts: &[Post]) -> Self {
        let mut report = Self {
            total_posts: posts.len(),
            ..Self::default()
        };
        for post in posts {
            match post.date_source {
                DateSource::Parsed => report.parsed += 1,
                DateSource::Ocr => report.ocr += 1,
                DateSource::Aligned => report.aligned += 1,
                DateSource::Interpolated => report.interpolated += 1,
                DateSource::Extrapolated => report.extrapolated += 1,
                DateSource::None => report.undated += 1,
            }
        }
        report
    }
}

pub struct DateReconstructor {
    source_order: Vec<String>,
    extrapolation_days: i64,
}

impl DateReconstructor {
    /// `source_order`：源文件名，最新的在前
    pub fn new(source_order: Vec<String>) -> Self {
        Self {
            source_order,
            extrapolation_days: DEFAULT_EXTRAPOLATION_DAYS,
        }
    }

    pub fn with_extrapolation_days(mut self, days: i64) -> Self {
        self.extrapolation_days = days;
        self
    }

    /// 按滚动顺序排列的 `posts` 下标：先按配置的源顺序（未知的源
    /// 按名字排在最后），再从上到下
    pub fn scroll_order(&self, posts: &[Post]) -> Vec<usize> {
        let rank = |file: &str| {
            self.source_order
                .iter()
                .position(|s| s == file)
                .unwrap_or(usize::MAX)
        };

        let mut order: Vec<usize> = (0..posts.len()).collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (&posts[a], &posts[b]);
            rank(&pa.source_file)
                .cmp(&rank(&pb.source_file))
                .then_with(|| pa.source_file.cmp(&pb.source_file))
                .then_with(|| pa.y_global.cmp(&pb.y_global))
                .then_with(|| pa.region_index.cmp(&pb.region_index))
        });
        order
    }

    /// 依次执行三个阶段。先清掉之前的结果，
    /// 重复执行结果不变
    pub fn reconstruct(&self, posts: &mut [Post], known_dates: &[NaiveDate]) -> ReconstructionReport {
        let order = self.scroll_order(posts);

        resolve_direct(posts);
        let unused = self.align_known_dates(posts, &order, known_dates);
        self.interpolate(posts, &order);

        let mut report = ReconstructionReport::tally(posts);
        report.known_dates_total = known_dates.len();
        report.known_dates_unused = unused;
        info!(
            "📅 dates: {} parsed, {} ocr, {} aligned, {} interpolated, {} extrapolated, {} undated",
            report.parsed,
            report.ocr,
            report.aligned,
            report.interpolated,
            report.extrapolated,
            report.undated
        );
        report
    }

    /// Stage B: walk image-bearing posts in scroll order, consuming the known
    /// list newest-first. Returns how many known dates were never used.
    ///
    /// Consuming index `i` also discards every newer remaining entry, so an
    /// OCR misread that jumps far back skips real dates. Known limitation.
    pub fn align_known_dates(&self, posts: &mut [Post], order: &[usize], known_dates: &[NaiveDate]) -> usize {
        if known_dates.is_empty() {
            return 0;
        }

        let mut known = known_dates.to_vec();
        known.sort_by(|a, b| b.cmp(a));
        let mut remaining: &[NaiveDate] = &known;
        let mut last_assigned: Option<NaiveDate> = None;

        for &i in order {
            let post = &mut posts[i];
            if !post.has_images() {
                continue;
            }

            if remaining.is_empty() {
                let Some(last) = last_assigned else { break };
                let date = last - Duration::days(self.extrapolation_days);
                assign(post, date, DatePrecision::Estimated, DateSource::Extrapolated);
                last_assigned = Some(date);
                continue;
            }

            let idx = match post.date_parsed {
                Some(parsed) => remaining
                    .iter()
                    .position(|d| *d == parsed)
                    .unwrap_or_else(|| nearest_index(remaining, parsed)),
                None => 0,
            };

            let date = remaining[idx];
            assign(post, date, DatePrecision::Day, DateSource::Aligned);
            last_assigned = Some(date);
            if idx > 0 {
                debug!("📅 post {} skipped {} known dates", post.id, idx);
            }
            remaining = &remaining[idx + 1..];
        }

        remaining.len()
    }

    /// 阶段 C：用最近的有日期邻居补齐仍无日期的帖子
    pub fn interpolate(&self, posts: &mut [Post], order: &[usize]) {
        let anchors: Vec<(usize, NaiveDate)> = order
            .iter()
            .enumerate()
            .filter_map(|(pos, &i)| posts[i].date_assigned.map(|d| (pos, d)))
            .collect();

        for (pos, &i) in order.iter().enumerate() {
            if posts[i].date_assigned.is_some() {
                continue;
            }

            let before = anchors.iter().rev().find(|(p, _)| *p < pos).copied();
            let after = anchors.iter().find(|(p, _)| *p > pos).copied();

            let post = &mut posts[i];
            match (before, after) {
                (Some((bi, bd)), Some((ai, ad))) => {
                    let bo = bd.num_days_from_ce() as f64;
                    let ao = ad.num_days_from_ce() as f64;
                    let frac = (pos - bi) as f64 / (ai - bi) as f64;
                    let ordinal = (bo + frac * (ao - bo)).floor() as i32;
                    if let Some(date) = NaiveDate::from_num_days_from_ce_opt(ordinal) {
                        assign(post, date, DatePrecision::Estimated, DateSource::Interpolated);
                    }
                }
                (Some((bi, bd)), None) => {
                    let steps = (pos - bi) as i64;
                    let date = bd - Duration::days(steps * self.extrapolation_days);
                    assign(post, date, DatePrecision::Estimated, DateSource::Extrapolated);
                }
                (None, Some((ai, ad))) => {
                    let steps = (ai - pos) as i64;
                    let date = ad + Duration::days(steps * self.extrapolation_days);
                    assign(post, date, DatePrecision::Estimated, DateSource::Extrapolated);
                }
                (None, None) => {
                    post.needs_review = true;
                }
            }
        }
    }
}

/// 阶段 A：重置日期字段，再取帖子自带的日期提示，
/// 或从正文中找到的日期
pub fn resolve_direct(posts: &mut [Post]) {
    for post in posts.iter_mut() {
        post.date_parsed = None;
        post.date_assigned = None;
        post.date_precision = DatePrecision::None;
        post.date_source = DateSource::None;
        post.needs_review = false;

        let from_hint = post
            .signals
            .date_hint
            .as_deref()
            .and_then(parse_date_hint)
            .map(|d| (d, DatePrecision::Day, DateSource::Parsed));
        let direct = from_hint.or_else(|| {
            parse_date_from_text(&post.ocr_text).map(|(d, precision)| (d, precision, DateSource::Ocr))
        });

        if let Some((date, precision, source)) = direct {
            post.date_parsed = Some(date);
            assign(post, date, precision, source);
        }
    }
}

fn assign(post: &mut Post, date: NaiveDate, precision: DatePrecision, source: DateSource) {
    post.date_assigned = Some(date);
    post.date_precision = precision;
    post.date_source = source;
    post.needs_review = precision != DatePrecision::Day;
}

/// 天数差绝对值最小的第一个下标
fn nearest_index(dates: &[NaiveDate], target: NaiveDate) -> usize {
    dates
        .iter()
        .enumerate()
        .min_by_key(|(i, d)| ((**d - target).num_days().abs(), *i))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// One date per line, ISO or "Month D, YYYY". Blank lines and `#` comments
/// are skipped; any other unparsable line is an error.
pub fn load_known_dates(path: &Path) -> Result<Vec<NaiveDate>> {
    let raw = fs::read_to_string(path)?;
    parse_known_dates(&raw)
}

pub fn parse_known_dates(raw: &str) -> Result<Vec<NaiveDate>> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_known_date)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timeline::model::tests::post;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn with_image(mut p: Post) -> Post {
        p.image_ids.push(format!("img-{}", p.id));
        p
    }

    fn with_hint(mut p: Post, hint: &str) -> Post {
        p.signals.date_hint = Some(hint.to_string());
        p
    }

    #[test]
    fn test_scroll_order_uses_source_order_then_position() {
        let posts = vec![
            post("c", "fb2.png", 0),
            post("b", "fb1.png", 900),
            post("a", "fb1.png", 100),
            post("z", "other.png", 0),
        ];
        let reconstructor = DateReconstructor::new(vec!["fb1.png".into(), "fb2.png".into()]);
        let ids: Vec<_> = reconstructor
            .scroll_order(&posts)
            .into_iter()
            .map(|i| posts[i].id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn test_alignment_with_exhausted_list() {
        let mut posts = vec![
            with_image(post("p1", "fb1.png", 0)),
            with_image(post("p2", "fb1.png", 200)),
            with_image(post("p3", "fb1.png", 400)),
        ];
        let known = vec![ymd(2019, 1, 1), ymd(2020, 6, 1)];

        let report = DateReconstructor::new(vec!["fb1.png".into()]).reconstruct(&mut posts, &known);

        assert_eq!(posts[0].date_assigned, Some(ymd(2020, 6, 1)));
        assert_eq!(posts[1].date_assigned, Some(ymd(2019, 1, 1)));
        assert_eq!(posts[2].date_assigned, Some(ymd(2018, 12, 18)));
        assert_eq!(posts[0].date_source, DateSource::Aligned);
        assert_eq!(posts[2].date_source, DateSource::Extrapolated);
        assert_eq!(report.aligned, 2);
        assert_eq!(report.known_dates_unused, 0);
    }

    #[test]
    fn test_alignment_prefers_exact_then_nearest() {
        let mut posts = vec![
            with_image(post("p1", "fb1.png", 0)),
            with_image(with_hint(post("p2", "fb1.png", 200), "March 2, 2018")),
            with_image(with_hint(post("p3", "fb1.png", 400), "January 3, 2017")),
        ];
        let known = vec![
            ymd(2019, 5, 1),
            ymd(2018, 9, 9),
            ymd(2018, 3, 2),
            ymd(2017, 6, 1),
            ymd(2016, 12, 30),
        ];

        let report = DateReconstructor::new(Vec::new()).reconstruct(&mut posts, &known);

        assert_eq!(posts[0].date_assigned, Some(ymd(2019, 5, 1)));
        // exact match skips 2018-09-09
        assert_eq!(posts[1].date_assigned, Some(ymd(2018, 3, 2)));
        // nearest of {2017-06-01, 2016-12-30}
        assert_eq!(posts[2].date_assigned, Some(ymd(2016, 12, 30)));
        assert_eq!(report.known_dates_unused, 0);
    }

    #[test]
    fn test_alignment_is_monotonic() {
        let mut posts: Vec<Post> = (0..12)
            .map(|i| with_image(post(&format!("p{i}"), "fb1.png", i * 100)))
            .collect();
        posts[3] = with_hint(posts[3].clone(), "June 1, 2015");
        posts[7] = with_hint(posts[7].clone(), "January 1, 2021");
        let known: Vec<NaiveDate> = (0..8).map(|i| ymd(2020 - i, 6, 1)).collect();

        let reconstructor = DateReconstructor::new(vec!["fb1.png".into()]);
        reconstructor.reconstruct(&mut posts, &known);
        let second_run = {
            let mut again = posts.clone();
            reconstructor.reconstruct(&mut again, &known);
            again
        };

        let dates: Vec<NaiveDate> = posts.iter().map(|p| p.date_assigned.unwrap()).collect();
        for pair in dates.windows(2) {
            assert!(pair[0] >= pair[1], "{:?}", dates);
        }
        assert_eq!(posts, second_run);
    }

    #[test]
    fn test_posts_without_images_are_not_aligned() {
        let mut posts = vec![post("text-only", "fb1.png", 0), with_image(post("photo", "fb1.png", 100))];
        DateReconstructor::new(Vec::new()).reconstruct(&mut posts, &[ymd(2020, 1, 1)]);
        assert_eq!(posts[1].date_source, DateSource::Aligned);
        // the text-only post sits before the aligned one
        assert_eq!(posts[0].date_source, DateSource::Extrapolated);
        assert_eq!(posts[0].date_assigned, Some(ymd(2020, 1, 15)));
    }

    #[test]
    fn test_interpolation_between_anchors() {
        let mut posts = vec![
            with_hint(post("new", "fb1.png", 0), "January 31, 2020"),
            post("u1", "fb1.png", 100),
            post("u2", "fb1.png", 200),
            with_hint(post("old", "fb1.png", 300), "January 1, 2020"),
        ];

        let report = DateReconstructor::new(Vec::new()).reconstruct(&mut posts, &[]);

        assert_eq!(posts[1].date_assigned, Some(ymd(2020, 1, 21)));
        assert_eq!(posts[2].date_assigned, Some(ymd(2020, 1, 11)));
        assert_eq!(posts[1].date_precision, DatePrecision::Estimated);
        assert_eq!(posts[1].date_source, DateSource::Interpolated);
        for p in &posts[1..3] {
            let d = p.date_assigned.unwrap();
            assert!(d >= ymd(2020, 1, 1) && d <= ymd(2020, 1, 31));
        }
        assert_eq!(report.parsed, 2);
        assert_eq!(report.interpolated, 2);
    }

    #[test]
    fn test_one_sided_extrapolation_and_unknown() {
        let mut posts = vec![
            with_hint(post("a", "fb1.png", 0), "March 1, 2020"),
            post("b", "fb1.png", 100),
            post("c", "fb1.png", 200),
        ];
        DateReconstructor::new(Vec::new()).reconstruct(&mut posts, &[]);
        assert_eq!(posts[2].date_assigned, Some(ymd(2020, 2, 2)));
        assert_eq!(posts[2].date_source, DateSource::Extrapolated);

        let mut lone = vec![post("x", "fb1.png", 0)];
        let report = DateReconstructor::new(Vec::new()).reconstruct(&mut lone, &[]);
        assert_eq!(lone[0].date_assigned, None);
        assert_eq!(lone[0].date_precision, DatePrecision::None);
        assert_eq!(lone[0].date_source, DateSource::None);
        assert!(lone[0].needs_review);
        assert_eq!(report.undated, 1);
    }

    #[test]
    fn test_text_dates_use_ocr_source() {
        let mut p = post("a", "fb1.png", 0);
        p.ocr_text = "Firing report from May 2019".into();
        let mut posts = vec![p];
        resolve_direct(&mut posts);
        assert_eq!(posts[0].date_assigned, Some(ymd(2019, 5, 15)));
        assert_eq!(posts[0].date_precision, DatePrecision::Month);
        assert_eq!(posts[0].date_source, DateSource::Ocr);
    }

    #[test]
    fn test_parse_known_dates_file_format() {
        let raw = "# scraped\n2020-06-01\n\nJanuary 1, 2019\n";
        assert_eq!(
            parse_known_dates(raw).unwrap(),
            vec![ymd(2020, 6, 1), ymd(2019, 1, 1)]
        );
        assert!(parse_known_dates("2020-06-01\nlater\n").is_err());
    }
}
