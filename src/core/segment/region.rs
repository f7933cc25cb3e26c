//! 区域切分：粗粒度"块"（批处理单位）与细粒度"帖子"区域

use serde::{Deserialize, Serialize};

use super::divider::{DividerConfig, Gap};

/// A cut never lands closer than this to the bottom edge, so the trailing
/// chunk is never a sliver.
const MIN_TRAILING_CHUNK: u32 = 20;

/// 源图内的行范围 `[start_row, end_row)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub source_id: String,
    pub start_row: u32,
    pub end_row: u32,
}

impl Region {
    pub fn new(source_id: impl Into<String>, start_row: u32, end_row: u32) -> Self {
        Self {
            source_id: source_id.into(),
            start_row,
            end_row,
        }
    }

    pub fn height(&self) -> u32 {
        self.end_row - self.start_row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub divider: DividerConfig,
    /// 软上限：累计高度达到此值后在下一个分隔带中心切开
    pub max_chunk_height: u32,
    /// 设置后，切出的块只保留内容列
    pub content_column: Option<ContentColumn>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            divider: DividerConfig::for_chunking(),
            max_chunk_height: 2000,
            content_column: None,
        }
    }
}

/// 内容列的水平范围 `[left, right)`，两侧页边距在切块时裁掉
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentColumn {
    pub left: u32,
    pub right: u32,
    /// 第一个源的第一块是整宽的主页头，保持不裁
    #[serde(default = "keep_header_default")]
    pub keep_header: bool,
}

fn keep_header_default() -> bool {
    true
}

impl ContentColumn {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    pub divider: DividerConfig,
    pub min_post_height: u32,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            divider: DividerConfig::for_posts(),
            min_post_height: 80,
        }
    }
}

/// Walk gaps in order and cut at a gap's center once the distance since the
/// previous cut reaches `max_chunk_height`. Zero gaps → one chunk.
///
/// The returned chunks tile `[0, height)` exactly.
pub fn plan_chunks(source_id: &str, gaps: &[Gap], height: u32, max_chunk_height: u32) -> Vec<Region> {
    let mut cuts = Vec::new();
    let mut last_cut = 0u32;

    for gap in gaps {
        let center = gap.center();
        if center.saturating_sub(last_cut) >= max_chunk_height
            && height.saturating_sub(center) >= MIN_TRAILING_CHUNK
        {
            cuts.push(center);
            last_cut = center;
        }
    }

    let mut boundaries = Vec::with_capacity(cuts.len() + 2);
    boundaries.push(0);
    boundaries.extend(cuts);
    boundaries.push(height);

    boundaries
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| Region::new(source_id, w[0], w[1]))
        .collect()
}

/// 单个块内细分割的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostSegmentation {
    pub posts: Vec<Region>,
    /// 分隔帖子的间隙
    pub separators: Vec<Gap>,
    /// 低于 `min_post_height` 的切片，作为噪声丢弃
    pub noise: Vec<Region>,
}

impl PostSegmentation {
    /// 帖子、分隔和噪声的高度之和，等于分割的总高度
    pub fn covered_height(&self) -> u32 {
        self.posts.iter().map(Region::height).sum::<u32>()
            + self.separators.iter().map(Gap::height).sum::<u32>()
            + self.noise.iter().map(Region::height).sum::<u32>()
    }
}

/// Split `[0, height)` into post regions bounded by `gaps`.
///
/// Gaps shorter than the configured divider height are ignored. If every
/// candidate is noise, the whole input becomes a single post so nothing is
/// silently dropped.
pub fn segment_posts(source_id: &str, gaps: &[Gap], height: u32, config: &PostConfig) -> PostSegmentation {
    let mut seg = PostSegmentation::default();
    let mut prev_end = 0u32;

    let classify = |seg: &mut PostSegmentation, start: u32, end: u32| {
        if end <= start {
            return;
        }
        let region = Region::new(source_id, start, end);
        if region.height() >= config.min_post_height {
            seg.posts.push(region);
        } else {
            seg.noise.push(region);
        }
    };

    for gap in gaps
        .iter()
        .filter(|g| g.height() >= config.divider.min_gap_height && g.end_row <= height)
    {
        if gap.start_row < prev_end {
            continue;
        }
        classify(&mut seg, prev_end, gap.start_row);
        seg.separators.push(*gap);
        prev_end = gap.end_row;
    }
    classify(&mut seg, prev_end, height);

    if seg.posts.is_empty() {
        return PostSegmentation {
            posts: vec![Region::new(source_id, 0, height)],
            separators: Vec::new(),
            noise: Vec::new(),
        };
    }

    seg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segment::divider::tests::feed_image;
    use crate::core::segment::divider::DividerDetector;

    fn gap(start_row: u32, end_row: u32) -> Gap {
        Gap { start_row, end_row }
    }

    fn assert_tiles(regions: &[Region], height: u32) {
        let mut expected_start = 0;
        for r in regions {
            assert_eq!(r.start_row, expected_start);
            assert!(r.end_row > r.start_row);
            expected_start = r.end_row;
        }
        assert_eq!(expected_start, height);
    }

    #[test]
    fn test_plan_chunks_without_gaps() {
        let chunks = plan_chunks("a.png", &[], 5000, 2000);
        assert_eq!(chunks, vec![Region::new("a.png", 0, 5000)]);
    }

    #[test]
    fn test_plan_chunks_cuts_only_at_gap_centers() {
        let gaps = vec![gap(900, 920), gap(2100, 2120), gap(3000, 3010), gap(4300, 4320)];
        let chunks = plan_chunks("a.png", &gaps, 5000, 2000);

        let centers: Vec<u32> = gaps.iter().map(Gap::center).collect();
        for c in &chunks[..chunks.len() - 1] {
            assert!(centers.contains(&c.end_row));
        }
        assert_eq!(
            chunks.iter().map(|c| c.end_row).collect::<Vec<_>>(),
            vec![2110, 4310, 5000]
        );
        assert_tiles(&chunks, 5000);
    }

    #[test]
    fn test_plan_chunks_no_sliver_at_bottom() {
        let gaps = vec![gap(2980, 3000)];
        let chunks = plan_chunks("a.png", &gaps, 3000, 2000);
        assert_eq!(chunks.len(), 1);
        assert_tiles(&chunks, 3000);
    }

    #[test]
    fn test_segment_posts_basic() {
        let gaps = vec![gap(200, 212), gap(500, 520)];
        let seg = segment_posts("c", &gaps, 800, &PostConfig::default());

        assert_eq!(
            seg.posts,
            vec![
                Region::new("c", 0, 200),
                Region::new("c", 212, 500),
                Region::new("c", 520, 800),
            ]
        );
        assert_eq!(seg.covered_height(), 800);
    }

    #[test]
    fn test_segment_posts_drops_noise() {
        let gaps = vec![gap(200, 212), gap(250, 262)];
        let seg = segment_posts("c", &gaps, 600, &PostConfig::default());

        assert_eq!(seg.posts, vec![Region::new("c", 0, 200), Region::new("c", 262, 600)]);
        assert_eq!(seg.noise, vec![Region::new("c", 212, 250)]);
        assert_eq!(seg.covered_height(), 600);
    }

    #[test]
    fn test_segment_posts_ignores_short_gaps() {
        let gaps = vec![gap(200, 203)];
        let seg = segment_posts("c", &gaps, 600, &PostConfig::default());
        assert_eq!(seg.posts, vec![Region::new("c", 0, 600)]);
        assert!(seg.separators.is_empty());
    }

    #[test]
    fn test_segment_posts_all_noise_falls_back_to_whole() {
        let gaps = vec![gap(30, 40), gap(70, 80)];
        let seg = segment_posts("c", &gaps, 110, &PostConfig::default());
        assert_eq!(seg.posts, vec![Region::new("c", 0, 110)]);
        assert_eq!(seg.covered_height(), 110);
    }

    #[test]
    fn test_segment_posts_leading_and_trailing_gaps() {
        let gaps = vec![gap(0, 10), gap(300, 320), gap(590, 600)];
        let seg = segment_posts("c", &gaps, 600, &PostConfig::default());
        assert_eq!(seg.posts, vec![Region::new("c", 10, 300), Region::new("c", 320, 590)]);
        assert_eq!(seg.covered_height(), 600);
    }

    #[test]
    fn test_segmentation_covers_fixture() {
        let layout = [
            (150, false),
            (12, true),
            (40, false),
            (10, true),
            (300, false),
            (16, true),
            (120, false),
        ];
        let img = feed_image(120, &layout);
        let detector = DividerDetector::new();
        let gaps = detector.find_gaps(&img);

        let seg = segment_posts("fixture", &gaps, img.height(), &PostConfig::default());
        assert_eq!(seg.posts.len(), 3);
        assert_eq!(seg.noise.len(), 1);
        assert_eq!(seg.covered_height(), img.height());

        for (i, a) in seg.posts.iter().enumerate() {
            for b in &seg.posts[i + 1..] {
                assert!(a.end_row <= b.start_row);
            }
        }

        let chunks = plan_chunks("fixture", &gaps, img.height(), 200);
        assert_tiles(&chunks, img.height());
    }
}
