//! 截图切分：分隔带检测 → 块 / 帖子区域

pub mod divider;
pub mod region;
pub mod split;

pub use divider::{DividerConfig, DividerDetector, Gap};
pub use region::{
    plan_chunks, segment_posts, ChunkConfig, ContentColumn, PostConfig, PostSegmentation, Region,
};
pub use split::{ColumnCrop, Manifest, SourceSplitter, UnitDescriptor, MANIFEST_FILE};
