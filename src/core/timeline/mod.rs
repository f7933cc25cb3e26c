pub mod ids;
pub mod model;

pub use model::{
    CrawlKind, CrawlStatus, CrawlTarget, DateSource, ImageRecord, Post, Priority, Stats, Timeline,
    UnitOutput, SCHEMA_VERSION,
};
