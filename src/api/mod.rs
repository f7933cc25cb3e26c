pub mod dates;
pub mod extractor;

pub use dates::DateFixer;
pub use extractor::TimelineExtractor;
