pub mod checkpoint;
pub mod config;
pub mod dates;
pub mod error;
pub mod export;
pub mod ocr;
pub mod photo;
pub mod pipeline;
pub mod raster;
pub mod segment;
pub mod signals;
pub mod timeline;
