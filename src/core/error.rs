use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persist failed for {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Source image not found: {0:?}")]
    MissingSource(PathBuf),
    #[error("Manifest has no units")]
    EmptyManifest,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<json5::Error> for TimelineError {
    fn from(err: json5::Error) -> Self {
        TimelineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TimelineError>;
