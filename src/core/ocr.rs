//! OCR 协作方
//!
//! 识别引擎被当作不透明的"图像 → 文本"函数。引擎句柄由 `OcrContext` 持有，
//! 第一次使用时才创建，之后整个进程复用同一个实例；上下文随所有者一起释放。
//! 识别失败不会越过这里：`recognize_or_marker` 返回 `[OCR ERROR: ...]` 文本。

use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use image::{ImageOutputFormat, RgbImage};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use crate::core::error::OcrError;

pub trait TextRecognizer: Send + Sync {
    /// 识别出的各行，以 `\n` 连接
    fn recognize(&self, image: &RgbImage) -> Result<String, OcrError>;

    fn name(&self) -> &str;
}

/// Shells out to the `tesseract` binary, feeding a PNG on stdin.
pub struct TesseractCli {
    program: String,
    page_segmentation_mode: u8,
}

impl TesseractCli {
    pub fn new() -> Self {
        Self {
            program: "tesseract".to_string(),
            page_segmentation_mode: 6,
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::new()
        }
    }

    /// Fails with `Unavailable` if the binary cannot be started.
    pub fn check_available(&self) -> Result<(), OcrError> {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
            .map_err(|e| OcrError::Unavailable(format!("{}: {}", self.program, e)))
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &RgbImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .map_err(|e| OcrError::Engine(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "--psm"])
            .arg(self.page_segmentation_mode.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Unavailable(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(stderr.trim().to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        Ok(lines.join("\n"))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Recognises nothing. Used when text is not needed (e.g. photo-only runs).
pub struct NoopRecognizer;

impl TextRecognizer for NoopRecognizer {
    fn recognize(&self, _image: &RgbImage) -> Result<String, OcrError> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Recogniser driven by a closure over the image; for tests and dry runs.
pub struct FixedTextRecognizer {
    text_fn: Box<dyn Fn(&RgbImage) -> Result<String, OcrError> + Send + Sync>,
}

impl FixedTextRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_fn(move |_| Ok(text.clone()))
    }

    pub fn with_fn<F>(f: F) -> Self
    where
        F: Fn(&RgbImage) -> Result<String, OcrError> + Send + Sync + 'static,
    {
        Self { text_fn: Box::new(f) }
    }
}

impl TextRecognizer for FixedTextRecognizer {
    fn recognize(&self, image: &RgbImage) -> Result<String, OcrError> {
        (self.text_fn)(image)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

type RecognizerFactory = Box<dyn Fn() -> Result<Box<dyn TextRecognizer>, OcrError> + Send + Sync>;

/// 持有 OCR 引擎：首次使用时创建，之后复用
pub struct OcrContext {
    factory: RecognizerFactory,
    engine: OnceCell<Box<dyn TextRecognizer>>,
}

impl OcrContext {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextRecognizer>, OcrError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            engine: OnceCell::new(),
        }
    }

    /// Context around an already-built recogniser.
    pub fn with_recognizer(recognizer: Box<dyn TextRecognizer>) -> Self {
        let engine = OnceCell::new();
        let _ = engine.set(recognizer);
        Self {
            factory: Box::new(|| Err(OcrError::Unavailable("engine already provided".into()))),
            engine,
        }
    }

    pub fn tesseract() -> Self {
        Self::new(|| {
            let engine = TesseractCli::new();
            engine.check_available()?;
            Ok(Box::new(engine) as Box<dyn TextRecognizer>)
        })
    }

    fn engine(&self) -> Result<&dyn TextRecognizer, OcrError> {
        self.engine
            .get_or_try_init(|| {
                let engine = (self.factory)()?;
                info!("🔤 OCR engine ready: {}", engine.name());
                Ok(engine)
            })
            .map(|e| &**e)
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn engine_name(&self) -> String {
        self.engine
            .get()
            .map(|e| e.name().to_string())
            .unwrap_or_else(|| "uninitialized".to_string())
    }

    pub fn recognize(&self, image: &RgbImage) -> Result<String, OcrError> {
        self.engine()?.recognize(image)
    }

    /// 不会失败：引擎出错时返回 `[OCR ERROR: ...]`
    pub fn recognize_or_marker(&self, image: &RgbImage) -> String {
        match self.recognize(image) {
            Ok(text) => {
                debug!("🔤 recognised {} chars", text.len());
                text
            }
            Err(e) => {
                warn!("⚠️ OCR failed: {}", e);
                error_marker(&e)
            }
        }
    }
}

pub fn error_marker(err: &OcrError) -> String {
    format!("[OCR ERROR: {}]", err)
}
