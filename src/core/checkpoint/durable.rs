//! 原子持久化写入：临时文件 → fsync → 一步替换
//!
//! 临时文件放在目标文件同一目录下，保证替换发生在同一文件系统内。
//! 崩溃时目标文件要么是旧内容，要么是新内容，不会出现半截文件。

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::core::error::{Result, TimelineError};

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |source: std::io::Error| TimelineError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(persist_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(persist_err)?;
    tmp.write_all(bytes).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

/// 格式化 JSON，经 [`write_atomic`] 写出
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}
