//! Archive splitting
//!
//! Large files are cut into numbered volumes before upload. The numeric
//! suffix of each volume is the only thing that tells the reassembling side
//! the order, so [`discover_parts`] sorts by the parsed number rather than
//! relying on directory listing order.
//!
//! ## Implementations
//!
//! - [`SevenZipSplitter`]: runs the external `7zz`/`7z` binary in store mode
//! - [`RawSplitter`]: pure Rust byte-range cutter used when no 7-Zip is installed

mod raw;
mod sevenzip;

pub use raw::RawSplitter;
pub use sevenzip::SevenZipSplitter;

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::types::{ArchivePart, PartSize};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Cuts a file on disk into ordered, bounded-size parts
#[async_trait]
pub trait Splitter: Send + Sync {
    /// Split `input` into volumes named `<output>.001`, `<output>.002`, ...
    ///
    /// The source file is deleted once the split succeeds. Parts are returned
    /// in sequence order with 0-based indices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Splitter`] if the split fails or produces no parts.
    async fn split(&self, input: &Path, output: &Path, part_size: PartSize) -> Result<Vec<ArchivePart>>;

    /// Name of the archive whose volumes will hold `source_name`
    fn archive_file_name(&self, source_name: &str) -> String;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Choose a splitter from the tools configuration
///
/// An explicit `sevenzip_path` wins; otherwise PATH is searched when
/// `search_path` is set. Without a 7-Zip binary the raw splitter is used.
pub fn from_config(tools: &ToolsConfig) -> Arc<dyn Splitter> {
    let splitter: Arc<dyn Splitter> = if let Some(ref path) = tools.sevenzip_path {
        Arc::new(SevenZipSplitter::new(path.clone()))
    } else if tools.search_path {
        SevenZipSplitter::from_path()
            .map(|s| Arc::new(s) as Arc<dyn Splitter>)
            .unwrap_or_else(|| Arc::new(RawSplitter))
    } else {
        Arc::new(RawSplitter)
    };

    tracing::info!(splitter = splitter.name(), "archive splitter selected");
    splitter
}

/// List the volumes of `archive_file_name` in `dir`, in split order
///
/// Only entries named `<archive_file_name>.<digits>` are considered. They are
/// ordered by the numeric value of the suffix and must form a contiguous run
/// starting at 1, so a missing volume is reported instead of silently
/// producing a shorter sequence.
pub async fn discover_parts(dir: &Path, archive_file_name: &str) -> Result<Vec<ArchivePart>> {
    let prefix = format!("{archive_file_name}.");
    let mut found = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(suffix) = name.strip_prefix(&prefix) else {
            continue;
        };
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(number) = suffix.parse::<u64>() else {
            continue;
        };
        let size = entry.metadata().await?.len();
        found.push((number, entry.path(), size));
    }

    if found.is_empty() {
        return Err(Error::Splitter(format!(
            "no parts named {archive_file_name}.NNN in {}",
            dir.display()
        )));
    }

    found.sort_by_key(|(number, _, _)| *number);

    let mut parts = Vec::with_capacity(found.len());
    for (index, (number, path, size)) in found.into_iter().enumerate() {
        if number != index as u64 + 1 {
            return Err(Error::Splitter(format!(
                "part sequence of {archive_file_name} is not contiguous: expected .{:03}, found .{number:03}",
                index + 1
            )));
        }
        parts.push(ArchivePart { path, index, size });
    }

    Ok(parts)
}
