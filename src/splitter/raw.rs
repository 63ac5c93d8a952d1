//! Byte-range splitter for hosts without 7-Zip

use super::{Splitter, discover_parts};
use crate::error::{Error, Result};
use crate::types::{ArchivePart, PartSize};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

/// Cuts a file into `<output>.001`, `<output>.002`, ... of exactly the part size
///
/// The last part holds the remainder. Concatenating the parts in order gives
/// back the original bytes, so no archiver is needed on the receiving side.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawSplitter;

#[async_trait]
impl Splitter for RawSplitter {
    async fn split(&self, input: &Path, output: &Path, part_size: PartSize) -> Result<Vec<ArchivePart>> {
        let limit = part_size.bytes();
        if limit == 0 {
            return Err(Error::Splitter("part size must be greater than zero".to_string()));
        }
        let base_name = output
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Splitter(format!("invalid output path: {}", output.display())))?
            .to_string();
        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(out_dir).await?;

        let source = tokio::fs::File::open(input).await?;
        let total = source.metadata().await?.len();
        let mut reader = BufReader::new(source);

        let mut number = 1u64;
        let mut remaining = total;
        loop {
            let part_path = out_dir.join(format!("{base_name}.{number:03}"));
            let mut part = tokio::fs::File::create(&part_path).await?;
            let want = remaining.min(limit);
            let copied = tokio::io::copy(&mut (&mut reader).take(want), &mut part).await?;
            part.flush().await?;

            if copied != want {
                return Err(Error::Splitter(format!(
                    "{} shrank while splitting: part {number} got {copied} of {want} bytes",
                    input.display()
                )));
            }

            remaining -= copied;
            if remaining == 0 {
                break;
            }
            number += 1;
        }

        drop(reader);
        tokio::fs::remove_file(input).await?;

        tracing::debug!(input = %input.display(), parts = number, "raw split complete");
        discover_parts(out_dir, &base_name).await
    }

    fn archive_file_name(&self, source_name: &str) -> String {
        source_name.to_string()
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}
