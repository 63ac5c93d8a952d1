//! 7-Zip CLI splitter

use super::{Splitter, discover_parts};
use crate::error::{Error, Result};
use crate::types::{ArchivePart, PartSize};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Binary names tried in order when searching PATH
const CANDIDATES: [&str; 3] = ["7zz", "7z", "7za"];

/// Longest stderr excerpt carried in an error
const STDERR_TAIL: usize = 512;

/// Splits files into multi-volume 7z archives using the external binary
///
/// Runs `a -t7z -mx=0 -v<size> -sdel <output> <input>`: store mode (no
/// compression work), fixed volume size, source deleted on success. The child
/// is spawned with `kill_on_drop`, so abandoning the split (cancel or timeout)
/// kills the process.
///
/// # Examples
///
/// ```no_run
/// use bahador::splitter::{SevenZipSplitter, Splitter};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let splitter = SevenZipSplitter::from_path().expect("7-Zip not found in PATH");
/// let parts = splitter
///     .split(Path::new("big.iso"), Path::new("parts/big.iso.7z"), "200m".parse()?)
///     .await?;
/// println!("{} parts", parts.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SevenZipSplitter {
    binary_path: PathBuf,
}

impl SevenZipSplitter {
    /// Create a splitter with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find `7zz`, `7z` or `7za` in PATH
    pub fn from_path() -> Option<Self> {
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[async_trait]
impl Splitter for SevenZipSplitter {
    async fn split(&self, input: &Path, output: &Path, part_size: PartSize) -> Result<Vec<ArchivePart>> {
        let archive_name = output
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| n.ends_with(".7z"))
            .ok_or_else(|| {
                Error::Splitter(format!(
                    "output path must be a file path with .7z extension: {}",
                    output.display()
                ))
            })?
            .to_string();
        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(out_dir).await?;

        tracing::debug!(
            binary = %self.binary_path.display(),
            input = %input.display(),
            output = %output.display(),
            part_size = %part_size,
            "running 7-Zip"
        );

        let result = Command::new(&self.binary_path)
            .arg("a")
            .arg("-t7z")
            .arg("-mx=0")
            .arg(format!("-v{part_size}"))
            .arg("-sdel")
            .arg("-bd")
            .arg("-y")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Splitter(format!("failed to execute 7-Zip: {e}")))?;

        if !result.status.success() {
            return Err(Error::Splitter(format!(
                "7-Zip exited with {}: {}",
                result.status,
                stderr_tail(&result.stderr)
            )));
        }

        discover_parts(out_dir, &archive_name).await
    }

    fn archive_file_name(&self, source_name: &str) -> String {
        format!("{source_name}.7z")
    }

    fn name(&self) -> &'static str {
        "7zip"
    }
}
