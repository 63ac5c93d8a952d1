//! Spooling path: download to disk, split, upload every part concurrently

use super::{JobContext, Relay, run_phase};
use crate::error::{Error, Result};
use crate::sink::UploadSink;
use crate::types::{ArchivePart, Event, JobId, RemoteFileInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio_util::io::ReaderStream;

const INPUT_DIR: &str = "input";
const PARTS_DIR: &str = "parts";

/// Job-scoped spool directory, removed on every exit path
///
/// Laid out as `<root>/job_<id>_<random>/{input,parts}`. The random suffix
/// keeps pools and processes sharing one root apart, and nothing outside the
/// job's own directory is ever removed.
///
/// [`cleanup`](Self::cleanup) is the normal way out and may be called any
/// number of times. If the owning future is dropped before it runs, the
/// directory is removed synchronously on drop.
#[derive(Debug)]
pub struct SpoolDir {
    dir: TempDir,
}

impl SpoolDir {
    /// Create a fresh job directory under `root`
    pub async fn create(root: &Path, id: JobId) -> Result<Self> {
        let context = |path: &Path, e: std::io::Error| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create spool directory '{}': {}", path.display(), e),
            ))
        };

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| context(root, e))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job_{id}_"))
            .tempdir_in(root)
            .map_err(|e| context(root, e))?;

        for sub in [INPUT_DIR, PARTS_DIR] {
            let path = dir.path().join(sub);
            tokio::fs::create_dir(&path)
                .await
                .map_err(|e| context(&path, e))?;
        }
        Ok(Self { dir })
    }

    /// Directory root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the downloaded file named `name` is written
    pub fn input_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(INPUT_DIR).join(name)
    }

    /// Where split parts are written
    pub fn parts_dir(&self) -> PathBuf {
        self.dir.path().join(PARTS_DIR)
    }

    /// Remove the directory and everything in it
    ///
    /// A directory that is already gone counts as success.
    pub async fn cleanup(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(self.dir.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Relay {
    /// Relay a file larger than `part_threshold` through the spool directory
    ///
    /// The job directory is removed before this returns, whatever the outcome.
    pub async fn spool(&self, ctx: &JobContext, url: &str, info: &RemoteFileInfo) -> Result<Vec<String>> {
        self.check_disk_space(info.size)?;

        let dir = SpoolDir::create(&self.config.relay.temp_dir, ctx.id).await?;
        let result = self.spool_in(ctx, url, info, &dir).await;

        if let Err(e) = dir.cleanup().await {
            tracing::warn!(job_id = %ctx.id, error = %e, "spool cleanup failed");
        }
        result
    }

    async fn spool_in(
        &self,
        ctx: &JobContext,
        url: &str,
        info: &RemoteFileInfo,
        dir: &SpoolDir,
    ) -> Result<Vec<String>> {
        let timeouts = &self.config.timeouts;
        let input = dir.input_path(&info.name);

        ctx.status(&format!("Downloading file {}", info.name));
        let bytes = ctx
            .phase(
                "spool download",
                timeouts.spool_download,
                self.download_to_file(url, &input, info.size),
            )
            .await?;
        tracing::info!(job_id = %ctx.id, bytes, "file spooled");
        ctx.emit(Event::Downloaded { id: ctx.id, bytes });

        ctx.status("Splitting file into parts");
        let output = dir
            .parts_dir()
            .join(self.splitter.archive_file_name(&info.name));
        let part_size = self.config.relay.part_size;
        let parts = ctx
            .phase(
                "split",
                timeouts.split,
                async { self.splitter.split(&input, &output, part_size).await.map_err(as_splitter_error) },
            )
            .await?;
        tracing::info!(job_id = %ctx.id, parts = parts.len(), splitter = self.splitter.name(), "file split");
        ctx.emit(Event::SplitComplete {
            id: ctx.id,
            parts: parts.len(),
        });

        ctx.status(&format!("Uploading {} parts", parts.len()));
        upload_parts(ctx, self.sink.clone(), parts, timeouts.part_upload).await
    }

    async fn download_to_file(&self, url: &str, path: &Path, expected: u64) -> Result<u64> {
        let mut response = self.fetcher.fetch_body(url).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > expected {
                return Err(Error::IncompleteTransfer {
                    expected,
                    actual: written,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written != expected {
            return Err(Error::IncompleteTransfer {
                expected,
                actual: written,
            });
        }
        Ok(written)
    }

    /// Make sure the spool filesystem can hold the download and its parts
    ///
    /// Required space is `size × size_multiplier + min_free_space`.
    pub(crate) fn check_disk_space(&self, size: u64) -> Result<()> {
        let settings = &self.config.disk_space;
        if !settings.enabled {
            return Ok(());
        }

        let required = (size as f64 * settings.size_multiplier) as u64;
        let required_with_buffer = required.saturating_add(settings.min_free_space);

        // temp_dir may not exist yet; walk up to the nearest existing ancestor
        let temp_dir = &self.config.relay.temp_dir;
        let check_path = temp_dir
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("."));

        let available = crate::utils::get_available_space(check_path).map_err(|e| {
            Error::DiskSpaceCheckFailed(format!(
                "Failed to check disk space for '{}': {}",
                check_path.display(),
                e
            ))
        })?;

        if available < required_with_buffer {
            return Err(Error::InsufficientSpace {
                required: required_with_buffer,
                available,
            });
        }
        Ok(())
    }
}

/// Anything the splitter reports that is not cancellation is a split failure
fn as_splitter_error(error: Error) -> Error {
    match error {
        e @ (Error::Splitter(_) | Error::Cancelled | Error::DeadlineExceeded { .. }) => e,
        other => Error::Splitter(other.to_string()),
    }
}

/// Upload every part concurrently and return identifiers in part order
///
/// Each task carries its part's index and the result lands in that slot, so
/// completion order never affects the returned sequence. The first failure
/// returns immediately; dropping the [`JoinSet`] aborts the remaining uploads.
async fn upload_parts(
    ctx: &JobContext,
    sink: Arc<dyn UploadSink>,
    parts: Vec<ArchivePart>,
    limit: Duration,
) -> Result<Vec<String>> {
    let total = parts.len();
    let mut slots: Vec<Option<String>> = vec![None; total];
    let mut tasks = JoinSet::new();

    for part in parts {
        let sink = sink.clone();
        let token = ctx.token.clone();
        tasks.spawn(async move {
            let result = run_phase(&token, "part upload", limit, upload_part(sink.as_ref(), &part)).await;
            if let Err(e) = tokio::fs::remove_file(&part.path).await {
                tracing::debug!(path = %part.path.display(), error = %e, "part file not removed");
            }
            (part.index, result)
        });
    }

    let mut done = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (index, result) =
            joined.map_err(|e| Error::Other(format!("part upload task failed: {e}")))?;

        let identifier = match result {
            Ok(id) if !id.trim().is_empty() => id,
            Ok(_) => {
                return Err(Error::PartUpload {
                    index,
                    reason: "sink returned an empty identifier".to_string(),
                });
            }
            Err(e @ (Error::Cancelled | Error::DeadlineExceeded { .. })) => return Err(e),
            Err(e) => {
                return Err(Error::PartUpload {
                    index,
                    reason: e.to_string(),
                });
            }
        };

        let slot = slots
            .get_mut(index)
            .ok_or_else(|| Error::Other(format!("part index {index} out of range for {total} parts")))?;
        *slot = Some(identifier);

        done += 1;
        tracing::debug!(job_id = %ctx.id, index, done, total, "part uploaded");
        ctx.emit(Event::PartUploaded { id: ctx.id, index });
        ctx.status(&format!("Uploaded part {done}/{total}"));
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| Error::PartUpload {
                index,
                reason: "no result reported".to_string(),
            })
        })
        .collect()
}

async fn upload_part(sink: &dyn UploadSink, part: &ArchivePart) -> Result<String> {
    let file = tokio::fs::File::open(&part.path).await?;
    sink.upload(&part.file_name(), Box::pin(ReaderStream::new(file)), part.size)
        .await
}
