//! Core types for bahador

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ErrorKind, JobError};

/// Unique identifier for a relay job
///
/// Allocated from a monotonic counter, so two live jobs never share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Name and size of a remote file, read once from response headers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    /// File name, possibly empty if none could be derived
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
}

/// Which relay path a job takes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Pipe the body straight into the sink
    Streaming,
    /// Download to disk, split, upload parts
    Spooling,
}

impl Route {
    /// Files at or below `threshold` bytes are streamed, larger ones spooled
    pub fn for_size(size: u64, threshold: u64) -> Self {
        if size <= threshold {
            Route::Streaming
        } else {
            Route::Spooling
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Streaming => f.write_str("streaming"),
            Route::Spooling => f.write_str("spooling"),
        }
    }
}

/// Unit suffix accepted by the archiver's volume switch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeUnit {
    /// Bytes (`b`)
    Bytes,
    /// KiB (`k`)
    Kilo,
    /// MiB (`m`)
    Mega,
    /// GiB (`g`)
    Giga,
}

impl SizeUnit {
    fn multiplier(self) -> u64 {
        match self {
            SizeUnit::Bytes => 1,
            SizeUnit::Kilo => 1024,
            SizeUnit::Mega => 1024 * 1024,
            SizeUnit::Giga => 1024 * 1024 * 1024,
        }
    }

    fn suffix(self) -> char {
        match self {
            SizeUnit::Bytes => 'b',
            SizeUnit::Kilo => 'k',
            SizeUnit::Mega => 'm',
            SizeUnit::Giga => 'g',
        }
    }
}

/// Maximum size of one split part, written as `<number>[b|k|m|g]`
///
/// # Examples
///
/// ```
/// use bahador::types::PartSize;
///
/// let size: PartSize = "200m".parse().unwrap();
/// assert_eq!(size.bytes(), 200 * 1024 * 1024);
/// assert_eq!(size.to_string(), "200m");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartSize {
    /// Numeric part
    pub value: u64,
    /// Unit suffix
    pub unit: SizeUnit,
}

impl PartSize {
    /// Build a part size from a value and unit
    pub const fn new(value: u64, unit: SizeUnit) -> Self {
        Self { value, unit }
    }

    /// Size in bytes
    pub fn bytes(&self) -> u64 {
        self.value.saturating_mul(self.unit.multiplier())
    }
}

impl std::fmt::Display for PartSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl std::str::FromStr for PartSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (digits, unit) = match s.chars().last() {
            Some('b') => (&s[..s.len() - 1], SizeUnit::Bytes),
            Some('k') => (&s[..s.len() - 1], SizeUnit::Kilo),
            Some('m') => (&s[..s.len() - 1], SizeUnit::Mega),
            Some('g') => (&s[..s.len() - 1], SizeUnit::Giga),
            Some(c) if c.is_ascii_digit() => (s.as_str(), SizeUnit::Bytes),
            _ => return Err(format!("invalid part size {s:?}")),
        };
        let value = digits
            .parse::<u64>()
            .map_err(|e| format!("invalid part size {s:?}: {e}"))?;
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for PartSize {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartSize> for String {
    fn from(size: PartSize) -> Self {
        size.to_string()
    }
}

/// One volume produced by a [`Splitter`](crate::splitter::Splitter)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchivePart {
    /// Location on disk
    pub path: PathBuf,
    /// 0-based position in the split sequence
    pub index: usize,
    /// Size in bytes
    pub size: u64,
}

impl ArchivePart {
    /// File name used when uploading this part
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of a relay job: ordered identifiers on success
pub type JobResult = std::result::Result<Vec<String>, JobError>;

/// Per-job status callback
///
/// Invoked with short human-readable progress lines ("Downloading file ...").
/// Implementations must not block.
pub type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback that ignores every status line
pub fn noop_events() -> EventCallback {
    Arc::new(|_: &str| {})
}

/// Events emitted by the relay pool
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted into the queue
    JobQueued {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
    },
    /// A worker picked the job up
    JobStarted {
        /// Job ID
        id: JobId,
    },
    /// Remote metadata resolved and route chosen
    MetadataResolved {
        /// Job ID
        id: JobId,
        /// Derived file name
        name: String,
        /// Declared size
        size: u64,
        /// Chosen relay path
        route: Route,
    },
    /// Spooled download finished
    Downloaded {
        /// Job ID
        id: JobId,
        /// Bytes written to disk
        bytes: u64,
    },
    /// Archiver produced its parts
    SplitComplete {
        /// Job ID
        id: JobId,
        /// Number of parts
        parts: usize,
    },
    /// One part accepted by the sink
    PartUploaded {
        /// Job ID
        id: JobId,
        /// 0-based part index
        index: usize,
    },
    /// Job finished successfully
    JobCompleted {
        /// Job ID
        id: JobId,
        /// Number of identifiers returned
        identifiers: usize,
    },
    /// Job failed
    JobFailed {
        /// Job ID
        id: JobId,
        /// Taxonomy classification
        kind: ErrorKind,
        /// Detailed error text
        error: String,
    },
    /// Job stopped because it was cancelled
    JobCancelled {
        /// Job ID
        id: JobId,
    },
    /// Pool is shutting down
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_threshold_is_inclusive() {
        let threshold = 200 * 1024 * 1024;
        assert_eq!(Route::for_size(0, threshold), Route::Streaming);
        assert_eq!(Route::for_size(threshold, threshold), Route::Streaming);
        assert_eq!(Route::for_size(threshold + 1, threshold), Route::Spooling);
    }

    #[test]
    fn part_size_parses_units() {
        assert_eq!("512b".parse::<PartSize>().unwrap().bytes(), 512);
        assert_eq!("4k".parse::<PartSize>().unwrap().bytes(), 4096);
        assert_eq!("200M".parse::<PartSize>().unwrap().bytes(), 200 << 20);
        assert_eq!("2g".parse::<PartSize>().unwrap().bytes(), 2 << 30);
        assert_eq!("1000".parse::<PartSize>().unwrap().bytes(), 1000);
    }

    #[test]
    fn part_size_rejects_garbage() {
        assert!("".parse::<PartSize>().is_err());
        assert!("m".parse::<PartSize>().is_err());
        assert!("12t".parse::<PartSize>().is_err());
        assert!("-5m".parse::<PartSize>().is_err());
    }

    #[test]
    fn part_size_renders_archiver_volume_argument() {
        let size = PartSize::new(200, SizeUnit::Mega);
        assert_eq!(format!("-v{size}"), "-v200m");
    }

    #[test]
    fn part_size_serializes_as_string() {
        let size: PartSize = serde_json::from_str("\"50k\"").unwrap();
        assert_eq!(size, PartSize::new(50, SizeUnit::Kilo));
        assert_eq!(serde_json::to_string(&size).unwrap(), "\"50k\"");
    }

    #[test]
    fn job_id_parses_with_whitespace() {
        assert_eq!(" 42".parse::<JobId>().unwrap(), JobId(42));
        assert!("abc".parse::<JobId>().is_err());
    }

    #[test]
    fn archive_part_file_name() {
        let part = ArchivePart {
            path: PathBuf::from("/spool/job_1/parts/movie.mkv.7z.002"),
            index: 1,
            size: 10,
        };
        assert_eq!(part.file_name(), "movie.mkv.7z.002");
    }
}
