//! Shared helpers for in-crate tests

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::{ByteStream, ChatRef, MessageRef, UploadSink};
use crate::types::{JobId, PartSize, SizeUnit};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Small limits so tests exercise both routes with tiny files
///
/// Threshold 1 KiB, part size 1 KiB, ceiling 1 MiB, two workers, disk
/// check off, spool root under `root`.
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.relay.temp_dir = root.join("spool");
    config.relay.part_threshold = 1024;
    config.relay.part_size = PartSize::new(1, SizeUnit::Kilo);
    config.relay.max_file_size = 1024 * 1024;
    config.relay.pipe_capacity = 4;
    config.workers.worker_count = 2;
    config.workers.shutdown_timeout = Duration::from_secs(5);
    config.disk_space.enabled = false;
    config.timeouts.metadata = Duration::from_secs(10);
    config.timeouts.streaming = Duration::from_secs(10);
    config.timeouts.spool_download = Duration::from_secs(10);
    config.timeouts.split = Duration::from_secs(10);
    config.timeouts.part_upload = Duration::from_secs(10);
    config
}

/// Spool directories currently present for job `id` under `root`
pub(crate) fn spool_dirs(root: &Path, id: JobId) -> Vec<PathBuf> {
    let prefix = format!("job_{id}_");
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect()
}

/// Deterministic file contents
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serve `body` at `route` for both HEAD and GET
pub(crate) async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", body.len().to_string().as_str())
                .set_body_bytes(body.clone()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Answer every connection with a fixed raw HTTP response
///
/// Used where a mock server would add headers on its own (e.g. a HEAD
/// response with no `Content-Length`).
pub(crate) async fn serve_raw(response: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// One finished upload
#[derive(Clone, Debug)]
pub(crate) struct Upload {
    pub name: String,
    pub data: Vec<u8>,
}

/// In-memory sink with switchable failure modes
#[derive(Default)]
pub(crate) struct FakeSink {
    pub uploads: Mutex<Vec<Upload>>,
    pub texts: Mutex<Vec<(MessageRef, String)>>,
    pub started: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    next_message: AtomicI64,
    delays: Vec<(String, Duration)>,
    fail_suffix: Option<String>,
    fail_after: Option<usize>,
    io_failures: bool,
    empty_ids: bool,
    gate: Option<Arc<Semaphore>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before reading when the upload name ends with `suffix`
    pub fn delay(mut self, suffix: &str, delay: Duration) -> Self {
        self.delays.push((suffix.to_string(), delay));
        self
    }

    /// Reject uploads whose name ends with `suffix`
    pub fn fail_on(mut self, suffix: &str) -> Self {
        self.fail_suffix = Some(suffix.to_string());
        self
    }

    /// Fail once at least `bytes` have been read from the body
    pub fn fail_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Report `fail_after` failures as I/O errors instead of sink errors
    pub fn io_failures(mut self) -> Self {
        self.io_failures = true;
        self
    }

    /// Accept uploads but hand back empty identifiers
    pub fn empty_ids(mut self) -> Self {
        self.empty_ids = true;
        self
    }

    /// Every upload waits for one permit before reading
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<(MessageRef, String)> {
        self.texts.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UploadSink for FakeSink {
    async fn upload(&self, name: &str, mut body: ByteStream, _size_hint: u64) -> Result<String> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Sink(e.to_string()))?
                .forget();
        }
        if let Some((_, delay)) = self.delays.iter().find(|(s, _)| name.ends_with(s.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Sink(format!("reading body: {e}")))?;
            data.extend_from_slice(&chunk);
            if let Some(limit) = self.fail_after
                && data.len() >= limit
            {
                if self.io_failures {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "simulated connection reset",
                    )));
                }
                return Err(Error::Sink("simulated upload failure".to_string()));
            }
        }

        if let Some(suffix) = &self.fail_suffix
            && name.ends_with(suffix.as_str())
        {
            return Err(Error::Sink(format!("rejected {name}")));
        }

        self.uploads.lock().unwrap().push(Upload {
            name: name.to_string(),
            data,
        });
        if self.empty_ids {
            Ok(String::new())
        } else {
            Ok(format!("id-{name}"))
        }
    }

    async fn send_text(&self, _chat: ChatRef, text: &str) -> Result<MessageRef> {
        let message = MessageRef(self.next_message.fetch_add(1, Ordering::SeqCst) + 1);
        self.texts.lock().unwrap().push((message, text.to_string()));
        Ok(message)
    }

    async fn edit_text(&self, _chat: ChatRef, message: MessageRef, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push((message, text.to_string()));
        Ok(())
    }

    fn link(&self, identifier: &str) -> String {
        format!("https://files.example/{identifier}")
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
