//! Common test utilities for bahador integration tests

use bahador::config::TelegramConfig;
use bahador::{Config, JobId, PartSize, SizeUnit, TelegramSink};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TOKEN: &str = "42:secret";

/// Tiny thresholds so a few KiB exercise both relay paths
pub fn small_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.relay.temp_dir = root.join("spool");
    config.relay.part_threshold = 1024;
    config.relay.part_size = PartSize::new(1, SizeUnit::Kilo);
    config.relay.max_file_size = 1024 * 1024;
    config.workers.worker_count = 2;
    config.workers.shutdown_timeout = Duration::from_secs(5);
    config.disk_space.enabled = false;
    config
}

/// Spool directories left behind for job `id` under `root`
pub fn spool_dirs(root: &Path, id: JobId) -> Vec<PathBuf> {
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
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Serve `body` at `route` for both HEAD and GET
pub async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>) {
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

/// Answers `sendDocument` with `fid-<uploaded file name>`
struct StoreDocument;

impl Respond for StoreDocument {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let name = body
            .split("filename=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap_or("unknown");
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "document": { "file_id": format!("fid-{name}") }
            }
        }))
    }
}

/// Mount a minimal Bot API: documents, text messages and edits
pub async fn mount_bot_api(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendDocument")))
        .respond_with(StoreDocument)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/bot[^/]+/(sendMessage|editMessageText)$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "result": { "message_id": 77 }
        })))
        .mount(server)
        .await;
}

/// Telegram sink pointed at the mock server
pub fn telegram_sink(server: &MockServer) -> TelegramSink {
    let config = TelegramConfig {
        token: TOKEN.to_string(),
        api_host: server.uri(),
        storage_chat_id: -100,
    };
    TelegramSink::new(&config, reqwest::Client::new()).unwrap()
}

/// Bodies of every request made to a Bot API method, parsed as JSON
pub async fn bot_calls(server: &MockServer, api_method: &str) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().ends_with(api_method))
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}
