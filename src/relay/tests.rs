use super::*;
use crate::error::ErrorKind;
use crate::splitter::RawSplitter;
use crate::test_helpers::{FakeSink, payload, serve_file, spool_dirs, test_config};
use crate::types::{JobId, noop_events};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use wiremock::MockServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn relay_with(root: &Path, sink: Arc<FakeSink>) -> Relay {
    Relay::new(
        Arc::new(test_config(root)),
        RemoteFetcher::default(),
        sink,
        Arc::new(RawSplitter),
    )
}

fn context(id: u64) -> (JobContext, broadcast::Receiver<Event>) {
    let (tx, rx) = broadcast::channel(64);
    let ctx = JobContext::new(JobId(id), CancellationToken::new(), noop_events(), tx);
    (ctx, rx)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn run_phase_stops_on_cancel() {
    let token = CancellationToken::new();
    token.cancel();
    let result: Result<()> = run_phase(&token, "test", Duration::from_secs(5), async {
        std::future::pending::<()>().await;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn run_phase_reports_which_phase_timed_out() {
    let token = CancellationToken::new();
    let result: Result<()> = run_phase(&token, "split", Duration::from_millis(20), async {
        std::future::pending::<()>().await;
        Ok(())
    })
    .await;
    match result {
        Err(Error::DeadlineExceeded { phase }) => assert_eq!(phase, "split"),
        other => panic!("expected deadline, got {other:?}"),
    }
}

#[test]
fn check_rejects_empty_name_and_oversize() {
    let dir = TempDir::new().unwrap();
    let relay = relay_with(dir.path(), Arc::new(FakeSink::new()));

    let empty = RemoteFileInfo {
        name: String::new(),
        size: 10,
    };
    assert!(matches!(relay.check(&empty), Err(Error::EmptyFileName)));

    let huge = RemoteFileInfo {
        name: "huge.bin".into(),
        size: relay.config().relay.max_file_size + 1,
    };
    assert_eq!(
        relay.check(&huge).unwrap_err().kind(),
        ErrorKind::MaxFileSizeExceeded
    );

    let at_threshold = RemoteFileInfo {
        name: "edge.bin".into(),
        size: 1024,
    };
    assert_eq!(relay.check(&at_threshold).unwrap(), Route::Streaming);
}

#[tokio::test]
async fn small_file_is_streamed_without_spool_dir() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let data = payload(900);
    serve_file(&server, "/small.bin", data.clone()).await;

    let sink = Arc::new(FakeSink::new());
    let relay = relay_with(dir.path(), sink.clone());
    let (ctx, mut rx) = context(1);

    let ids = relay
        .run(&ctx, &format!("{}/small.bin", server.uri()))
        .await
        .unwrap();

    assert_eq!(ids, vec!["id-small.bin".to_string()]);
    assert_eq!(sink.uploads()[0].data, data);
    assert!(!dir.path().join("spool").exists(), "streaming must not touch disk");
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        Event::MetadataResolved {
            route: Route::Streaming,
            ..
        }
    )));
}

#[tokio::test]
async fn streaming_upload_failure_is_never_success() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/mid.bin", payload(1000)).await;

    // sink gives up after a fifth of the file
    let sink = Arc::new(FakeSink::new().fail_after(200));
    let relay = relay_with(dir.path(), sink);
    let (ctx, _rx) = context(2);

    let err = relay
        .run(&ctx, &format!("{}/mid.bin", server.uri()))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err.kind(),
            ErrorKind::PartUploadFailure | ErrorKind::IncompleteTransfer
        ),
        "unexpected kind {:?}",
        err.kind()
    );
}

#[tokio::test]
async fn streaming_sink_io_error_is_an_upload_failure() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/mid.bin", payload(1000)).await;

    let sink = Arc::new(FakeSink::new().fail_after(200).io_failures());
    let relay = relay_with(dir.path(), sink);
    let (ctx, _rx) = context(14);

    let err = relay
        .run(&ctx, &format!("{}/mid.bin", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartUpload { index: 0, .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::PartUploadFailure);
}

#[tokio::test]
async fn streaming_short_body_is_incomplete_transfer() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/short.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", "500")
                .set_body_bytes(vec![0u8; 500]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/short.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 300]))
        .mount(&server)
        .await;

    let sink = Arc::new(FakeSink::new());
    let relay = relay_with(dir.path(), sink.clone());
    let (ctx, _rx) = context(3);

    let err = relay
        .run(&ctx, &format!("{}/short.bin", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::IncompleteTransfer {
            expected: 500,
            actual: 300
        }
    ));
    assert!(sink.uploads().is_empty(), "nothing may be reported as uploaded");
}

#[tokio::test]
async fn streaming_body_status_error() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let relay = relay_with(dir.path(), Arc::new(FakeSink::new()));
    let (ctx, _rx) = context(4);
    let err = relay
        .run(&ctx, &format!("{}/f.bin", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamNonSuccessStatus);
}

#[tokio::test]
async fn spooled_parts_keep_file_order_despite_completion_order() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let data = payload(2560);
    serve_file(&server, "/large.bin", data.clone()).await;

    // the last part finishes first, the first part last
    let sink = Arc::new(
        FakeSink::new()
            .delay(".001", Duration::from_millis(150))
            .delay(".002", Duration::from_millis(75)),
    );
    let relay = relay_with(dir.path(), sink.clone());
    let (ctx, mut rx) = context(5);

    let ids = relay
        .run(&ctx, &format!("{}/large.bin", server.uri()))
        .await
        .unwrap();

    assert_eq!(
        ids,
        vec![
            "id-large.bin.001".to_string(),
            "id-large.bin.002".to_string(),
            "id-large.bin.003".to_string(),
        ]
    );

    let uploads = sink.uploads();
    assert_eq!(uploads[0].name, "large.bin.003", "completion order differs");
    let mut by_name = uploads.clone();
    by_name.sort_by(|a, b| a.name.cmp(&b.name));
    let sizes: Vec<usize> = by_name.iter().map(|u| u.data.len()).collect();
    assert_eq!(sizes, vec![1024, 1024, 512]);
    let joined: Vec<u8> = by_name.into_iter().flat_map(|u| u.data).collect();
    assert_eq!(joined, data);

    assert!(spool_dirs(&dir.path().join("spool"), JobId(5)).is_empty());
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, Event::SplitComplete { parts: 3, .. })));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::PartUploaded { .. }))
            .count(),
        3
    );
}

#[tokio::test]
async fn failed_part_fails_job_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/large.bin", payload(3000)).await;

    let sink = Arc::new(FakeSink::new().fail_on(".002"));
    let relay = relay_with(dir.path(), sink);
    let (ctx, _rx) = context(6);

    let err = relay
        .run(&ctx, &format!("{}/large.bin", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartUpload { index: 1, .. }));
    assert!(spool_dirs(&dir.path().join("spool"), JobId(6)).is_empty());
}

#[tokio::test]
async fn empty_identifier_is_a_part_upload_failure() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/large.bin", payload(2048)).await;

    let relay = relay_with(dir.path(), Arc::new(FakeSink::new().empty_ids()));
    let (ctx, _rx) = context(7);

    let err = relay
        .run(&ctx, &format!("{}/large.bin", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartUploadFailure);
}

#[tokio::test]
async fn cancel_during_upload_removes_spool_dir() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/large.bin", payload(2048)).await;

    // uploads never get a permit
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(FakeSink::new().gated(gate));
    let relay = relay_with(dir.path(), sink.clone());
    let (ctx, _rx) = context(8);
    let token = ctx.token.clone();

    let url = format!("{}/large.bin", server.uri());
    let job = tokio::spawn({
        let relay = relay.clone();
        async move { relay.run(&ctx, &url).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.started.load(std::sync::atomic::Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let live = spool_dirs(&dir.path().join("spool"), JobId(8));
    assert_eq!(live.len(), 1);
    let spool = live[0].clone();

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), job)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!spool.exists());
}

#[tokio::test]
async fn status_lines_follow_the_spool_phases() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_file(&server, "/large.bin", payload(1500)).await;

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = lines.clone();
    let (tx, _rx) = broadcast::channel(16);
    let ctx = JobContext::new(
        JobId(9),
        CancellationToken::new(),
        Arc::new(move |line: &str| recorder.lock().unwrap().push(line.to_string())),
        tx,
    );

    relay_with(dir.path(), Arc::new(FakeSink::new()))
        .run(&ctx, &format!("{}/large.bin", server.uri()))
        .await
        .unwrap();

    let lines = lines.lock().unwrap().clone();
    assert_eq!(lines[0], "Downloading file large.bin");
    assert_eq!(lines[1], "Splitting file into parts");
    assert_eq!(lines[2], "Uploading 2 parts");
    assert_eq!(lines.last().unwrap(), "Uploaded part 2/2");
}

#[tokio::test]
async fn spool_dir_cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let spool = SpoolDir::create(dir.path(), JobId(10)).await.unwrap();
    tokio::fs::write(spool.parts_dir().join("x.001"), b"x")
        .await
        .unwrap();

    spool.cleanup().await.unwrap();
    spool.cleanup().await.unwrap();
    assert!(!spool.path().exists());
}

#[tokio::test]
async fn spool_dir_drop_removes_directory() {
    let dir = TempDir::new().unwrap();
    let path = {
        let spool = SpoolDir::create(dir.path(), JobId(11)).await.unwrap();
        spool.path().to_path_buf()
    };
    assert!(!path.exists());
}

#[tokio::test]
async fn spool_dirs_for_the_same_id_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let first = SpoolDir::create(dir.path(), JobId(1)).await.unwrap();
    let live = first.input_path("live.bin");
    tokio::fs::write(&live, b"in flight").await.unwrap();

    // another pool or process starting its own job 1 on the same root
    let second = SpoolDir::create(dir.path(), JobId(1)).await.unwrap();
    assert_ne!(first.path(), second.path());
    assert!(live.exists());

    second.cleanup().await.unwrap();
    assert!(live.exists());
    assert!(first.parts_dir().exists());
}

#[tokio::test]
async fn existing_directories_under_the_root_are_left_alone() {
    let dir = TempDir::new().unwrap();
    let other = dir.path().join("job_12");
    tokio::fs::create_dir_all(&other).await.unwrap();
    tokio::fs::write(other.join("leftover"), b"old").await.unwrap();

    let spool = SpoolDir::create(dir.path(), JobId(12)).await.unwrap();
    assert!(other.join("leftover").exists());
    assert!(spool.input_path("x").parent().unwrap().exists());
    assert!(spool.parts_dir().exists());
}

#[tokio::test]
async fn file_named_like_the_parts_directory_is_spooled() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let data = payload(2500);
    serve_file(&server, "/parts", data.clone()).await;

    let sink = Arc::new(FakeSink::new());
    let relay = relay_with(dir.path(), sink.clone());
    let (ctx, _rx) = context(13);

    let ids = relay
        .run(&ctx, &format!("{}/parts", server.uri()))
        .await
        .unwrap();

    assert_eq!(ids, vec!["id-parts.001", "id-parts.002", "id-parts.003"]);
    let mut uploads = sink.uploads();
    uploads.sort_by(|a, b| a.name.cmp(&b.name));
    let joined: Vec<u8> = uploads.into_iter().flat_map(|u| u.data).collect();
    assert_eq!(joined, data);
    assert!(spool_dirs(&dir.path().join("spool"), JobId(13)).is_empty());
}

#[test]
fn insufficient_disk_space_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.disk_space.enabled = true;
    config.disk_space.min_free_space = u64::MAX / 2;
    let relay = Relay::new(
        Arc::new(config),
        RemoteFetcher::default(),
        Arc::new(FakeSink::new()),
        Arc::new(RawSplitter),
    );

    assert!(matches!(
        relay.check_disk_space(4096),
        Err(Error::InsufficientSpace { .. })
    ));
}
