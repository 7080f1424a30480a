use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use course_uploader::{
    FieldBinding, FormStateStore, HttpTransferSink, HttpUrlIssuer, InMemoryFormState, ProgressFn,
    SelectionMode, TransferSink, UploadCoordinator, UploadError, UploadSource, UploadStatus,
    UploaderConfig, UrlIssuer,
};

struct ServerState {
    addr: SocketAddr,
    received: Mutex<HashMap<String, Vec<u8>>>,
    presigned: Mutex<Vec<String>>,
}

#[derive(Deserialize)]
struct PresignReq {
    destination_path: String,
}

#[derive(Serialize)]
struct PresignResp {
    url: String,
}

async fn presign(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<PresignReq>,
) -> Json<PresignResp> {
    let url = format!("http://{}/upload/{}", state.addr, req.destination_path);
    state.presigned.lock().unwrap().push(req.destination_path);
    Json(PresignResp { url })
}

async fn receive(
    State(state): State<Arc<ServerState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> StatusCode {
    state.received.lock().unwrap().insert(path, body.to_vec());
    StatusCode::OK
}

async fn broken(body: Bytes) -> StatusCode {
    // drain the body so the client always reads the status line
    let _ = body.len();
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn hang() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    StatusCode::OK
}

async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState {
        addr,
        received: Mutex::new(HashMap::new()),
        presigned: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/api/uploads/presign", post(presign))
        .route("/upload/*path", put(receive))
        .route("/broken/*path", put(broken))
        .route("/hang/*path", put(hang))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<(u64, u64)>>>) {
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let recorder = ticks.clone();
    let progress: ProgressFn = Arc::new(move |sent, total| {
        recorder.lock().unwrap().push((sent, total));
    });
    (progress, ticks)
}

#[tokio::test]
async fn test_put_streams_body_and_reports_ticks() {
    let (addr, state) = start_server().await;
    let sink = HttpTransferSink::new(reqwest::Client::new(), "application/octet-stream");

    // larger than one stream chunk so intermediate ticks fire
    let payload = vec![9u8; 150_000];
    let source = UploadSource::from_bytes("clip.mp4", payload.clone());
    let (progress, ticks) = recording_progress();

    let result = sink
        .send(
            &format!("http://{}/upload/media/clip.mp4", addr),
            &source,
            150_000,
            progress,
            CancellationToken::new(),
        )
        .await;
    assert!(result.is_ok(), "transfer failed: {:?}", result.err());

    // 1. The endpoint received every byte under the right key
    let received = state.received.lock().unwrap();
    assert_eq!(received.get("media/clip.mp4"), Some(&payload));
    drop(received);

    // 2. Ticks grow monotonically and only the last one reads complete
    let ticks = ticks.lock().unwrap();
    assert!(ticks.len() >= 2);
    assert!(ticks.windows(2).all(|pair| pair[0].0 < pair[1].0));
    let (last, intermediate) = ticks.split_last().unwrap();
    assert_eq!(*last, (150_000, 150_000));
    assert!(intermediate.iter().all(|(sent, _)| *sent < 150_000));
}

#[tokio::test]
async fn test_put_streams_file_from_disk() {
    use std::io::Write;

    let (addr, state) = start_server().await;
    let sink = HttpTransferSink::new(reqwest::Client::new(), "application/octet-stream");

    let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&contents).unwrap();

    let source = UploadSource::from_path(tmp.path()).unwrap();
    let total = source.size_bytes().await.unwrap();
    assert_eq!(total, 10_000);

    let (progress, ticks) = recording_progress();
    let result = sink
        .send(
            &format!("http://{}/upload/media/from-disk.bin", addr),
            &source,
            total,
            progress,
            CancellationToken::new(),
        )
        .await;
    assert!(result.is_ok(), "transfer failed: {:?}", result.err());

    assert_eq!(
        state.received.lock().unwrap().get("media/from-disk.bin"),
        Some(&contents)
    );
    assert_eq!(ticks.lock().unwrap().last(), Some(&(10_000, 10_000)));
}

#[tokio::test]
async fn test_endpoint_error_surfaces_status() {
    let (addr, _state) = start_server().await;
    let sink = HttpTransferSink::new(reqwest::Client::new(), "application/octet-stream");

    let source = UploadSource::from_bytes("clip.mp4", vec![1u8; 2_000]);
    let (progress, ticks) = recording_progress();

    let result = sink
        .send(
            &format!("http://{}/broken/media/clip.mp4", addr),
            &source,
            2_000,
            progress,
            CancellationToken::new(),
        )
        .await;

    match result {
        Err(UploadError::EndpointStatus(status)) => assert_eq!(status, 500),
        other => panic!("expected an endpoint status error, got {:?}", other),
    }
    // no completion tick for a rejected payload
    assert!(ticks.lock().unwrap().iter().all(|(sent, _)| *sent < 2_000));
}

#[tokio::test]
async fn test_cancellation_aborts_the_request() {
    let (addr, _state) = start_server().await;
    let sink = HttpTransferSink::new(reqwest::Client::new(), "application/octet-stream");

    let source = UploadSource::from_bytes("clip.mp4", vec![1u8; 2_000]);
    let cancel = CancellationToken::new();
    let killer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        killer.cancel();
    });

    let started = Instant::now();
    let (progress, _ticks) = recording_progress();
    let result = sink
        .send(
            &format!("http://{}/hang/media/clip.mp4", addr),
            &source,
            2_000,
            progress,
            cancel,
        )
        .await;

    assert!(matches!(result, Err(UploadError::Canceled)));
    // the request was dropped, not run to the server's timeout
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_http_issuer_requests_and_parses() {
    let (addr, state) = start_server().await;
    let issuer = HttpUrlIssuer::new(reqwest::Client::new(), &format!("http://{}/api", addr));

    let url = issuer.issue("media/cover.png").await.unwrap();

    assert_eq!(url, format!("http://{}/upload/media/cover.png", addr));
    assert_eq!(
        *state.presigned.lock().unwrap(),
        vec!["media/cover.png".to_string()]
    );
}

#[tokio::test]
async fn test_http_issuer_surfaces_error_status() {
    let (addr, _state) = start_server().await;
    // no presign route lives under this base path
    let issuer = HttpUrlIssuer::new(reqwest::Client::new(), &format!("http://{}/missing", addr));

    let result = issuer.issue("media/cover.png").await;
    match result {
        Err(UploadError::Issuer(message)) => assert!(message.contains("404"), "{}", message),
        other => panic!("expected an issuer error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_upload_flow_against_http_endpoints() {
    let (addr, state) = start_server().await;
    let client = reqwest::Client::new();

    let form = Arc::new(InMemoryFormState::new());
    let issuer = Arc::new(HttpUrlIssuer::new(
        client.clone(),
        &format!("http://{}/api", addr),
    ));
    let sink = Arc::new(HttpTransferSink::new(client, "application/octet-stream"));
    let binding = FieldBinding::new("file", "filePaths", "media/lessons", SelectionMode::Multiple);
    let coordinator = UploadCoordinator::new(
        binding,
        UploaderConfig::development(),
        form.clone(),
        issuer,
        sink,
    );

    // 1. Submit a batch and let both transfers finish
    coordinator
        .submit_batch(vec![
            UploadSource::from_bytes("intro.mp4", vec![1u8; 150_000]),
            UploadSource::from_bytes("notes.txt", &b"lesson notes"[..]),
        ])
        .await;
    coordinator.wait_idle().await;

    // 2. URLs were issued for the derived destination paths, in order
    assert_eq!(
        *state.presigned.lock().unwrap(),
        vec![
            "media/lessons/intro.mp4".to_string(),
            "media/lessons/notes.txt".to_string(),
        ]
    );

    // 3. The endpoint holds both payloads
    let received = state.received.lock().unwrap();
    assert_eq!(
        received.get("media/lessons/intro.mp4").map(Vec::len),
        Some(150_000)
    );
    assert_eq!(
        received.get("media/lessons/notes.txt").map(|b| b.as_slice()),
        Some(&b"lesson notes"[..])
    );
    drop(received);

    // 4. The form state reflects the completed uploads
    let paths = form.path_map("filePaths");
    assert_eq!(
        paths.get("intro.mp4"),
        Some(&"media/lessons/intro.mp4".to_string())
    );
    assert_eq!(
        paths.get("notes.txt"),
        Some(&"media/lessons/notes.txt".to_string())
    );
    assert_eq!(
        coordinator.status_of("intro.mp4"),
        Some(UploadStatus::Complete)
    );
    assert_eq!(
        coordinator.status_of("notes.txt"),
        Some(UploadStatus::Complete)
    );
    assert_eq!(coordinator.progress_of("intro.mp4"), Some(100));
    assert_eq!(coordinator.active_count(), 0);
}
