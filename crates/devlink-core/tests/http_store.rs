//! Integration tests for the HTTP object store against a local fixture
//! endpoint speaking the storage REST API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use devlink_core::storage::{
    delete_entry, list_directory, storage_usage, Destination, HttpObjectStore, ObjectStore,
    ProgressSink,
};
use devlink_core::upload::{FilePayload, UploadSession, UploadSettings, UploadStatus};
use devlink_core::Error;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

const LISTING: &str = r#"[
    {"name": ".emptyFolderPlaceholder", "id": "p1", "updated_at": "2024-05-01T08:00:00.000Z",
     "metadata": {"size": 0, "mimetype": "application/octet-stream"}},
    {"name": "photos", "id": null, "updated_at": null, "metadata": null},
    {"name": "report.pdf", "id": "f1", "updated_at": "2024-05-01T08:00:00.000Z",
     "metadata": {"size": 2048, "mimetype": "application/pdf"}}
]"#;

const PHOTOS: &str = r#"[
    {"name": "cat.jpg", "id": "f2", "updated_at": "2024-05-02T08:00:00.000Z",
     "metadata": {"size": 1000, "mimetype": "image/jpeg"}}
]"#;

const NOT_FOUND: &str = r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#;

/// Read rate of the `slow.bin` handler.
const SLOW_READ_BYTES_PER_SEC: f64 = 32.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    upsert: Option<String>,
    authorization: Option<String>,
    apikey: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
    received: usize,
}

#[derive(Clone)]
struct Fixture {
    requests: Arc<Mutex<Vec<Recorded>>>,
    stored: Arc<Mutex<HashSet<String>>>,
}

impl Default for Fixture {
    fn default() -> Self {
        let stored = [
            "dev-1/.emptyFolderPlaceholder",
            "dev-1/report.pdf",
            "dev-1/photos/cat.jpg",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self {
            requests: Arc::default(),
            stored: Arc::new(Mutex::new(stored)),
        }
    }
}

impl Fixture {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Drain `body` no faster than `bytes_per_sec`, returning how much arrived.
async fn read_slowly(body: Body, bytes_per_sec: f64) -> usize {
    let started = Instant::now();
    let mut received = 0usize;
    let mut chunks = body.into_data_stream();
    while let Some(Ok(chunk)) = chunks.next().await {
        received += chunk.len();
        let due = Duration::from_secs_f64(received as f64 / bytes_per_sec);
        tokio::time::sleep_until(started + due).await;
    }
    received
}

async fn storage_api(
    State(fixture): State<Fixture>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    let upsert = header(&headers, "x-upsert");
    let (body, received) = if path.ends_with("slow.bin") {
        (Vec::new(), read_slowly(body, SLOW_READ_BYTES_PER_SEC).await)
    } else {
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        (bytes.to_vec(), bytes.len())
    };
    fixture.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        upsert: upsert.clone(),
        authorization: header(&headers, "authorization"),
        apikey: header(&headers, "apikey"),
        content_type: header(&headers, "content-type"),
        body: body.clone(),
        received,
    });

    if path == "/storage/v1/object/list/device-files" {
        let request: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        let rows = match request["prefix"].as_str() {
            Some("dev-1/") => LISTING,
            Some("dev-1/photos/") => PHOTOS,
            _ => "[]",
        };
        return (StatusCode::OK, rows.to_string());
    }
    if method == Method::DELETE && path == "/storage/v1/object/device-files" {
        let request: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        let mut stored = fixture.stored.lock().unwrap();
        let removed: Vec<serde_json::Value> = request["prefixes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|key| key.as_str())
            .filter(|key| stored.remove(*key))
            .map(|key| serde_json::json!({"name": key, "bucket_id": "device-files"}))
            .collect();
        return (StatusCode::OK, serde_json::Value::from(removed).to_string());
    }
    if method == Method::GET {
        let key = path.trim_start_matches("/storage/v1/object/device-files/");
        if fixture.stored.lock().unwrap().contains(key) {
            return (StatusCode::OK, format!("contents of {key}"));
        }
        return (StatusCode::BAD_REQUEST, NOT_FOUND.to_string());
    }
    if path.ends_with("stall.bin") {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    if path.ends_with("reject.bin") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "bucket offline".to_string());
    }
    if path.ends_with("taken.txt") && upsert.as_deref() == Some("false") {
        return (StatusCode::CONFLICT, "Duplicate".to_string());
    }
    (StatusCode::OK, format!(r#"{{"Key":"{path}"}}"#))
}

async fn serve() -> (String, Fixture) {
    let fixture = Fixture::default();
    let app = Router::new()
        .fallback(storage_api)
        .with_state(fixture.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), fixture)
}

fn store_with_timeout(endpoint: &str, timeout: Duration) -> HttpObjectStore {
    HttpObjectStore::new(
        endpoint,
        "device-files",
        Some("secret-key".to_string()),
        timeout,
    )
    .unwrap()
}

fn store(endpoint: &str) -> HttpObjectStore {
    store_with_timeout(endpoint, Duration::from_secs(10)).with_chunk_size(4)
}

#[tokio::test]
async fn test_put_object_sends_headers_and_body() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);
    let (tx, mut rx) = mpsc::unbounded_channel();

    store
        .put_object(
            "dev-1/docs/notes.txt",
            bytes::Bytes::from_static(b"0123456789"),
            true,
            ProgressSink::new(tx),
        )
        .await
        .unwrap();

    let requests = fixture.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/storage/v1/object/device-files/dev-1/docs/notes.txt");
    assert_eq!(request.upsert.as_deref(), Some("true"));
    assert_eq!(request.authorization.as_deref(), Some("Bearer secret-key"));
    assert_eq!(request.apikey.as_deref(), Some("secret-key"));
    assert_eq!(request.content_type.as_deref(), Some("text/plain"));
    assert_eq!(request.body, b"0123456789");

    let mut reports = Vec::new();
    while let Ok(n) = rx.try_recv() {
        reports.push(n);
    }
    assert_eq!(reports, vec![4, 8, 10]);
}

#[tokio::test]
async fn test_non_success_status_is_rejected() {
    let (endpoint, _fixture) = serve().await;
    let store = store(&endpoint);

    let err = store
        .put_object(
            "dev-1/reject.bin",
            bytes::Bytes::from_static(b"x"),
            true,
            ProgressSink::discard(),
        )
        .await
        .unwrap_err();

    match err {
        Error::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "bucket offline");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conflict_without_upsert() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);

    let err = store
        .put_object(
            "dev-1/taken.txt",
            bytes::Bytes::from_static(b"x"),
            false,
            ProgressSink::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(fixture.requests()[0].upsert.as_deref(), Some("false"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let store = store("http://127.0.0.1:1");
    let err = store
        .put_object(
            "dev-1/a.txt",
            bytes::Bytes::from_static(b"x"),
            true,
            ProgressSink::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_listing_and_usage() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);

    let entries = list_directory(&store, &Destination::root("dev-1"), 100)
        .await
        .unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["photos", "report.pdf"]);
    assert!(entries[0].is_directory);
    assert_eq!(entries[1].kind, "pdf");
    assert_eq!(entries[1].path, "/report.pdf");
    assert_eq!(entries[1].size, 2048);
    assert_eq!(entries[0].url, None);
    let public = format!("{endpoint}/storage/v1/object/public/device-files/dev-1/report.pdf");
    assert_eq!(entries[1].url.as_deref(), Some(public.as_str()));

    let list_request: serde_json::Value =
        serde_json::from_slice(&fixture.requests()[0].body).unwrap();
    assert_eq!(list_request["prefix"], "dev-1/");
    assert_eq!(list_request["limit"], 100);
    assert_eq!(list_request["offset"], 0);
    assert_eq!(list_request["sortBy"]["column"], "name");
    assert_eq!(list_request["sortBy"]["order"], "asc");

    assert_eq!(storage_usage(&store, "dev-1").await.unwrap(), 3048);
}

#[tokio::test]
async fn test_session_over_http() {
    let (endpoint, fixture) = serve().await;
    let store = Arc::new(store(&endpoint));
    let session = UploadSession::start(store, UploadSettings::default(), || {});

    let ids = session
        .submit(
            vec![
                FilePayload::new("a.txt", "alpha"),
                FilePayload::new("reject.bin", "beta"),
                FilePayload::new("c.txt", "gamma"),
            ],
            Destination::new("dev-1", "/inbox"),
        )
        .await;
    let done = session.wait_idle().await;

    assert_eq!(done.status(ids[0]), Some(UploadStatus::Completed));
    assert_eq!(done.status(ids[1]), Some(UploadStatus::Failed));
    assert_eq!(done.status(ids[2]), Some(UploadStatus::Completed));

    let paths: Vec<_> = fixture.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![
            "/storage/v1/object/device-files/dev-1/inbox/a.txt",
            "/storage/v1/object/device-files/dev-1/inbox/reject.bin",
            "/storage/v1/object/device-files/dev-1/inbox/c.txt",
        ]
    );
}

#[tokio::test]
async fn test_slow_upload_outlives_timeout_while_bytes_move() {
    let (endpoint, fixture) = serve().await;
    let store = store_with_timeout(&endpoint, Duration::from_secs(1)).with_chunk_size(64 * 1024);
    let total = 64 * 1024 * 1024;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let started = Instant::now();
    store
        .put_object(
            "dev-1/slow.bin",
            bytes::Bytes::from(vec![0u8; total]),
            true,
            ProgressSink::new(tx),
        )
        .await
        .unwrap();

    assert!(started.elapsed() > Duration::from_millis(1500));
    assert_eq!(fixture.requests()[0].received, total);

    let mut last = 0;
    while let Ok(n) = rx.try_recv() {
        assert!(n >= last);
        last = n;
    }
    assert_eq!(last, total as u64);
}

#[tokio::test]
async fn test_stalled_upload_times_out() {
    let (endpoint, _fixture) = serve().await;
    let store = store_with_timeout(&endpoint, Duration::from_secs(1));

    let started = Instant::now();
    let err = store
        .put_object(
            "dev-1/stall.bin",
            bytes::Bytes::from_static(b"tiny"),
            true,
            ProgressSink::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(1)));
    assert!(err.is_recoverable());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_get_object() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);

    let data = store.get_object("dev-1/report.pdf").await.unwrap();
    assert_eq!(&data[..], b"contents of dev-1/report.pdf");

    let request = &fixture.requests()[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/storage/v1/object/device-files/dev-1/report.pdf");
    assert_eq!(request.authorization.as_deref(), Some("Bearer secret-key"));

    let err = store.get_object("dev-1/missing.pdf").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(ref p) if p == "dev-1/missing.pdf"));
    assert_eq!(err.code(), Some("E004"));
}

#[tokio::test]
async fn test_remove_objects_reports_removed_keys() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);

    let removed = store
        .remove_objects(&["dev-1/report.pdf".to_string(), "dev-1/ghost.txt".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, vec!["dev-1/report.pdf"]);

    let request = &fixture.requests()[0];
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/storage/v1/object/device-files");
    assert_eq!(request.apikey.as_deref(), Some("secret-key"));
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"prefixes": ["dev-1/report.pdf", "dev-1/ghost.txt"]})
    );

    assert!(store.remove_objects(&[]).await.unwrap().is_empty());
    assert_eq!(fixture.requests().len(), 1);
}

#[tokio::test]
async fn test_delete_folder_over_http() {
    let (endpoint, fixture) = serve().await;
    let store = store(&endpoint);
    let root = Destination::root("dev-1");

    let removed = delete_entry(&store, &root, "photos").await.unwrap();
    assert_eq!(removed, vec!["dev-1/photos/cat.jpg"]);

    let calls: Vec<_> = fixture
        .requests()
        .into_iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect();
    assert_eq!(
        calls,
        vec![
            "DELETE /storage/v1/object/device-files",
            "POST /storage/v1/object/list/device-files",
            "DELETE /storage/v1/object/device-files",
        ]
    );

    let err = delete_entry(&store, &root, "photos").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
