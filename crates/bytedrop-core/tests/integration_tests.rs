//! 集成测试 - 与真实 HTTP 服务交互
//!
//! 用 axum 启动一个模拟后端，验证客户端、上传/下载流程和网关的端到端行为。

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytedrop_core::error::{DOWNLOAD_FAILED_MESSAGE, TransferError, UPLOAD_FAILED_MESSAGE};
use bytedrop_core::{
    DirectorySaver, DownloadFlow, DownloadResult, Gateway, ProgressTracker, SelectedFile,
    ShareClient, ShareCode, ShareService, SimpleTransferCallback, TransferEvent, UploadFlow,
    UploadResult,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const PDF_BYTES: &[u8] = b"%PDF-1.4 fake document body";

/// 模拟后端
#[derive(Default)]
struct Backend {
    uploads: Mutex<Vec<Bytes>>,
    numeric_code: bool,
}

async fn upload_handler(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("multipart/form-data") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if String::from_utf8_lossy(&body).contains("boom") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    backend.uploads.lock().unwrap().push(body);
    let payload = if backend.numeric_code {
        r#"{"port": 4821}"#
    } else {
        r#"{"port": "ABC123"}"#
    };
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

async fn download_handler(Path(code): Path<String>) -> Response {
    match code.as_str() {
        "ABC123" => (
            [
                (header::CONTENT_DISPOSITION, "attachment; filename=\"report.pdf\""),
                (header::CONTENT_TYPE, "application/pdf"),
            ],
            PDF_BYTES,
        )
            .into_response(),
        // 没有 Content-Disposition，且分享码包含需要编码的字符
        "a b/c" => ([(header::CONTENT_TYPE, "text/plain")], "plain body").into_response(),
        // 分块传输，没有 Content-Length
        "CHUNKED" => {
            let chunks = (0..4).map(|_| Ok::<_, std::io::Error>(Bytes::from_static(PDF_BYTES)));
            Body::from_stream(futures_util::stream::iter(chunks)).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_backend(backend: Backend) -> (String, Arc<Backend>) {
    let backend = Arc::new(backend);
    let app = Router::new()
        .route("/upload", post(upload_handler))
        .route("/download/:code", get(download_handler))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), backend)
}

/// 一个当前没有进程监听的地址
async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn client(server: &str, prefix: &str) -> Arc<ShareClient> {
    Arc::new(ShareClient::new(server, prefix, Duration::from_secs(5)).unwrap())
}

fn pdf_file() -> SelectedFile {
    SelectedFile::from_bytes("report.pdf", PDF_BYTES.to_vec(), Some("application/pdf"))
}

fn progress_events(rx: &mut tokio::sync::mpsc::UnboundedReceiver<TransferEvent>) -> Vec<u8> {
    let mut values = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let TransferEvent::Progress(p) = event {
            values.push(p);
        }
    }
    values
}

#[tokio::test]
async fn test_upload_sends_multipart_file_field() {
    let (url, backend) = spawn_backend(Backend::default()).await;
    let client = client(&url, "");

    let code = client
        .upload(&pdf_file(), ProgressTracker::silent())
        .await
        .unwrap();
    assert_eq!(code.as_str(), "ABC123");

    let uploads = backend.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let body = String::from_utf8_lossy(&uploads[0]).to_string();
    assert!(body.contains(r#"name="file"; filename="report.pdf""#));
    assert!(body.to_lowercase().contains("content-type: application/pdf"));
    assert!(body.contains("%PDF-1.4 fake document body"));
}

#[tokio::test]
async fn test_numeric_share_code_is_stringified() {
    let (url, _backend) = spawn_backend(Backend {
        numeric_code: true,
        ..Backend::default()
    })
    .await;

    let code = client(&url, "")
        .upload(&pdf_file(), ProgressTracker::silent())
        .await
        .unwrap();
    assert_eq!(code.as_str(), "4821");
}

#[tokio::test]
async fn test_download_returns_headers_and_body() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let code = ShareCode::parse("ABC123").unwrap();

    let payload = client(&url, "")
        .download(&code, ProgressTracker::silent())
        .await
        .unwrap();
    assert_eq!(
        payload.content_disposition.as_deref(),
        Some("attachment; filename=\"report.pdf\"")
    );
    assert_eq!(payload.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(&payload.data[..], PDF_BYTES);
}

#[tokio::test]
async fn test_upload_flow_end_to_end() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let mut flow = UploadFlow::new(client(&url, ""));
    let (callback, mut rx) = SimpleTransferCallback::new();

    // 多个分块，进度会经过若干中间值
    let data = vec![7u8; 300 * 1024];
    let file = SelectedFile::from_bytes("photo.jpg", data, None);
    assert!(flow.select_file(Some(file)));

    let result = flow.start_upload_with(Arc::new(callback)).await.unwrap();
    match &result {
        UploadResult::Success {
            share_code,
            metadata,
        } => {
            assert_eq!(share_code.as_str(), "ABC123");
            assert_eq!(metadata.name, "photo.jpg");
            assert_eq!(metadata.size, 300 * 1024);
            assert_eq!(metadata.mime_type, "image/jpeg");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(flow.progress(), 100);

    let progress = progress_events(&mut rx);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn test_upload_server_error_is_generic_failure() {
    let (url, backend) = spawn_backend(Backend::default()).await;
    let mut flow = UploadFlow::new(client(&url, ""));

    flow.select_file(Some(SelectedFile::from_bytes("boom.txt", "boom", None)));
    let result = flow.start_upload().await.unwrap();

    assert_eq!(result.error(), Some(UPLOAD_FAILED_MESSAGE));
    assert!(backend.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_unreachable_server_is_generic_failure() {
    let url = unused_url().await;
    let mut flow = UploadFlow::new(client(&url, ""));

    flow.select_file(Some(pdf_file()));
    let result = flow.start_upload().await.unwrap();
    assert_eq!(result.error(), Some(UPLOAD_FAILED_MESSAGE));
}

#[tokio::test]
async fn test_download_over_limit_is_rejected() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let limit = PDF_BYTES.len() as u64 - 1;
    let client = ShareClient::new(&url, "", Duration::from_secs(5))
        .unwrap()
        .with_max_download_size(limit);

    // 响应带 Content-Length，读取前拒绝
    let err = client
        .download(&ShareCode::parse("ABC123").unwrap(), ProgressTracker::silent())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::FileTooLarge { size, limit: l } if size == PDF_BYTES.len() as u64 && l == limit
    ));

    // 分块响应在累计超限时拒绝
    let chunked = ShareCode::parse("CHUNKED").unwrap();
    let err = client
        .clone()
        .with_max_download_size(PDF_BYTES.len() as u64 * 2)
        .download(&chunked, ProgressTracker::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::FileTooLarge { .. }));

    let payload = client
        .with_max_download_size(PDF_BYTES.len() as u64 * 4)
        .download(&chunked, ProgressTracker::silent())
        .await
        .unwrap();
    assert_eq!(payload.data.len(), PDF_BYTES.len() * 4);
}

#[tokio::test]
async fn test_oversized_download_saves_nothing() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let client = ShareClient::new(&url, "", Duration::from_secs(5))
        .unwrap()
        .with_max_download_size(8);
    let mut flow = DownloadFlow::new(Arc::new(client), Arc::new(DirectorySaver::new(dir.path())));

    flow.set_share_code("CHUNKED");
    let result = flow.start_download().await.unwrap();
    assert_eq!(result.error(), Some(DOWNLOAD_FAILED_MESSAGE));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_flow_saves_file() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut flow = DownloadFlow::new(
        client(&url, ""),
        Arc::new(DirectorySaver::new(dir.path())),
    );

    flow.set_share_code("ABC123");
    let result = flow.start_download().await.unwrap();
    let file = result.file().expect("download should succeed");

    assert_eq!(file.name, "report.pdf");
    assert_eq!(file.size, PDF_BYTES.len() as u64);
    assert_eq!(file.mime_type, "application/pdf");
    assert_eq!(file.path, dir.path().join("report.pdf"));
    assert_eq!(tokio::fs::read(&file.path).await.unwrap(), PDF_BYTES);
    assert_eq!(flow.progress(), 100);
}

#[tokio::test]
async fn test_download_without_disposition_uses_fallback_name() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut flow = DownloadFlow::new(
        client(&url, ""),
        Arc::new(DirectorySaver::new(dir.path())),
    );

    // 分享码作为单个路径段编码后发送
    flow.set_share_code("a b/c");
    let result = flow.start_download().await.unwrap();
    let file = result.file().expect("download should succeed");

    let suffix = file.name.strip_prefix("downloaded_file_").unwrap();
    assert!(!suffix.is_empty());
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(file.mime_type, "text/plain");
}

#[tokio::test]
async fn test_download_unknown_code_is_generic_failure() {
    let (url, _backend) = spawn_backend(Backend::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut flow = DownloadFlow::new(
        client(&url, ""),
        Arc::new(DirectorySaver::new(dir.path())),
    );

    flow.set_share_code("NOPE");
    let result = flow.start_download().await.unwrap();
    assert!(matches!(result, DownloadResult::Failure { .. }));
    assert_eq!(result.error(), Some(DOWNLOAD_FAILED_MESSAGE));
    assert_eq!(flow.share_code(), "NOPE");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_gateway_forwards_upload_and_download() {
    let (backend_url, backend) = spawn_backend(Backend::default()).await;
    let gateway = Gateway::new(&backend_url).unwrap();
    let (addr, _handle) = gateway.start("127.0.0.1:0").await.unwrap();
    let client = client(&format!("http://{}", addr), "/api");

    let code = client
        .upload(&pdf_file(), ProgressTracker::silent())
        .await
        .unwrap();
    assert_eq!(code.as_str(), "ABC123");
    assert_eq!(backend.uploads.lock().unwrap().len(), 1);

    let (callback, mut rx) = SimpleTransferCallback::new();
    let tracker = ProgressTracker::new(Arc::new(callback));
    let payload = client.download(&code, tracker.clone()).await.unwrap();
    assert_eq!(&payload.data[..], PDF_BYTES);
    assert_eq!(payload.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(tracker.percent(), 100);
    assert_eq!(progress_events(&mut rx).last(), Some(&100));
}

#[tokio::test]
async fn test_gateway_unknown_path_and_dead_backend() {
    let (backend_url, _backend) = spawn_backend(Backend::default()).await;
    let gateway = Gateway::new(&backend_url).unwrap();
    let (addr, _handle) = gateway.start("127.0.0.1:0").await.unwrap();

    let resp = reqwest::get(format!("http://{}/api/other", addr)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let dead = Gateway::new(&unused_url().await).unwrap();
    let (dead_addr, _dead_handle) = dead.start("127.0.0.1:0").await.unwrap();
    let resp = reqwest::get(format!("http://{}/api/download/ABC123", dead_addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
