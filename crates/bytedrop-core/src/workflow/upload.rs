//! 上传流程
//!
//! 状态机: `Idle → FileSelected → Uploading → Completed(成功|失败)`，
//! 任何状态都可以通过 [`UploadFlow::cancel`] 回到 `Idle`。
//!
//! 每个流程实例独占自己的状态，同一时间最多一个选中文件和一个进行中的请求。

use log::{info, warn};

use crate::error::{FILE_TOO_LARGE_MESSAGE, TransferError};
use crate::transfer::progress::{NoopCallback, ProgressTracker, TransferCallback};
use crate::transfer::protocol::{FileMetadata, MAX_UPLOAD_SIZE, ShareCode};
use crate::transfer::{SelectedFile, ShareService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 上传结果，创建后不再改变
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success {
        share_code: ShareCode,
        metadata: FileMetadata,
    },
    Failure {
        error: String,
    },
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success { .. })
    }

    pub fn share_code(&self) -> Option<&ShareCode> {
        match self {
            UploadResult::Success { share_code, .. } => Some(share_code),
            UploadResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            UploadResult::Failure { error } => Some(error),
            UploadResult::Success { .. } => None,
        }
    }
}

/// 上传流程状态
#[derive(Debug, Clone)]
pub enum UploadState {
    Idle,
    FileSelected(SelectedFile),
    Uploading(SelectedFile),
    Completed(UploadResult),
}

/// 上传流程
pub struct UploadFlow {
    service: Arc<dyn ShareService>,
    state: UploadState,
    progress: u8,
    cancel: CancellationToken,
}

impl UploadFlow {
    pub fn new(service: Arc<dyn ShareService>) -> Self {
        Self {
            service,
            state: UploadState::Idle,
            progress: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// 最近一次上报的进度 (0-100)
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, UploadState::Idle)
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.state, UploadState::Uploading(_))
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        match &self.state {
            UploadState::FileSelected(f) | UploadState::Uploading(f) => Some(f),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&UploadResult> {
        match &self.state {
            UploadState::Completed(r) => Some(r),
            _ => None,
        }
    }

    /// 获取可在其他任务中中止下一次（或当前）上传的句柄
    ///
    /// 在调用 [`UploadFlow::start_upload`] 之前获取。开始前触发则上传不会发出请求，
    /// 上传过程中触发则中止请求；两种情况流程都回到 `Idle`。每次上传结束后旧句柄失效。
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 选择文件
    ///
    /// 没有提供文件时不做任何事；上传进行中时拒绝。返回是否进入 `FileSelected`。
    pub fn select_file(&mut self, file: Option<SelectedFile>) -> bool {
        let Some(file) = file else {
            return false;
        };
        if self.is_uploading() {
            warn!("Ignoring file selection while an upload is in progress");
            return false;
        }

        info!("Selected {} ({} bytes, {})", file.name, file.size, file.mime_type);
        self.state = UploadState::FileSelected(file);
        self.progress = 0;
        true
    }

    /// 开始上传，不上报事件
    pub async fn start_upload(&mut self) -> Result<UploadResult, TransferError> {
        self.start_upload_with(Arc::new(NoopCallback)).await
    }

    /// 开始上传
    ///
    /// 只能在 `FileSelected` 状态调用，否则返回错误且状态不变。
    /// 上传被中止时返回 [`TransferError::Cancelled`]，流程回到 `Idle`。
    /// 其余情况流程都进入 `Completed` 并返回结果。
    pub async fn start_upload_with(
        &mut self,
        callback: Arc<dyn TransferCallback>,
    ) -> Result<UploadResult, TransferError> {
        let file = match std::mem::replace(&mut self.state, UploadState::Idle) {
            UploadState::FileSelected(file) => file,
            other => {
                let err = if matches!(other, UploadState::Uploading(_)) {
                    TransferError::Busy
                } else {
                    TransferError::NoFileSelected
                };
                self.state = other;
                return Err(err);
            }
        };

        if self.cancel.is_cancelled() {
            info!("Upload of {} aborted before it started", file.name);
            self.cancel();
            callback.on_status("Upload cancelled");
            return Err(TransferError::Cancelled);
        }

        if file.size > MAX_UPLOAD_SIZE {
            warn!(
                "{} is {} bytes, over the {} byte limit",
                file.name, file.size, MAX_UPLOAD_SIZE
            );
            callback.on_error(FILE_TOO_LARGE_MESSAGE);
            return Ok(self.complete(UploadResult::Failure {
                error: FILE_TOO_LARGE_MESSAGE.to_string(),
            }));
        }

        let cancel = self.cancel.clone();
        self.state = UploadState::Uploading(file.clone());
        self.progress = 0;

        let tracker = ProgressTracker::new(callback.clone());
        callback.on_status(&format!("Uploading {}...", file.name));
        tracker.start();

        let outcome = tokio::select! {
            res = self.service.upload(&file, tracker.clone()) => Some(res),
            () = cancel.cancelled() => None,
        };
        self.progress = tracker.percent();
        // 本次上传已结束，之后触发旧句柄不影响下一次
        self.cancel = CancellationToken::new();

        match outcome {
            None => {
                info!("Upload of {} cancelled", file.name);
                self.reset();
                callback.on_status("Upload cancelled");
                Err(TransferError::Cancelled)
            }
            Some(Ok(share_code)) => {
                callback.on_complete(share_code.as_str());
                Ok(self.complete(UploadResult::Success {
                    share_code,
                    metadata: file.metadata(),
                }))
            }
            Some(Err(e)) => {
                warn!("Upload of {} failed: {}", file.name, e);
                let message = e.upload_message();
                callback.on_error(message);
                Ok(self.complete(UploadResult::Failure {
                    error: message.to_string(),
                }))
            }
        }
    }

    /// 取消并回到 `Idle`，丢弃选中的文件和结果
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.reset();
    }

    fn reset(&mut self) {
        self.state = UploadState::Idle;
        self.progress = 0;
    }

    fn complete(&mut self, result: UploadResult) -> UploadResult {
        self.state = UploadState::Completed(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UPLOAD_FAILED_MESSAGE;
    use crate::transfer::DownloadedPayload;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数的假服务
    struct FakeService {
        calls: AtomicUsize,
        response: Mutex<Option<Result<ShareCode, TransferError>>>,
        hang: bool,
    }

    impl FakeService {
        fn ok(code: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Some(Ok(ShareCode::parse(code).unwrap()))),
                hang: false,
            })
        }

        fn err(e: TransferError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Some(Err(e))),
                hang: false,
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(None),
                hang: true,
            })
        }
    }

    #[async_trait]
    impl ShareService for FakeService {
        async fn upload(
            &self,
            file: &SelectedFile,
            progress: ProgressTracker,
        ) -> Result<ShareCode, TransferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.advance(file.size / 2, Some(file.size));
            if self.hang {
                std::future::pending::<()>().await;
            }
            progress.advance(file.size - file.size / 2, Some(file.size));
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(TransferError::Cancelled))
        }

        async fn download(
            &self,
            _code: &ShareCode,
            _progress: ProgressTracker,
        ) -> Result<DownloadedPayload, TransferError> {
            unreachable!("upload tests never download")
        }
    }

    fn small_file() -> SelectedFile {
        SelectedFile::from_bytes("report.pdf", vec![1u8; 1000], Some("application/pdf"))
            .with_last_modified(1_700_000_000_000)
    }

    #[test]
    fn test_select_none_is_noop() {
        let mut flow = UploadFlow::new(FakeService::ok("X"));
        assert!(!flow.select_file(None));
        assert!(flow.is_idle());
    }

    #[test]
    fn test_select_replaces_previous() {
        let mut flow = UploadFlow::new(FakeService::ok("X"));
        assert!(flow.select_file(Some(small_file())));
        let other = SelectedFile::from_bytes("b.txt", b"b".to_vec(), None);
        assert!(flow.select_file(Some(other)));
        assert_eq!(flow.selected_file().unwrap().name, "b.txt");
    }

    #[tokio::test]
    async fn test_start_without_file_rejected() {
        let service = FakeService::ok("X");
        let mut flow = UploadFlow::new(service.clone());
        let err = flow.start_upload().await.unwrap_err();
        assert!(matches!(err, TransferError::NoFileSelected));
        assert!(flow.is_idle());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_fails_without_request() {
        let service = FakeService::ok("X");
        let mut flow = UploadFlow::new(service.clone());

        let mut file = small_file();
        file.size = MAX_UPLOAD_SIZE + 1;
        flow.select_file(Some(file));

        let result = flow.start_upload().await.unwrap();
        assert_eq!(
            result,
            UploadResult::Failure {
                error: FILE_TOO_LARGE_MESSAGE.to_string()
            }
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_limit_is_allowed() {
        let service = FakeService::ok("EDGE");
        let mut flow = UploadFlow::new(service.clone());
        let mut file = small_file();
        file.size = MAX_UPLOAD_SIZE;
        flow.select_file(Some(file));

        assert!(flow.start_upload().await.unwrap().is_success());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_captures_code_and_metadata() {
        let mut flow = UploadFlow::new(FakeService::ok("ABC123"));
        flow.select_file(Some(small_file()));

        let result = flow.start_upload().await.unwrap();
        let UploadResult::Success {
            share_code,
            metadata,
        } = result
        else {
            panic!("expected success");
        };
        assert_eq!(share_code.as_str(), "ABC123");
        assert_eq!(metadata.name, "report.pdf");
        assert_eq!(metadata.size, 1000);
        assert_eq!(metadata.mime_type, "application/pdf");
        assert_eq!(metadata.last_modified, 1_700_000_000_000);
        assert_eq!(flow.progress(), 100);
        assert!(flow.selected_file().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_is_generic_failure() {
        let mut flow = UploadFlow::new(FakeService::err(TransferError::Status(
            StatusCode::INTERNAL_SERVER_ERROR,
        )));
        flow.select_file(Some(small_file()));

        let result = flow.start_upload().await.unwrap();
        assert_eq!(result.error(), Some(UPLOAD_FAILED_MESSAGE));
        assert!(!flow.is_uploading());
    }

    #[tokio::test]
    async fn test_cancel_from_completed() {
        let mut flow = UploadFlow::new(FakeService::ok("ABC"));
        flow.select_file(Some(small_file()));
        flow.start_upload().await.unwrap();

        flow.cancel();
        assert!(flow.is_idle());
        assert!(flow.result().is_none());
        assert!(flow.selected_file().is_none());
        assert_eq!(flow.progress(), 0);
    }

    #[tokio::test]
    async fn test_abort_in_flight_returns_to_idle() {
        let mut flow = UploadFlow::new(FakeService::hanging());
        flow.select_file(Some(small_file()));
        let handle = flow.abort_handle();

        let aborter = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        });

        let err = flow.start_upload().await.unwrap_err();
        aborter.await.unwrap();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(flow.is_idle());
        assert_eq!(flow.progress(), 0);

        // 中止后可以重新选择并上传
        assert!(flow.select_file(Some(small_file())));
        assert!(!flow.abort_handle().is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_before_start_skips_request() {
        let service = FakeService::ok("LATE");
        let mut flow = UploadFlow::new(service.clone());
        flow.select_file(Some(small_file()));

        flow.abort_handle().cancel();
        let err = flow.start_upload().await.unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(flow.is_idle());
        assert!(flow.selected_file().is_none());
        assert_eq!(flow.progress(), 0);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);

        // 已用过的句柄不影响下一次上传
        flow.select_file(Some(small_file()));
        let result = flow.start_upload().await.unwrap();
        assert_eq!(result.share_code().unwrap().as_str(), "LATE");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_after_completion_is_ignored() {
        let mut flow = UploadFlow::new(FakeService::ok("ONE"));
        flow.select_file(Some(small_file()));
        let handle = flow.abort_handle();
        flow.start_upload().await.unwrap();

        // 上传结束后才触发
        handle.cancel();
        assert!(!flow.abort_handle().is_cancelled());
        assert!(flow.result().unwrap().is_success());
    }
}
