//! 下载流程
//!
//! 状态机: `Idle → Downloading → Completed(成功|失败)`，
//! 任何状态都可以通过 [`DownloadFlow::reset`] 回到 `Idle`。
//!
//! 只有接收响应体的阶段可以中止；数据收齐后的本地保存总会执行完。

use log::{info, warn};

use crate::error::TransferError;
use crate::transfer::{DownloadedPayload, ShareService};
use crate::transfer::progress::{NoopCallback, ProgressTracker, TransferCallback};
use crate::transfer::protocol::{self, DEFAULT_MIME_TYPE, ShareCode};
use crate::workflow::saver::FileSaver;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 下载成功后的文件信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// 从响应头得到（或合成）的文件名
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// 客户端完成下载的时间，仅作展示用，并非真实上传时间
    pub upload_date: DateTime<Utc>,
    /// 实际保存的位置
    pub path: PathBuf,
}

/// 下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Success(DownloadedFile),
    Failure { error: String },
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success(_))
    }

    pub fn file(&self) -> Option<&DownloadedFile> {
        match self {
            DownloadResult::Success(f) => Some(f),
            DownloadResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DownloadResult::Failure { error } => Some(error),
            DownloadResult::Success(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadState {
    Idle,
    Downloading(ShareCode),
    Completed(DownloadResult),
}

/// 下载流程
pub struct DownloadFlow {
    service: Arc<dyn ShareService>,
    saver: Arc<dyn FileSaver>,
    share_code: String,
    state: DownloadState,
    progress: u8,
    cancel: CancellationToken,
}

impl DownloadFlow {
    pub fn new(service: Arc<dyn ShareService>, saver: Arc<dyn FileSaver>) -> Self {
        Self {
            service,
            saver,
            share_code: String::new(),
            state: DownloadState::Idle,
            progress: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    pub fn share_code(&self) -> &str {
        &self.share_code
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DownloadState::Idle)
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.state, DownloadState::Downloading(_))
    }

    pub fn result(&self) -> Option<&DownloadResult> {
        match &self.state {
            DownloadState::Completed(r) => Some(r),
            _ => None,
        }
    }

    /// 是否可以开始下载：分享码非空且没有进行中的下载
    pub fn can_download(&self) -> bool {
        !self.share_code.trim().is_empty() && !self.is_downloading()
    }

    /// 设置分享码，不做校验
    pub fn set_share_code(&mut self, code: impl Into<String>) {
        self.share_code = code.into();
    }

    /// 获取可在其他任务中中止下一次（或当前）下载的句柄
    ///
    /// 开始前触发则下载不会发出请求。每次下载结束后旧句柄失效。
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn start_download(&mut self) -> Result<DownloadResult, TransferError> {
        self.start_download_with(Arc::new(NoopCallback)).await
    }

    /// 开始下载
    ///
    /// 分享码为空或已在下载时返回错误且状态不变。下载被中止时返回
    /// [`TransferError::Cancelled`] 并回到 `Idle`，其余情况进入 `Completed`。
    pub async fn start_download_with(
        &mut self,
        callback: Arc<dyn TransferCallback>,
    ) -> Result<DownloadResult, TransferError> {
        if self.is_downloading() {
            return Err(TransferError::Busy);
        }
        let code = ShareCode::parse(&self.share_code).ok_or(TransferError::EmptyShareCode)?;

        if self.cancel.is_cancelled() {
            info!("Download of {} aborted before it started", code);
            self.reset();
            callback.on_status("Download cancelled");
            return Err(TransferError::Cancelled);
        }

        let cancel = self.cancel.clone();
        self.state = DownloadState::Downloading(code.clone());
        self.progress = 0;

        let tracker = ProgressTracker::new(callback.clone());
        callback.on_status(&format!("Downloading {}...", code));
        tracker.start();

        let fetched = tokio::select! {
            res = self.service.download(&code, tracker.clone()) => Some(res),
            () = cancel.cancelled() => None,
        };
        self.progress = tracker.percent();
        // 本次下载已结束，之后触发旧句柄不影响下一次
        self.cancel = CancellationToken::new();

        let outcome = match fetched {
            None => {
                info!("Download of {} cancelled", code);
                self.reset();
                callback.on_status("Download cancelled");
                return Err(TransferError::Cancelled);
            }
            Some(Ok(payload)) => self.save(payload).await,
            Some(Err(e)) => Err(e),
        };

        match outcome {
            Ok(file) => {
                info!("Downloaded {} ({} bytes) to {:?}", file.name, file.size, file.path);
                callback.on_complete(&file.name);
                Ok(self.complete(DownloadResult::Success(file)))
            }
            Err(e) => {
                warn!("Download of {} failed: {}", code, e);
                let message = e.download_message();
                callback.on_error(message);
                Ok(self.complete(DownloadResult::Failure {
                    error: message.to_string(),
                }))
            }
        }
    }

    async fn save(&self, payload: DownloadedPayload) -> Result<DownloadedFile, TransferError> {
        let now = Utc::now();
        let name = protocol::suggested_file_name(
            payload.content_disposition.as_deref(),
            now.timestamp_millis(),
        );
        let mime_type = payload
            .content_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let size = payload.data.len() as u64;
        let path = self.saver.save(&name, payload.data).await?;

        Ok(DownloadedFile {
            name,
            size,
            mime_type,
            upload_date: now,
            path,
        })
    }

    /// 回到 `Idle`，清空分享码、进度和结果，并中止进行中的下载
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.share_code.clear();
        self.state = DownloadState::Idle;
        self.progress = 0;
    }

    fn complete(&mut self, result: DownloadResult) -> DownloadResult {
        self.state = DownloadState::Completed(result.clone());
        result
    }
}
