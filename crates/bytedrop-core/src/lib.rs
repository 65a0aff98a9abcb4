//! ByteDrop Core Library
//!
//! ByteDrop 文件分享客户端的核心实现：上传文件换取分享码，凭分享码下载文件。
//!
//! # 模块
//!
//! - **transfer**: 上传/下载协议、HTTP 客户端和进度跟踪
//! - **workflow**: 上传、下载状态机和本地保存
//! - **gateway**: 把 `/api/...` 转发到后端的反向代理
//! - **config**: 设置的加载、保存和环境变量覆盖
//!
//! # 使用示例
//!
//! ## 上传文件
//!
//! ```ignore
//! use bytedrop_core::{AppSettings, SelectedFile, ShareClient, UploadFlow, UploadResult};
//!
//! let client = ShareClient::from_settings(&AppSettings::load())?;
//! let mut flow = UploadFlow::new(Arc::new(client));
//!
//! flow.select_file(Some(SelectedFile::from_path("report.pdf").await?));
//! if let UploadResult::Success { share_code, .. } = flow.start_upload().await? {
//!     println!("Share code: {}", share_code);
//! }
//! ```
//!
//! ## 下载文件
//!
//! ```ignore
//! use bytedrop_core::{DirectorySaver, DownloadFlow};
//!
//! let mut flow = DownloadFlow::new(Arc::new(client), Arc::new(DirectorySaver::new("downloads")));
//! flow.set_share_code("ABC123");
//! let result = flow.start_download().await?;
//! ```

pub mod clipboard;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod transfer;
pub mod workflow;

pub use config::AppSettings;
pub use error::{ConfigError, ErrorKind, TransferError};
pub use gateway::Gateway;
pub use logging::{LogEntry, LogLevel};

// Transfer re-exports
pub use transfer::{
    FileMetadata, MAX_UPLOAD_SIZE, ProgressTracker, SelectedFile, ShareClient, ShareCode,
    ShareService, SimpleTransferCallback, TransferCallback, TransferEvent,
};

// Workflow re-exports
pub use workflow::{
    DirectorySaver, DownloadFlow, DownloadResult, DownloadState, DownloadedFile, FileSaver,
    UploadFlow, UploadResult, UploadState,
};
