//! 错误类型
//!
//! 所有失败分为两类：
//! - **Validation**: 请求发出前在本地发现的问题（文件过大、分享码为空、状态不允许）
//! - **Transport**: 网络错误、非成功状态码、响应格式错误、本地保存失败
//!
//! 面向用户时两类错误都只显示固定的提示文案，具体原因写入日志。

use reqwest::StatusCode;

/// 文件超过大小上限时的提示
pub const FILE_TOO_LARGE_MESSAGE: &str = "File too large. Maximum allowed size is 50MB.";

/// 上传失败时的通用提示
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed. Please try again.";

/// 下载失败时的通用提示
pub const DOWNLOAD_FAILED_MESSAGE: &str =
    "Failed to download the file. Please check the share code and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
}

/// 上传/下载错误
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("File too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("No file selected")]
    NoFileSelected,

    #[error("Share code is empty")]
    EmptyShareCode,

    #[error("A transfer is already in progress")]
    Busy,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status: {0}")]
    Status(StatusCode),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::FileTooLarge { .. }
            | TransferError::NoFileSelected
            | TransferError::EmptyShareCode
            | TransferError::Busy => ErrorKind::Validation,
            _ => ErrorKind::Transport,
        }
    }

    /// 上传失败时展示给用户的文案
    pub fn upload_message(&self) -> &'static str {
        match self {
            TransferError::FileTooLarge { .. } => FILE_TOO_LARGE_MESSAGE,
            _ => UPLOAD_FAILED_MESSAGE,
        }
    }

    /// 下载失败时展示给用户的文案（不区分分享码无效和其他原因）
    pub fn download_message(&self) -> &'static str {
        DOWNLOAD_FAILED_MESSAGE
    }
}

/// 配置加载/保存错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
