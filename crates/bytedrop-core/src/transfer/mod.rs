//! 文件传输模块
//!
//! 包含:
//! - 上传/下载服务的 HTTP 协议定义
//! - HTTP 客户端 (reqwest)
//! - 进度跟踪

pub mod client;
pub mod progress;
pub mod protocol;

pub use client::{DownloadedPayload, ShareClient, ShareService};
pub use progress::{
    NoopCallback, ProgressTracker, SimpleTransferCallback, TransferCallback, TransferEvent,
};
pub use protocol::{FileMetadata, MAX_UPLOAD_SIZE, ShareCode, UploadResponse};

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::UNIX_EPOCH;

/// 文件内容流
pub type FileStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// 请求体分块大小，决定上传进度的粒度
const CHUNK_SIZE: usize = 64 * 1024;

/// 文件内容来源
#[derive(Debug, Clone)]
pub enum FileContent {
    /// 已在内存中的内容
    Memory(Bytes),
    /// 磁盘上的文件，上传时再流式读取
    Disk(PathBuf),
}

/// 用户选中的待上传文件
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// 毫秒级 Unix 时间戳
    pub last_modified: i64,
    pub content: FileContent,
}

impl SelectedFile {
    /// 从内存数据创建，未指定 MIME 类型时按扩展名猜测
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>, mime_type: Option<&str>) -> Self {
        let name = name.into();
        let data = data.into();
        let mime_type = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime(Path::new(&name)));
        Self {
            size: data.len() as u64,
            name,
            mime_type,
            last_modified: chrono::Utc::now().timestamp_millis(),
            content: FileContent::Memory(data),
        }
    }

    /// 从磁盘文件创建（只读取元数据，不读取内容）
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_millis()).ok())
            .unwrap_or(0);

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: guess_mime(path),
            last_modified,
            content: FileContent::Disk(path.to_path_buf()),
        })
    }

    /// 覆盖 MIME 类型
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// 覆盖修改时间
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// 选中时的元数据快照
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            last_modified: self.last_modified,
        }
    }

    /// 以分块流的形式读取内容
    pub async fn open_stream(&self) -> io::Result<FileStream> {
        match &self.content {
            FileContent::Memory(data) => {
                let data = data.clone();
                let chunks: Vec<io::Result<Bytes>> = (0..data.len())
                    .step_by(CHUNK_SIZE)
                    .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            FileContent::Disk(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(tokio_util::io::ReaderStream::with_capacity(
                    file, CHUNK_SIZE,
                )))
            }
        }
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| protocol::DEFAULT_MIME_TYPE.to_string())
}
