//! 工作流模块
//!
//! 把上传、下载的完整过程封装成状态机，供 CLI 和 TUI 直接驱动。

pub mod download;
pub mod saver;
pub mod upload;

pub use download::{DownloadFlow, DownloadResult, DownloadState, DownloadedFile};
pub use saver::{DirectorySaver, FileSaver};
pub use upload::{UploadFlow, UploadResult, UploadState};
