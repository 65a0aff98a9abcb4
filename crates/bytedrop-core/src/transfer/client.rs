//! 上传/下载服务的 HTTP 客户端
//!
//! [`ShareService`] 是流程与网络之间的接缝，[`ShareClient`] 是基于 reqwest 的实现。

use log::{debug, info};

use crate::config::AppSettings;
use crate::error::TransferError;
use crate::transfer::SelectedFile;
use crate::transfer::progress::ProgressTracker;
use crate::transfer::protocol::{self, MAX_UPLOAD_SIZE, ShareCode, UPLOAD_FIELD, UploadResponse};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode, Url};
use std::time::Duration;

/// 下载缓冲区预分配的上限，避免信任过大的 Content-Length
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// 下载得到的原始响应
#[derive(Debug, Clone)]
pub struct DownloadedPayload {
    pub content_disposition: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// 上传/下载服务
#[async_trait]
pub trait ShareService: Send + Sync {
    /// 上传文件，返回分享码
    async fn upload(
        &self,
        file: &SelectedFile,
        progress: ProgressTracker,
    ) -> Result<ShareCode, TransferError>;

    /// 按分享码下载文件
    async fn download(
        &self,
        code: &ShareCode,
        progress: ProgressTracker,
    ) -> Result<DownloadedPayload, TransferError>;
}

/// 基于 reqwest 的服务客户端
#[derive(Debug, Clone)]
pub struct ShareClient {
    http: Client,
    server_url: String,
    api_prefix: String,
    max_download_size: u64,
}

impl ShareClient {
    pub fn new(server_url: &str, api_prefix: &str, timeout: Duration) -> anyhow::Result<Self> {
        // 提前校验地址，之后拼接路径不会失败
        Url::parse(server_url)?;

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            api_prefix: api_prefix.to_string(),
            max_download_size: MAX_UPLOAD_SIZE,
        })
    }

    /// 下载内容的大小上限，默认与上传上限相同
    pub fn with_max_download_size(mut self, limit: u64) -> Self {
        self.max_download_size = limit;
        self
    }

    pub fn max_download_size(&self) -> u64 {
        self.max_download_size
    }

    pub fn from_settings(settings: &AppSettings) -> anyhow::Result<Self> {
        Self::new(
            &settings.server_url,
            &settings.api_prefix,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn upload_url(&self) -> Result<Url, TransferError> {
        self.endpoint(&protocol::upload_path(&self.api_prefix))
    }

    pub fn download_url(&self, code: &ShareCode) -> Result<Url, TransferError> {
        let mut url = self.endpoint(&protocol::download_path(&self.api_prefix))?;
        url.path_segments_mut()
            .map_err(|()| TransferError::MalformedResponse(format!("cannot-be-a-base URL: {}", self.server_url)))?
            .push(code.as_str());
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransferError> {
        let raw = format!("{}{}", self.server_url, path);
        Url::parse(&raw).map_err(|e| TransferError::MalformedResponse(format!("{}: {}", raw, e)))
    }
}

#[async_trait]
impl ShareService for ShareClient {
    async fn upload(
        &self,
        file: &SelectedFile,
        progress: ProgressTracker,
    ) -> Result<ShareCode, TransferError> {
        let url = self.upload_url()?;
        let total = file.size;
        info!("Uploading {} ({} bytes) to {}", file.name, total, url);

        let tracker = progress.clone();
        let body = file.open_stream().await?.inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                tracker.advance(chunk.len() as u64, Some(total));
            }
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self.http.post(url).multipart(form).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!("Upload rejected with status {}", status);
            return Err(TransferError::Status(status));
        }

        let body = response.bytes().await?;
        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| TransferError::MalformedResponse(e.to_string()))?;
        let code = parsed
            .into_share_code()
            .ok_or_else(|| TransferError::MalformedResponse("empty share code".to_string()))?;

        info!("Upload complete, share code {}", code);
        Ok(code)
    }

    async fn download(
        &self,
        code: &ShareCode,
        progress: ProgressTracker,
    ) -> Result<DownloadedPayload, TransferError> {
        let url = self.download_url(code)?;
        info!("Downloading from {}", url);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!("Download rejected with status {}", status);
            return Err(TransferError::Status(status));
        }

        let headers = response.headers();
        let content_disposition = header_string(headers, &CONTENT_DISPOSITION);
        let content_type = header_string(headers, &CONTENT_TYPE);
        let total = response.content_length();
        let limit = self.max_download_size;
        if let Some(size) = total.filter(|&size| size > limit) {
            debug!("Refusing {} byte download, limit is {}", size, limit);
            return Err(TransferError::FileTooLarge { size, limit });
        }

        let capacity = usize::try_from(total.unwrap_or(0).min(MAX_PREALLOC)).unwrap_or(0);
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            // Content-Length 缺失或不实时按实际收到的字节数截止
            let size = (buffer.len() + chunk.len()) as u64;
            if size > limit {
                debug!("Download exceeded {} bytes, aborting", limit);
                return Err(TransferError::FileTooLarge { size, limit });
            }
            buffer.extend_from_slice(&chunk);
            progress.advance(chunk.len() as u64, total);
        }

        // 没有 Content-Length 时在结束后一次性补到 100
        let received = buffer.len() as u64;
        progress.set(received, Some(received));
        debug!("Downloaded {} bytes", received);
        Ok(DownloadedPayload {
            content_disposition,
            content_type,
            data: buffer.freeze(),
        })
    }
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &str, prefix: &str) -> ShareClient {
        ShareClient::new(server, prefix, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_download_limit_defaults_to_upload_limit() {
        let c = client("http://localhost:3000", "/api");
        assert_eq!(c.max_download_size(), MAX_UPLOAD_SIZE);
        assert_eq!(c.with_max_download_size(1024).max_download_size(), 1024);
    }

    #[test]
    fn test_upload_url() {
        let c = client("http://localhost:3000/", "/api");
        assert_eq!(c.upload_url().unwrap().as_str(), "http://localhost:3000/api/upload");

        let direct = client("http://localhost:8080", "");
        assert_eq!(direct.upload_url().unwrap().as_str(), "http://localhost:8080/upload");
    }

    #[test]
    fn test_download_url_encodes_code() {
        let c = client("http://localhost:3000", "/api");
        let code = ShareCode::parse("ABC123").unwrap();
        assert_eq!(
            c.download_url(&code).unwrap().as_str(),
            "http://localhost:3000/api/download/ABC123"
        );

        let odd = ShareCode::parse("a b/c?d").unwrap();
        assert_eq!(
            c.download_url(&odd).unwrap().as_str(),
            "http://localhost:3000/api/download/a%20b%2Fc%3Fd"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        assert!(ShareClient::new("not a url", "/api", Duration::from_secs(1)).is_err());
    }
}
