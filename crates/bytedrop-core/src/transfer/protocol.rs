//! ByteDrop 上传/下载服务的 HTTP 协议
//!
//! - `POST /upload`: multipart 表单，单个字段 `file`，成功时返回 `{"port": "<分享码>"}`
//! - `GET /download/{code}`: 返回文件二进制内容，文件名在 `Content-Disposition` 中
//!
//! 客户端默认经过网关访问，路径前缀为 `/api`。

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// multipart 表单中文件字段的名称
pub const UPLOAD_FIELD: &str = "file";

/// 上传文件大小上限 (50 MiB)
pub const MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// 缺少 `Content-Type` 时使用的 MIME 类型
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// 无法从响应头得到文件名时使用的前缀
pub const FALLBACK_NAME_PREFIX: &str = "downloaded_file_";

static DISPOSITION_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).unwrap());

/// 分享码
///
/// 由服务端生成，客户端只把它当作不透明的字符串处理。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareCode(String);

impl ShareCode {
    /// 去掉首尾空白后构造，空字符串返回 `None`
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() {
            None
        } else {
            Some(Self(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 上传成功时服务端返回的 JSON
///
/// 字段名 `port` 是服务端的历史命名，实际内容是分享码。
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "port", deserialize_with = "string_or_number")]
    pub share_code: String,
}

impl UploadResponse {
    pub fn into_share_code(self) -> Option<ShareCode> {
        ShareCode::parse(&self.share_code)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// 上传成功后保留的文件元数据快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// 毫秒级 Unix 时间戳
    pub last_modified: i64,
}

/// 上传请求路径
pub fn upload_path(api_prefix: &str) -> String {
    format!("{}/upload", normalize_prefix(api_prefix))
}

/// 下载请求路径（分享码需要由调用方作为单个路径段编码）
pub fn download_path(api_prefix: &str) -> String {
    format!("{}/download", normalize_prefix(api_prefix))
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// 从 `Content-Disposition` 中提取文件名
pub fn filename_from_disposition(disposition: &str) -> Option<String> {
    let name = DISPOSITION_FILENAME
        .captures(disposition)?
        .get(1)?
        .as_str()
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// 确定下载文件名，响应头中没有时使用 `downloaded_file_<毫秒时间戳>`
pub fn suggested_file_name(disposition: Option<&str>, now_millis: i64) -> String {
    disposition
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| format!("{}{}", FALLBACK_NAME_PREFIX, now_millis))
}
