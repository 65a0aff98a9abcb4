//! 网关
//!
//! 把对外的 `/api/...` 路径改写后转发到后端：
//!
//! | 请求路径 | 后端路径 |
//! |---|---|
//! | `/api/upload` | `/upload` |
//! | `/api/download/{code}` | `/download/{code}` |
//!
//! 其余路径返回 404。请求体和响应体都以流的方式转发，`Host` 使用后端地址。

use log::{debug, error, info, warn};

use crate::config::AppSettings;
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const UPLOAD_PREFIX: &str = "/api/upload";
const DOWNLOAD_PREFIX: &str = "/api/download";

/// 逐跳头部，不转发
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// 把对外路径改写为后端路径，不需要转发时返回 `None`
pub fn rewrite_path(path: &str) -> Option<String> {
    if let Some(rest) = path.strip_prefix(UPLOAD_PREFIX) {
        return Some(format!("/upload{}", rest));
    }
    match path.strip_prefix(DOWNLOAD_PREFIX) {
        Some(rest) if rest.starts_with('/') => Some(format!("/download{}", rest)),
        _ => None,
    }
}

struct GatewayState {
    backend: String,
    client: reqwest::Client,
}

/// 反向代理网关
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(backend_host: &str) -> anyhow::Result<Self> {
        let backend = Url::parse(backend_host)?;
        if !matches!(backend.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported backend scheme: {}", backend.scheme());
        }

        // 上传可能很慢，只限制建立连接的时间
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            state: Arc::new(GatewayState {
                backend: backend_host.trim_end_matches('/').to_string(),
                client,
            }),
        })
    }

    pub fn from_settings(settings: &AppSettings) -> anyhow::Result<Self> {
        Self::new(&settings.backend_host)
    }

    pub fn backend(&self) -> &str {
        &self.state.backend
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
    }

    /// 在后台启动，返回实际监听地址
    pub async fn start(&self, listen_addr: &str) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(listen_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();

        info!("Gateway listening on {}, forwarding to {}", addr, self.state.backend);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Gateway error: {}", e);
            }
        });

        Ok((addr, handle))
    }

    /// 在当前任务中运行直到出错
    pub async fn serve(&self, listen_addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!(
            "Gateway listening on {}, forwarding to {}",
            listener.local_addr()?,
            self.state.backend
        );
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn proxy_handler(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    let Some(path) = rewrite_path(req.uri().path()) else {
        debug!("No route for {}", req.uri().path());
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let query = req
        .uri()
        .query()
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    let target = format!("{}{}{}", state.backend, path, query);
    debug!("{} {} -> {}", req.method(), req.uri(), target);

    let (parts, body) = req.into_parts();
    let upstream = state
        .client
        .request(parts.method, &target)
        .headers(forwardable(&parts.headers))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    let upstream = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Backend request to {} failed: {}", target, e);
            return (StatusCode::BAD_GATEWAY, "Bad gateway").into_response();
        }
    };

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_upload() {
        assert_eq!(rewrite_path("/api/upload"), Some("/upload".to_string()));
        assert_eq!(rewrite_path("/api/upload/"), Some("/upload/".to_string()));
    }

    #[test]
    fn test_rewrite_download() {
        assert_eq!(
            rewrite_path("/api/download/ABC123"),
            Some("/download/ABC123".to_string())
        );
        assert_eq!(rewrite_path("/api/download"), None);
        assert_eq!(rewrite_path("/api/downloads/x"), None);
    }

    #[test]
    fn test_rewrite_other() {
        assert_eq!(rewrite_path("/"), None);
        assert_eq!(rewrite_path("/upload"), None);
        assert_eq!(rewrite_path("/api/other"), None);
    }

    #[test]
    fn test_forwardable_drops_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "localhost:3000".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/pdf".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());

        let out = forwardable(&headers);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(out.get(header::CONTENT_TYPE).unwrap(), "application/pdf");
        assert_eq!(out.get(header::CONTENT_LENGTH).unwrap(), "42");
    }

    #[test]
    fn test_rejects_bad_backend() {
        assert!(Gateway::new("ftp://example.com").is_err());
        assert!(Gateway::new("not a url").is_err());
        assert_eq!(
            Gateway::new("http://localhost:8080/").unwrap().backend(),
            "http://localhost:8080"
        );
    }
}
