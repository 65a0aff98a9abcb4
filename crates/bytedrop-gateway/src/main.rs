//! ByteDrop Gateway
//!
//! 开发用反向代理，把 `/api/upload` 和 `/api/download/{code}` 转发到后端。
//! 后端地址来自 `--backend`、`BYTEDROP_BACKEND_HOST` 或配置文件，默认 `http://localhost:8080`。

use anyhow::Result;
use bytedrop_core::{AppSettings, Gateway};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bytedrop-gateway")]
#[command(author, version, about = "ByteDrop 开发网关")]
struct Args {
    /// 监听地址
    #[arg(short, long)]
    listen: Option<String>,

    /// 后端地址
    #[arg(short, long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 桥接 log crate（bytedrop-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bytedrop_core=debug")),
        )
        .try_init();

    let args = Args::parse();
    let mut settings = AppSettings::load();
    if let Some(listen) = args.listen {
        settings.listen_addr = listen;
    }
    if let Some(backend) = args.backend {
        settings.backend_host = backend;
    }

    tracing::info!("ByteDrop Gateway starting...");
    let gateway = Gateway::from_settings(&settings)?;

    tokio::select! {
        res = gateway.serve(&settings.listen_addr) => {
            tracing::error!("Gateway exited: {:?}", res);
            res
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
