//! ByteDrop CLI
//!
//! 命令行客户端：上传文件换取分享码，或凭分享码下载文件

mod progress;

use anyhow::{Result, bail};
use bytedrop_core::{
    AppSettings, DirectorySaver, DownloadFlow, DownloadResult, SelectedFile, ShareClient,
    TransferError, UploadFlow, UploadResult, clipboard,
};
use clap::{Parser, Subcommand};
use indicatif::HumanBytes;
use progress::BarCallback;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bytedrop", version, about = "ByteDrop - 文件分享工具")]
struct Cli {
    /// 服务地址 (覆盖配置文件)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// 请求路径前缀，直连后端时设为空字符串
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传文件并获取分享码
    Upload {
        /// 要上传的文件路径
        file: PathBuf,
        /// 成功后把分享码复制到剪贴板
        #[arg(short, long)]
        copy: bool,
    },
    /// 凭分享码下载文件
    Download {
        /// 分享码
        code: String,
        /// 保存目录 (默认: 配置中的下载目录)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 管理配置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 显示生效的配置
    Show,
    /// 写入默认配置文件
    Init {
        /// 覆盖已有文件
        #[arg(short, long)]
        force: bool,
    },
    /// 显示配置文件路径
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = AppSettings::load();
    if let Some(server) = cli.server {
        settings.server_url = server;
    }
    if let Some(prefix) = cli.prefix {
        settings.api_prefix = prefix;
    }

    match cli.command {
        Commands::Upload { file, copy } => upload(&settings, file, copy).await,
        Commands::Download { code, output } => {
            let dir = output.unwrap_or_else(|| settings.download_dir.clone());
            download(&settings, code, dir).await
        }
        Commands::Config { action } => config(&settings, action),
    }
}

fn init_logging(verbose: bool) {
    // 桥接 log crate（bytedrop-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default = if verbose {
        "info,bytedrop_core=debug"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Ctrl-C 时中止传输
fn spawn_abort_on_ctrl_c(abort: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.cancel();
        }
    })
}

async fn upload(settings: &AppSettings, path: PathBuf, copy: bool) -> Result<()> {
    let file = SelectedFile::from_path(&path).await?;
    println!(
        "📤 上传文件: {} ({}, {})",
        file.name,
        HumanBytes(file.size),
        file.mime_type
    );

    let client = ShareClient::from_settings(settings)?;
    let mut flow = UploadFlow::new(Arc::new(client));
    flow.select_file(Some(file));

    let abort = flow.abort_handle();
    let watcher = spawn_abort_on_ctrl_c(abort);

    let callback = BarCallback::new();
    let bar = callback.bar();
    let outcome = flow.start_upload_with(Arc::new(callback)).await;
    watcher.abort();

    match outcome {
        Ok(UploadResult::Success { share_code, .. }) => {
            bar.finish_and_clear();
            println!("✅ 上传完成");
            println!("   分享码: {}", share_code);
            if copy {
                match clipboard::copy_to_clipboard(share_code.as_str()) {
                    Ok(()) => println!("   已复制到剪贴板"),
                    Err(e) => tracing::warn!("Failed to copy share code: {}", e),
                }
            }
            Ok(())
        }
        Ok(UploadResult::Failure { error }) => {
            bar.abandon();
            bail!(error)
        }
        Err(TransferError::Cancelled) => {
            bar.abandon();
            println!("⏹️  已取消");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn download(settings: &AppSettings, code: String, dir: PathBuf) -> Result<()> {
    println!("📥 下载分享码 {} (保存到: {})", code.trim(), dir.display());

    let client = ShareClient::from_settings(settings)?;
    let saver = DirectorySaver::new(dir);
    let mut flow = DownloadFlow::new(Arc::new(client), Arc::new(saver));
    flow.set_share_code(code);

    let abort = flow.abort_handle();
    let watcher = spawn_abort_on_ctrl_c(abort);

    let callback = BarCallback::new();
    let bar = callback.bar();
    let outcome = flow.start_download_with(Arc::new(callback)).await;
    watcher.abort();

    match outcome {
        Ok(DownloadResult::Success(file)) => {
            bar.finish_and_clear();
            println!("✅ 下载完成");
            println!("   文件: {} ({}, {})", file.name, HumanBytes(file.size), file.mime_type);
            println!("   位置: {}", file.path.display());
            Ok(())
        }
        Ok(DownloadResult::Failure { error }) => {
            bar.abandon();
            bail!(error)
        }
        Err(TransferError::Cancelled) => {
            bar.abandon();
            println!("⏹️  已取消");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn config(settings: &AppSettings, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", settings.to_toml()?);
        }
        ConfigAction::Init { force } => {
            let path = AppSettings::config_path();
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            let path = AppSettings::default().save()?;
            println!("📝 已写入 {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", AppSettings::config_path().display());
        }
    }
    Ok(())
}
