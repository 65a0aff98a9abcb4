use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Command;
use xshell::{Shell, cmd};

/// 发布包含的 (package, 可执行文件)
const RELEASE_BINARIES: [(&str, &str); 3] = [
    ("bytedrop-cli", "bytedrop"),
    ("bytedrop-tui", "bytedrop-tui"),
    ("bytedrop-gateway", "bytedrop-gateway"),
];

#[derive(Parser)]
#[command(name = "xtask", about = "ByteDrop 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行网关 (开发模式)
    Dev {
        /// 后端地址 (默认读取配置)
        #[arg(short, long)]
        backend: Option<String>,
        /// 网关监听地址 (默认读取配置)
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// 运行 TUI (开发模式)
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 <临时目录>/bytedrop.log)
        #[arg(short = 'o', long)]
        log_file: Option<PathBuf>,
    },
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // xtask 位于工作区根目录下一级
    let project_root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")?;
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Dev { backend, listen } => dev(&sh, backend, listen)?,
        Commands::Tui {
            log_level,
            log_file,
        } => tui(&project_root, &log_level, log_file)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    let packages = RELEASE_BINARIES.iter().flat_map(|(pkg, _)| ["-p", *pkg]);
    cmd!(sh, "cargo build --release {packages...}").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn dev(sh: &Shell, backend: Option<String>, listen: Option<String>) -> Result<()> {
    println!("🚀 启动开发网关...");
    let _env = sh.push_env("RUST_LOG", "debug,hyper=info,reqwest=info");

    let mut args = Vec::new();
    if let Some(backend) = backend {
        println!("   后端: {}", backend);
        args.extend(["--backend".to_string(), backend]);
    }
    if let Some(listen) = listen {
        println!("   监听: {}", listen);
        args.extend(["--listen".to_string(), listen]);
    }
    cmd!(sh, "cargo run -p bytedrop-gateway -- {args...}").run()?;
    Ok(())
}

/// TUI 占用终端，日志只能写到文件里
fn tui(root: &Path, log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| std::env::temp_dir().join("bytedrop.log"));

    println!("🖥️  启动 TUI 调试模式...");
    println!("   日志级别: {}", log_level);
    println!("   日志文件: {}", log_file.display());
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {}", log_file.display());
    println!();

    let stderr = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("cannot open {}", log_file.display()))?;

    let status = Command::new("cargo")
        .args(["run", "-p", "bytedrop-tui"])
        .env(
            "RUST_LOG",
            format!("{level},bytedrop_core={level},hyper=info,reqwest=info", level = log_level),
        )
        .current_dir(root)
        .stderr(stderr)
        .status()?;
    anyhow::ensure!(status.success(), "bytedrop-tui exited with {}", status);

    println!();
    println!("📁 日志已保存到: {}", log_file.display());
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("bytedrop-{}-{}-{}", version, std::env::consts::OS, std::env::consts::ARCH);
    let staging = Path::new("dist").join(&dist_name);
    sh.create_dir(&staging)?;

    for (_, bin) in RELEASE_BINARIES {
        let file = format!("{}{}", bin, std::env::consts::EXE_SUFFIX);
        sh.copy_file(Path::new("target/release").join(&file), &staging)?;
    }
    for doc in ["README.md", "DESIGN.md"] {
        if sh.path_exists(doc) {
            sh.copy_file(doc, &staging)?;
        }
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages bytedrop-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    sh.remove_path("dist")?;
    println!("✅ 清理完成");
    Ok(())
}
