//! ByteDrop TUI - 交互式终端界面
//!
//! 在终端里上传文件、查看分享码、凭分享码下载。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p bytedrop-tui 2>> /tmp/bytedrop.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use bytedrop_core::AppSettings;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, InputMode, Tab};
use tui_log::TuiLogLayer;

#[tokio::main]
async fn main() -> Result<()> {
    // 命令行参数: 可选的待上传文件路径
    let file_path = std::env::args().nth(1);

    let settings = AppSettings::load();
    let mut app = App::new(settings)?;

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone());

    if let Some(path) = file_path {
        app.path_input = path;
        app.load_file();
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>) {
    // 桥接 log crate（bytedrop-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bytedrop_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let quit = match app.input_mode {
                InputMode::EditingPath => {
                    handle_path_input(&mut app, key);
                    false
                }
                InputMode::EditingCode => {
                    handle_code_input(&mut app, key);
                    false
                }
                InputMode::Normal => handle_normal(&mut app, key),
            };
            if quit {
                return Ok(());
            }
        }

        // 处理后台任务发来的事件
        app.tick();

        // 让出执行权，后台任务在单线程调度下也能推进
        tokio::task::yield_now().await;
    }
}

fn handle_path_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            app.load_file();
        }
        KeyCode::Char(c) => app.path_input.push(c),
        KeyCode::Backspace => {
            app.path_input.pop();
        }
        _ => {}
    }
}

fn handle_code_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            app.start_download();
        }
        KeyCode::Char(c) => app.push_code_char(c),
        KeyCode::Backspace => app.pop_code_char(),
        _ => {}
    }
}

/// 返回是否退出
fn handle_normal(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Tab => app.next_tab(),
        KeyCode::Char('1') => app.tab = Tab::Upload,
        KeyCode::Char('2') => app.tab = Tab::Download,
        KeyCode::Char('3') => app.tab = Tab::Log,
        code => match (app.tab, code) {
            (Tab::Upload, KeyCode::Char('o')) if !app.is_uploading() => {
                app.input_mode = InputMode::EditingPath;
            }
            (Tab::Upload, KeyCode::Enter) => app.start_upload(),
            (Tab::Upload, KeyCode::Char('x')) => app.cancel_upload(),
            (Tab::Upload, KeyCode::Char('y')) => app.copy_share_code(),
            (Tab::Download, KeyCode::Char('i')) if !app.is_downloading() => {
                app.input_mode = InputMode::EditingCode;
            }
            (Tab::Download, KeyCode::Enter) => app.start_download(),
            (Tab::Download, KeyCode::Char('x')) => app.cancel_download(),
            (Tab::Log, KeyCode::Char('d')) => app.toggle_log_level(),
            (Tab::Log, KeyCode::Char('c')) => app.clear_logs(),
            _ => {}
        },
    }
    false
}
