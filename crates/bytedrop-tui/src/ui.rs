//! UI rendering module

use bytedrop_core::{
    DownloadResult, DownloadState, FileMetadata, LogLevel, UploadResult, UploadState,
};
use chrono::{DateTime, Local};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, InputMode, Tab};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_status_bar(frame, app, chunks[2]);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles = vec!["上传 [1]", "下载 [2]", "日志 [3]"];
    let selected = match app.tab {
        Tab::Upload => 0,
        Tab::Download => 1,
        Tab::Log => 2,
    };

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" ByteDrop "))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.tab {
        Tab::Upload => draw_upload_tab(frame, app, area),
        Tab::Download => draw_download_tab(frame, app, area),
        Tab::Log => draw_log_tab(frame, app, area),
    }
}

fn input_box<'a>(value: &'a str, title: &'a str, editing: bool) -> Paragraph<'a> {
    let style = if editing {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let text = if editing {
        format!("{}█", value)
    } else {
        value.to_string()
    };
    Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn progress_gauge(title: &str, percent: u8) -> Gauge<'_> {
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .percent(u16::from(percent))
        .label(format!("{}%", percent))
}

fn draw_upload_tab(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Path input
            Constraint::Length(3), // Progress
            Constraint::Min(5),    // File info / result
        ])
        .split(area);

    frame.render_widget(
        input_box(
            &app.path_input,
            " 📂 文件路径 ",
            app.input_mode == InputMode::EditingPath,
        ),
        chunks[0],
    );
    frame.render_widget(
        progress_gauge(" 📤 上传进度 ", app.upload_progress),
        chunks[1],
    );

    let lines: Vec<Line> = match app.upload.as_ref().map(|f| f.state()) {
        None => vec![Line::from(format!(
            "正在上传: {}",
            app.uploading_name.as_deref().unwrap_or("-")
        ))],
        Some(UploadState::Idle) => vec![Line::from("未选择文件，按 'o' 输入路径")],
        Some(UploadState::FileSelected(file)) => {
            let mut lines = metadata_lines(&file.metadata());
            lines.push(Line::from(""));
            lines.push(Line::from("按 Enter 上传"));
            lines
        }
        Some(UploadState::Uploading(file)) => vec![Line::from(format!("正在上传: {}", file.name))],
        Some(UploadState::Completed(UploadResult::Success {
            share_code,
            metadata,
        })) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::raw("分享码: "),
                    Span::styled(
                        share_code.to_string(),
                        Style::default().fg(Color::Green).bold(),
                    ),
                ]),
                Line::from(""),
            ];
            lines.extend(metadata_lines(metadata));
            lines.push(Line::from(""));
            lines.push(Line::from("按 'y' 复制分享码，'x' 清空"));
            lines
        }
        Some(UploadState::Completed(UploadResult::Failure { error })) => vec![Line::styled(
            format!("❌ {}", error),
            Style::default().fg(Color::Red),
        )],
    };

    let info = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" 文件信息 "))
        .wrap(Wrap { trim: true });
    frame.render_widget(info, chunks[2]);
}

fn metadata_lines(metadata: &FileMetadata) -> Vec<Line<'static>> {
    let modified = DateTime::from_timestamp_millis(metadata.last_modified)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    vec![
        Line::from(format!("名称: {}", metadata.name)),
        Line::from(format!("大小: {}", human_size(metadata.size))),
        Line::from(format!("类型: {}", metadata.mime_type)),
        Line::from(format!("修改时间: {}", modified)),
    ]
}

fn draw_download_tab(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Share code input
            Constraint::Length(3), // Progress
            Constraint::Min(5),    // Result
        ])
        .split(area);

    frame.render_widget(
        input_box(
            &app.code_input,
            " 🔑 分享码 ",
            app.input_mode == InputMode::EditingCode,
        ),
        chunks[0],
    );
    frame.render_widget(
        progress_gauge(" 📥 下载进度 ", app.download_progress),
        chunks[1],
    );

    let lines: Vec<Line> = match app.download.as_ref().map(|f| f.state()) {
        None => vec![Line::from(format!("正在下载: {}", app.code_input.trim()))],
        Some(DownloadState::Idle) => {
            if app.can_download() {
                vec![Line::from("按 Enter 下载")]
            } else {
                vec![Line::from("按 'i' 输入分享码")]
            }
        }
        Some(DownloadState::Downloading(code)) => vec![Line::from(format!("正在下载: {}", code))],
        Some(DownloadState::Completed(DownloadResult::Success(file))) => vec![
            Line::styled("✅ 下载完成", Style::default().fg(Color::Green).bold()),
            Line::from(""),
            Line::from(format!("名称: {}", file.name)),
            Line::from(format!("大小: {}", human_size(file.size))),
            Line::from(format!("类型: {}", file.mime_type)),
            Line::from(format!(
                "时间: {}",
                file.upload_date
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
            )),
            Line::from(format!("位置: {}", file.path.display())),
        ],
        Some(DownloadState::Completed(DownloadResult::Failure { error })) => vec![Line::styled(
            format!("❌ {}", error),
            Style::default().fg(Color::Red),
        )],
    };

    let info = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" 下载结果 "))
        .wrap(Wrap { trim: true });
    frame.render_widget(info, chunks[2]);
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = usize::from(area.height.saturating_sub(2));
    let logs: Vec<_> = app.visible_logs().collect();
    let items: Vec<ListItem> = logs
        .iter()
        .rev()
        .take(height)
        .rev()
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Info => Color::White,
                LogLevel::Debug | LogLevel::Trace => Color::DarkGray,
            };
            ListItem::new(format!("{} {} {}", entry.time(), entry.level.marker(), entry.message))
                .style(Style::default().fg(color))
        })
        .collect();

    let title = format!(" 📋 日志 ({}) ", app.log_level);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let keys = match (app.input_mode, app.tab) {
        (InputMode::EditingPath | InputMode::EditingCode, _) => "[Enter]确认 [Esc]取消",
        (InputMode::Normal, Tab::Upload) => "[o]选择 [Enter]上传 [x]取消 [y]复制 [Tab]切换 [q]退出",
        (InputMode::Normal, Tab::Download) => "[i]输入 [Enter]下载 [x]取消 [Tab]切换 [q]退出",
        (InputMode::Normal, Tab::Log) => "[d]调试日志 [c]清空 [Tab]切换 [q]退出",
    };

    let status = Paragraph::new(format!(" {} │ {}", app.status_message, keys))
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
