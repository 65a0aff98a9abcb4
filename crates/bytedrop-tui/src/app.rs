//! Application state

use bytedrop_core::{
    AppSettings, DirectorySaver, DownloadFlow, DownloadResult, LogEntry, LogLevel, SelectedFile,
    ShareClient, ShareService, SimpleTransferCallback, TransferError, TransferEvent, UploadFlow,
    UploadResult, clipboard,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 日志面板最多保留的条数
const MAX_LOGS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Upload,
    Download,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    /// 输入要上传的文件路径
    EditingPath,
    /// 输入分享码
    EditingCode,
}

/// 后台任务发回 UI 的事件
pub enum AppEvent {
    LogMessage {
        level: String,
        message: String,
    },
    FileLoaded(Result<SelectedFile, String>),
    Upload(TransferEvent),
    Download(TransferEvent),
    UploadDone(Box<UploadFlow>, Result<UploadResult, TransferError>),
    DownloadDone(Box<DownloadFlow>, Result<DownloadResult, TransferError>),
}

pub struct App {
    pub tab: Tab,
    pub input_mode: InputMode,
    pub settings: AppSettings,
    /// 传输进行中时流程被移到后台任务里，这里为 `None`
    pub upload: Option<UploadFlow>,
    pub download: Option<DownloadFlow>,
    pub upload_progress: u8,
    pub download_progress: u8,
    /// 正在上传的文件名
    pub uploading_name: Option<String>,
    pub path_input: String,
    pub code_input: String,
    pub status_message: String,
    pub logs: Vec<LogEntry>,
    pub log_level: LogLevel,
    upload_abort: Option<CancellationToken>,
    download_abort: Option<CancellationToken>,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    pub fn new(settings: AppSettings) -> anyhow::Result<Self> {
        let service: Arc<dyn ShareService> = Arc::new(ShareClient::from_settings(&settings)?);
        let saver = Arc::new(DirectorySaver::new(settings.download_dir.clone()));
        Ok(Self::with_service(settings, service, saver))
    }

    pub fn with_service(
        settings: AppSettings,
        service: Arc<dyn ShareService>,
        saver: Arc<DirectorySaver>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let log_level = if settings.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        let mut app = Self {
            tab: Tab::Upload,
            input_mode: InputMode::Normal,
            upload: Some(UploadFlow::new(service.clone())),
            download: Some(DownloadFlow::new(service, saver)),
            upload_progress: 0,
            download_progress: 0,
            uploading_name: None,
            path_input: String::new(),
            code_input: String::new(),
            status_message: "就绪".to_string(),
            logs: Vec::new(),
            log_level,
            upload_abort: None,
            download_abort: None,
            event_tx,
            event_rx,
            settings,
        };
        app.add_log(LogLevel::Info, "ByteDrop TUI 启动");
        app.add_log(
            LogLevel::Info,
            format!("服务地址: {}{}", app.settings.server_url, app.settings.api_prefix),
        );
        app
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    /// 按当前级别过滤后的日志
    pub fn visible_logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| self.log_level.shows(e.level))
    }

    pub fn toggle_log_level(&mut self) {
        self.log_level = if self.log_level == LogLevel::Debug {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };
        self.status_message = format!("日志级别: {}", self.log_level);
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Upload => Tab::Download,
            Tab::Download => Tab::Log,
            Tab::Log => Tab::Upload,
        };
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_none()
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_none()
    }

    // ---- 上传 ----

    /// 按输入的路径读取文件信息
    pub fn load_file(&mut self) {
        let path = self.path_input.trim().to_string();
        if path.is_empty() {
            return;
        }
        self.status_message = format!("读取 {}...", path);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let loaded = SelectedFile::from_path(&path)
                .await
                .map_err(|e| format!("{}: {}", path, e));
            let _ = tx.send(AppEvent::FileLoaded(loaded)).await;
        });
    }

    pub fn start_upload(&mut self) {
        let Some(flow) = self.upload.as_ref() else {
            return;
        };
        let Some(file) = flow.selected_file() else {
            self.status_message = "请先按 'o' 选择文件".to_string();
            return;
        };
        let name = file.name.clone();

        let Some(mut flow) = self.upload.take() else {
            return;
        };
        self.upload_abort = Some(flow.abort_handle());
        self.uploading_name = Some(name.clone());
        self.upload_progress = 0;
        self.status_message = format!("上传 {}...", name);

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let (callback, events) = SimpleTransferCallback::new();
            forward_events(events, tx.clone(), AppEvent::Upload);
            let outcome = flow.start_upload_with(Arc::new(callback)).await;
            let _ = tx.send(AppEvent::UploadDone(Box::new(flow), outcome)).await;
        });
    }

    /// 上传中则中止，否则清空选择和结果
    pub fn cancel_upload(&mut self) {
        if let Some(abort) = &self.upload_abort {
            abort.cancel();
            self.status_message = "正在取消上传...".to_string();
        } else if let Some(flow) = self.upload.as_mut() {
            flow.cancel();
            self.upload_progress = 0;
            self.status_message = "已清空".to_string();
        }
    }

    pub fn copy_share_code(&mut self) {
        let code = self
            .upload
            .as_ref()
            .and_then(UploadFlow::result)
            .and_then(UploadResult::share_code)
            .map(|c| c.as_str().to_string());
        let Some(code) = code else {
            return;
        };
        match clipboard::copy_to_clipboard(&code) {
            Ok(()) => {
                self.status_message = format!("分享码 {} 已复制", code);
            }
            Err(e) => {
                self.add_log(LogLevel::Warn, format!("复制到剪贴板失败: {}", e));
                self.status_message = "复制失败".to_string();
            }
        }
    }

    // ---- 下载 ----

    pub fn push_code_char(&mut self, c: char) {
        self.code_input.push(c);
        self.sync_share_code();
    }

    pub fn pop_code_char(&mut self) {
        self.code_input.pop();
        self.sync_share_code();
    }

    fn sync_share_code(&mut self) {
        if let Some(flow) = self.download.as_mut() {
            flow.set_share_code(self.code_input.clone());
        }
    }

    pub fn can_download(&self) -> bool {
        self.download
            .as_ref()
            .is_some_and(DownloadFlow::can_download)
    }

    pub fn start_download(&mut self) {
        if !self.can_download() {
            self.status_message = "请先按 'i' 输入分享码".to_string();
            return;
        }
        let Some(mut flow) = self.download.take() else {
            return;
        };
        self.download_abort = Some(flow.abort_handle());
        self.download_progress = 0;
        self.status_message = format!("下载 {}...", self.code_input.trim());

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let (callback, events) = SimpleTransferCallback::new();
            forward_events(events, tx.clone(), AppEvent::Download);
            let outcome = flow.start_download_with(Arc::new(callback)).await;
            let _ = tx.send(AppEvent::DownloadDone(Box::new(flow), outcome)).await;
        });
    }

    /// 下载中则中止，否则清空分享码和结果
    pub fn cancel_download(&mut self) {
        if let Some(abort) = &self.download_abort {
            abort.cancel();
            self.status_message = "正在取消下载...".to_string();
        } else if let Some(flow) = self.download.as_mut() {
            flow.reset();
            self.code_input.clear();
            self.download_progress = 0;
            self.status_message = "已清空".to_string();
        }
    }

    // ---- 事件 ----

    /// 处理后台任务发来的事件
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LogMessage { level, message } => {
                let level = level.parse().unwrap_or(LogLevel::Info);
                self.add_log(level, message);
            }
            AppEvent::FileLoaded(Ok(file)) => {
                let name = file.name.clone();
                if let Some(flow) = self.upload.as_mut()
                    && flow.select_file(Some(file))
                {
                    self.upload_progress = 0;
                    self.status_message = format!("已选择 {}，按 Enter 上传", name);
                }
            }
            AppEvent::FileLoaded(Err(e)) => {
                self.add_log(LogLevel::Error, format!("无法读取文件 {}", e));
                self.status_message = "无法读取文件".to_string();
            }
            AppEvent::Upload(TransferEvent::Progress(p)) => {
                if self.is_uploading() {
                    self.upload_progress = p;
                }
            }
            AppEvent::Download(TransferEvent::Progress(p)) => {
                if self.is_downloading() {
                    self.download_progress = p;
                }
            }
            AppEvent::Upload(TransferEvent::Status(s))
            | AppEvent::Download(TransferEvent::Status(s)) => {
                self.status_message = s;
            }
            AppEvent::Upload(_) | AppEvent::Download(_) => {}
            AppEvent::UploadDone(flow, outcome) => {
                self.upload_abort = None;
                self.uploading_name = None;
                self.upload_progress = flow.progress();
                self.upload = Some(*flow);
                match outcome {
                    Ok(UploadResult::Success { share_code, .. }) => {
                        self.add_log(LogLevel::Info, format!("上传完成，分享码: {}", share_code));
                        self.status_message = "上传完成，按 'y' 复制分享码".to_string();
                    }
                    Ok(UploadResult::Failure { error }) => {
                        self.add_log(LogLevel::Error, error.clone());
                        self.status_message = error;
                    }
                    Err(e) => {
                        self.add_log(LogLevel::Warn, format!("上传未完成: {}", e));
                        self.status_message = e.to_string();
                    }
                }
            }
            AppEvent::DownloadDone(flow, outcome) => {
                self.download_abort = None;
                self.download_progress = flow.progress();
                self.download = Some(*flow);
                match outcome {
                    Ok(DownloadResult::Success(file)) => {
                        self.add_log(
                            LogLevel::Info,
                            format!("已下载 {} 到 {}", file.name, file.path.display()),
                        );
                        self.status_message = format!("下载完成: {}", file.name);
                    }
                    Ok(DownloadResult::Failure { error }) => {
                        self.add_log(LogLevel::Error, error.clone());
                        self.status_message = error;
                    }
                    Err(TransferError::Cancelled) => {
                        // 取消后流程回到 Idle，分享码也被清空
                        self.code_input.clear();
                        self.add_log(LogLevel::Warn, "下载已取消");
                        self.status_message = "下载已取消".to_string();
                    }
                    Err(e) => {
                        self.add_log(LogLevel::Warn, format!("下载未完成: {}", e));
                        self.status_message = e.to_string();
                    }
                }
            }
        }
    }
}

/// 把传输回调的事件转发到 UI 事件队列
fn forward_events(
    mut events: mpsc::UnboundedReceiver<TransferEvent>,
    tx: mpsc::Sender<AppEvent>,
    wrap: fn(TransferEvent) -> AppEvent,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if tx.send(wrap(event)).await.is_err() {
                break;
            }
        }
    });
}
