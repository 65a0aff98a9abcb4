//! 传输进度
//!
//! 传输层只上报字节数，由 [`ProgressTracker`] 换算成 0-100 的整数百分比，
//! 保证同一次传输中上报的值单调不减，然后转发给 [`TransferCallback`]。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::mpsc;

/// 传输事件回调
pub trait TransferCallback: Send + Sync {
    /// 状态更新
    fn on_status(&self, _status: &str) {}
    /// 进度更新 (0-100)
    fn on_progress(&self, percent: u8);
    /// 传输成功
    fn on_complete(&self, _summary: &str) {}
    /// 传输失败
    fn on_error(&self, _error: &str) {}
}

/// 通过 channel 转发事件的回调实现
pub struct SimpleTransferCallback {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Status(String),
    Progress(u8),
    Complete(String),
    Error(String),
}

impl SimpleTransferCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransferCallback for SimpleTransferCallback {
    fn on_status(&self, status: &str) {
        let _ = self.tx.send(TransferEvent::Status(status.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        let _ = self.tx.send(TransferEvent::Progress(percent));
    }

    fn on_complete(&self, summary: &str) {
        let _ = self.tx.send(TransferEvent::Complete(summary.to_string()));
    }

    fn on_error(&self, error: &str) {
        let _ = self.tx.send(TransferEvent::Error(error.to_string()));
    }
}

/// 不关心事件时使用
pub struct NoopCallback;

impl TransferCallback for NoopCallback {
    fn on_progress(&self, _percent: u8) {}
}

/// 计算百分比，总大小未知或为 0 时返回 `None`
pub fn percent_of(transferred: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let total = u128::from(total);
    let done = u128::from(transferred).min(total);
    // 四舍五入
    let percent = (done * 100 + total / 2) / total;
    u8::try_from(percent.min(100)).ok()
}

struct TrackerInner {
    transferred: AtomicU64,
    percent: AtomicU8,
    callback: Arc<dyn TransferCallback>,
}

/// 单次传输的进度跟踪器
///
/// 可以克隆后移动到请求体的流中，所有克隆共享同一份计数。
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(callback: Arc<dyn TransferCallback>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                transferred: AtomicU64::new(0),
                percent: AtomicU8::new(0),
                callback,
            }),
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NoopCallback))
    }

    /// 上报起始进度 0
    pub fn start(&self) {
        self.inner.callback.on_progress(self.percent());
    }

    /// 累加已传输字节数
    pub fn advance(&self, bytes: u64, total: Option<u64>) {
        let transferred = self.inner.transferred.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.report(transferred, total);
    }

    /// 设置已传输字节数的绝对值
    pub fn set(&self, transferred: u64, total: Option<u64>) {
        self.inner.transferred.fetch_max(transferred, Ordering::SeqCst);
        self.report(transferred, total);
    }

    fn report(&self, transferred: u64, total: Option<u64>) {
        let Some(percent) = total.and_then(|t| percent_of(transferred, t)) else {
            return;
        };
        let previous = self.inner.percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.inner.callback.on_progress(percent);
        }
    }

    pub fn percent(&self) -> u8 {
        self.inner.percent.load(Ordering::SeqCst)
    }

    pub fn transferred(&self) -> u64 {
        self.inner.transferred.load(Ordering::SeqCst)
    }
}
