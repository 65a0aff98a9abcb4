//! 终端进度条

use bytedrop_core::TransferCallback;
use indicatif::{ProgressBar, ProgressStyle};

/// 把传输事件画到进度条上
pub struct BarCallback {
    bar: ProgressBar,
}

impl BarCallback {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl TransferCallback for BarCallback {
    fn on_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_complete(&self, _summary: &str) {
        self.bar.finish_and_clear();
    }

    fn on_error(&self, _error: &str) {
        self.bar.abandon();
    }
}
