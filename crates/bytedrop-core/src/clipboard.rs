//! 剪贴板

use log::debug;

/// 把文本复制到系统剪贴板
///
/// 没有可用的剪贴板（如无图形会话）时返回错误，调用方只需记录日志。
pub fn copy_to_clipboard(text: &str) -> anyhow::Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_owned())?;
    debug!("Copied {} chars to clipboard", text.chars().count());
    Ok(())
}
