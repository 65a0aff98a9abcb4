//! 日志模块
//!
//! CLI 与 TUI 共用的日志级别和条目定义。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 日志级别，越严重值越小
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// 级别、显示名、日志面板前缀
const LEVELS: [(LogLevel, &str, &str); 5] = [
    (LogLevel::Error, "ERROR", "✖"),
    (LogLevel::Warn, "WARN", "▲"),
    (LogLevel::Info, "INFO", "●"),
    (LogLevel::Debug, "DEBUG", "·"),
    (LogLevel::Trace, "TRACE", "…"),
];

impl LogLevel {
    fn row(self) -> &'static (LogLevel, &'static str, &'static str) {
        &LEVELS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.row().1
    }

    pub fn marker(self) -> &'static str {
        self.row().2
    }

    /// 当前过滤级别下是否显示 `level` 的日志
    pub fn shows(self, level: LogLevel) -> bool {
        level <= self
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

/// 无法识别的日志级别
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl std::str::FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("warning") {
            return Ok(LogLevel::Warn);
        }
        LEVELS
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(s))
            .map(|(level, _, _)| *level)
            .ok_or_else(|| ParseLogLevelError(s.to_string()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 一条日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// `HH:MM:SS` 格式的时间
    pub fn time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<5} {}", self.time(), self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" Debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_filter() {
        assert!(LogLevel::Info.shows(LogLevel::Error));
        assert!(LogLevel::Info.shows(LogLevel::Info));
        assert!(!LogLevel::Info.shows(LogLevel::Debug));
        assert!(LogLevel::Trace.shows(LogLevel::Debug));
    }

    #[test]
    fn test_table_matches_variants() {
        for (i, (level, name, _)) in LEVELS.iter().enumerate() {
            assert_eq!(*level as usize, i);
            assert_eq!(level.as_str(), *name);
            assert_eq!(name.parse::<LogLevel>(), Ok(*level));
        }
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
    }

    #[test]
    fn test_entry_display() {
        let entry = LogEntry::new(LogLevel::Info, "Upload complete");
        let line = entry.to_string();
        assert!(line.ends_with("INFO  Upload complete"));
        assert_eq!(entry.time().len(), 8);
    }
}
