//! 应用配置和持久化
//!
//! 设置保存在 `<config_dir>/bytedrop/settings.toml`，环境变量优先于文件中的值。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;

/// 默认后端地址
pub const DEFAULT_BACKEND_HOST: &str = "http://localhost:8080";
/// 客户端默认访问的网关地址
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
/// 网关路径前缀
pub const DEFAULT_API_PREFIX: &str = "/api";
/// 网关默认监听地址
pub const DEFAULT_LISTEN_ADDR: &str = "[::]:3000";
/// 请求超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const ENV_SERVER_URL: &str = "BYTEDROP_SERVER_URL";
pub const ENV_API_PREFIX: &str = "BYTEDROP_API_PREFIX";
pub const ENV_BACKEND_HOST: &str = "BYTEDROP_BACKEND_HOST";
pub const ENV_LISTEN_ADDR: &str = "BYTEDROP_LISTEN_ADDR";
pub const ENV_DOWNLOAD_DIR: &str = "BYTEDROP_DOWNLOAD_DIR";
pub const ENV_TIMEOUT_SECS: &str = "BYTEDROP_TIMEOUT_SECS";

/// 应用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 客户端请求的服务地址（通常是网关）
    pub server_url: String,
    /// 请求路径前缀，为空时直接访问后端
    pub api_prefix: String,
    /// 网关转发的后端地址
    pub backend_host: String,
    /// 网关监听地址
    pub listen_addr: String,
    /// 下载目录
    pub download_dir: PathBuf,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 详细日志模式
    pub verbose: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            backend_host: DEFAULT_BACKEND_HOST.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verbose: false,
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bytedrop");
        config_dir.join("settings.toml")
    }

    /// 加载设置（文件不存在或无法解析时使用默认值），再应用环境变量
    pub fn load() -> Self {
        let mut settings = Self::load_file().unwrap_or_else(|e| {
            log::warn!("{}, using defaults", e);
            Self::default()
        });

        if let Err(e) = settings.apply_env(|key| std::env::var(key).ok()) {
            log::warn!("Ignoring environment override: {}", e);
        }
        settings
    }

    /// 只读取配置文件
    pub fn load_file() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let settings = Self::from_toml(&content)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存设置
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_toml()?)?;
        debug!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// 用环境变量覆盖设置
    ///
    /// `lookup` 一般是 `std::env::var`，测试中可替换。遇到无法解析的值时返回错误，
    /// 此前已应用的覆盖保留。
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_SERVER_URL) {
            self.server_url = v;
        }
        if let Some(v) = lookup(ENV_API_PREFIX) {
            self.api_prefix = v;
        }
        if let Some(v) = non_empty(ENV_BACKEND_HOST) {
            self.backend_host = v;
        }
        if let Some(v) = non_empty(ENV_LISTEN_ADDR) {
            self.listen_addr = v;
        }
        if let Some(v) = non_empty(ENV_DOWNLOAD_DIR) {
            self.download_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_TIMEOUT_SECS) {
            self.timeout_secs = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TIMEOUT_SECS,
                value: v.clone(),
            })?;
        }
        Ok(())
    }
}
