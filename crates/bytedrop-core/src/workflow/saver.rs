//! 下载文件的本地保存

use log::debug;

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 同名文件存在时最多尝试的编号
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// 把下载内容保存到本地
#[async_trait]
pub trait FileSaver: Send + Sync {
    /// 保存数据，返回实际写入的路径
    async fn save(&self, name: &str, data: Bytes) -> io::Result<PathBuf>;
}

/// 保存到指定目录
///
/// 文件名只保留最后一个路径分量；同名文件存在时改名为 `name (1).ext`。
/// 内容先写入同目录下的临时文件，写完后才以不覆盖的方式改名，
/// 写入失败或中途被打断时目录里不会留下残缺的文件。
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl FileSaver for DirectorySaver {
    async fn save(&self, name: &str, data: Bytes) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dir = self.dir.clone();
        let name = sanitize_file_name(name);

        // tempfile 是阻塞 API
        tokio::task::spawn_blocking(move || write_then_persist(&dir, &name, &data))
            .await
            .map_err(io::Error::other)?
    }
}

fn write_then_persist(dir: &Path, name: &str, data: &[u8]) -> io::Result<PathBuf> {
    let mut temp = tempfile::Builder::new()
        .prefix(".bytedrop-")
        .suffix(".part")
        .tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(numbered_name(name, attempt));
        temp = match temp.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Saved {} bytes to {:?}", data.len(), path);
                return Ok(path);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => e.file,
            Err(e) => return Err(e.error),
        };
    }

    // temp 在这里被丢弃，临时文件随之删除
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("too many files named {} in {}", name, dir.display()),
    ))
}

/// 去掉目录部分和控制字符，避免写到下载目录之外
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `report.pdf` 的第 n 个候选名: `report (n).pdf`，n 为 0 时保持原名
pub fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}
