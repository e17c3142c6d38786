//! 源视频下载
//!
//! 批处理条目只给 URL 时，先把源视频落到本地再走分析阶段
//! （聊天界面的附件上传只认本地文件）。已存在的文件直接复用。

use crate::error::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tracing::info;

/// 按 URL 下载到 videos_dir，返回本地路径
///
/// 文件名取 URL 最后一段；已存在则跳过下载。
pub async fn download_source(videos_dir: &str, url: &str) -> AppResult<PathBuf> {
    let filename = url
        .split('/')
        .next_back()
        .filter(|s| !s.is_empty())
        .unwrap_or("source.mp4")
        .split('?')
        .next()
        .unwrap_or("source.mp4");

    std::fs::create_dir_all(videos_dir)?;
    let dest = Path::new(videos_dir).join(filename);
    if dest.exists() {
        info!("📁 源视频已存在，跳过下载: {}", dest.display());
        return Ok(dest);
    }

    info!("⬇️ 下载源视频: {}", url);
    let response = reqwest::get(url)
        .await
        .map_err(|e| AppError::Other(format!("下载失败 ({}): {}", url, e)))?;
    if !response.status().is_success() {
        return Err(AppError::Other(format!(
            "下载失败 ({}): HTTP {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::Other(format!("读取下载内容失败: {}", e)))?;
    std::fs::write(&dest, &bytes)?;

    info!("✓ 已下载 {} 字节: {}", bytes.len(), dest.display());
    Ok(dest)
}
