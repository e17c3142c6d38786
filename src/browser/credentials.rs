//! 凭据快照 - 基础设施层
//!
//! 登录后把 cookies 快照到磁盘，下次创建会话时回放，避免重复交互式登录。
//! 文件按 `会话ID_域名` 分开，同一域名下的并发会话互不碰撞。

use crate::error::{AppError, AppResult, StoreError};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// 单个会话的凭据存储
#[derive(Clone, Debug)]
pub struct CredentialStore {
    dir: PathBuf,
    session_id: String,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            session_id: session_id.into(),
        }
    }

    /// 某域名对应的凭据文件路径
    pub fn path_for(&self, domain: &str) -> PathBuf {
        let safe_domain = domain.replace([':', '/'], "_");
        self.dir
            .join(format!("{}_{}.json", self.session_id, safe_domain))
    }

    /// 加载某域名的凭据快照
    ///
    /// 快照缺失或损坏都返回 None（损坏时记 warn），首次登录本来就没有快照。
    pub fn load(&self, domain: &str) -> Option<Vec<CookieParam>> {
        let path = self.path_for(domain);
        if !path.exists() {
            return None;
        }
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("⚠️ 读取凭据快照失败 ({}): {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Vec<CookieParam>>(&content) {
            Ok(cookies) => {
                debug!("已加载 {} 条凭据: {}", cookies.len(), path.display());
                Some(cookies)
            }
            Err(e) => {
                warn!("⚠️ 凭据快照损坏，忽略 ({}): {}", path.display(), e);
                None
            }
        }
    }

    /// 把当前 cookies 快照到磁盘
    ///
    /// Cookie 与 CookieParam 的线上字段名一致，直接经 JSON 转换。
    pub fn save(&self, domain: &str, cookies: &[Cookie]) -> AppResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: self.dir.display().to_string(),
                source: Box::new(e),
            })
        })?;
        let path = self.path_for(domain);
        let content = serde_json::to_string_pretty(cookies)?;
        fs::write(&path, content).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        debug!("已保存 {} 条凭据: {}", cookies.len(), path.display());
        Ok(())
    }

    /// 清除某域名的凭据快照（硬重置用）
    pub fn clear(&self, domain: &str) -> AppResult<()> {
        let path = self.path_for(domain);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                AppError::Store(StoreError::WriteFailed {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })
            })?;
            debug!("已清除凭据快照: {}", path.display());
        }
        Ok(())
    }
}

/// 从 URL 提取域名（无第三方 URL 解析，按需够用）
pub fn domain_of(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}
