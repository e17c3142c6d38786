//! 会话池 - 基础设施层
//!
//! 按 id 管理隔离的自动化会话：acquire 幂等注册并返回句柄，
//! release/shutdown 负责销毁。会话本身是懒启动的，注册不产生浏览器进程。

use crate::browser::session::Session;
use crate::config::SessionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 会话池
pub struct SessionPool {
    config: SessionConfig,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionPool {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 按 id 获取会话：不存在则注册，存在则返回同一个
    pub async fn acquire(&self, id: &str) -> Session {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }
        debug!("[会话池] 注册会话: {}", id);
        let session = Session::new(id, self.config.clone());
        sessions.insert(id.to_string(), session.clone());
        session
    }

    /// 归还会话
    ///
    /// full_teardown 为 true 时销毁浏览器并移除注册项；为 false 时只换页面，
    /// 浏览器与注册项保留（条目之间的廉价复用）。
    pub async fn release(&self, id: &str, full_teardown: bool) {
        if full_teardown {
            let session = {
                let mut sessions = self.sessions.lock().await;
                sessions.remove(id)
            };
            if let Some(session) = session {
                session.teardown().await;
                debug!("[会话池] 已释放会话: {}", id);
            }
            return;
        }

        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(id).cloned()
        };
        if let Some(session) = session {
            if let Err(e) = session.soft_reset().await {
                warn!("[会话池] ⚠️ 软重置失败 ({}): {}", id, e);
            }
        }
    }

    /// 关闭池中所有会话
    pub async fn shutdown(&self) {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        if drained.is_empty() {
            return;
        }
        info!("[会话池] 🛑 关闭 {} 个会话", drained.len());
        for session in drained {
            session.teardown().await;
        }
    }
}
