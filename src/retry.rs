//! 重试控制器
//!
//! 有界重试 + 失败后按需重置会话。所有"可能抖动"的外部操作
//! （页面自动化、下载、接口调用）都经这里包裹，失败语义统一为
//! StageError::RetryExhausted，并保留最后一次的底层错误。

use crate::browser::Session;
use crate::config::RetryPolicy;
use crate::error::{AppError, AppResult};
use std::future::Future;
use tokio::time::sleep;
use tracing::{info, warn};

/// 两次尝试之间对会话做什么
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// 不碰会话（无会话参与的操作）
    None,
    /// 换页面，浏览器保留
    Soft,
    /// 销毁浏览器，下次操作惰性重启
    Full,
}

/// 执行 op，最多 policy.max_attempts 次
///
/// - 每次失败后 sleep policy.delay 再重试
/// - 第二次及以后的尝试前按 reset 重置会话
/// - 全部失败 → RetryExhausted，携带阶段名、次数与最后一次错误
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    session: Option<&Session>,
    reset: ResetKind,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_err: Option<AppError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            if let Some(session) = session {
                match reset {
                    ResetKind::None => {}
                    ResetKind::Soft => {
                        if let Err(e) = session.soft_reset().await {
                            warn!("[{}] ⚠️ 软重置失败，继续重试: {}", name, e);
                        }
                    }
                    ResetKind::Full => session.teardown().await,
                }
            }
            info!("[{}] 🔁 第 {}/{} 次尝试", name, attempt, max_attempts);
        }

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("[{}] ✓ 重试后成功（第 {} 次）", name, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(
                    "[{}] ❌ 第 {}/{} 次尝试失败: {}",
                    name, attempt, max_attempts, e
                );
                last_err = Some(e);
                if attempt < max_attempts {
                    sleep(policy.delay).await;
                }
            }
        }
    }

    let source = match last_err {
        Some(e) => anyhow::Error::new(e),
        None => anyhow::anyhow!("未执行任何尝试"),
    };
    Err(AppError::retry_exhausted(name, max_attempts, source))
}
