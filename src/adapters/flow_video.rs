//! Flow 视频生成界面适配器 - 业务能力层
//!
//! 驱动 Flow（VEO 视频生成器）网页：填入场景提示词、按需调整画幅与
//! 输出数量、点击生成、轮询直到视频元素就绪，带回视频地址与实测时长。
//! 时长由页面 video 元素直接读出，是否达标由上层的后置条件检查判定。

use crate::adapters::{CapabilityAdapter, SubmitOutput, SubmitRequest};
use crate::browser::Session;
use crate::error::{AppError, AppResult, SurfaceError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

// ========== 页面选择器 ==========

const SEL_PROMPT_INPUT: &str = "textarea#PINHOLE_TEXT_AREA_ELEMENT_ID, textarea";
const SEL_GENERATE_BUTTON: &str = "button[type='submit'], button[aria-label*='Generate']";
const SEL_SETTINGS_BUTTON: &str = "button[aria-label*='Settings'], button[aria-label*='设置']";
const SEL_VIDEO: &str = "video[src]";

/// Flow 视频生成适配器
pub struct FlowVideoAdapter {
    base_url: String,
    /// 等待生成完毕的上限（视频生成远慢于文本）
    completion_timeout: Duration,
}

impl FlowVideoAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            completion_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// 按需调整生成设置（画幅、输出数量、档位）
    ///
    /// 设置面板不存在或某项找不到时静默跳过，沿用界面默认值。
    async fn apply_settings(&self, session: &Session, request: &SubmitRequest) -> AppResult<()> {
        let opts = &request.options;
        if opts.aspect_ratio.is_none() && opts.outputs_per_prompt.is_none() && opts.veo_profile.is_none() {
            return Ok(());
        }

        let opened = session
            .evaluate(format!(
                "(() => {{ const b = document.querySelector({:?}); if (b) {{ b.click(); return true; }} return false; }})()",
                SEL_SETTINGS_BUTTON
            ))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !opened {
            debug!("[Flow] 设置面板不可用，沿用默认设置");
            return Ok(());
        }
        sleep(Duration::from_millis(500)).await;

        if let Some(ratio) = &opts.aspect_ratio {
            self.pick_menu_option(session, ratio).await?;
        }
        if let Some(profile) = &opts.veo_profile {
            self.pick_menu_option(session, profile).await?;
        }
        if let Some(n) = opts.outputs_per_prompt {
            self.pick_menu_option(session, &n.to_string()).await?;
        }

        // 关闭面板
        session.evaluate("document.body.click()").await?;
        sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    /// 在打开的设置面板里按可见文本点选某一项
    async fn pick_menu_option(&self, session: &Session, label: &str) -> AppResult<()> {
        let picked = session
            .evaluate(format!(
                "(() => {{ const items = [...document.querySelectorAll('[role=\"option\"], [role=\"menuitem\"], li')]; \
                   const hit = items.find(el => el.textContent.trim().includes({:?})); \
                   if (hit) {{ hit.click(); return true; }} return false; }})()",
                label
            ))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !picked {
            debug!("[Flow] 未找到设置项 '{}'，跳过", label);
        } else {
            sleep(Duration::from_millis(300)).await;
        }
        Ok(())
    }

    /// 轮询直到新视频就绪，返回 (地址, 时长)
    async fn wait_for_video(
        &self,
        session: &Session,
        baseline: u64,
    ) -> AppResult<(Option<String>, Option<f64>)> {
        let started = Instant::now();
        loop {
            if started.elapsed() >= self.completion_timeout {
                return Err(AppError::Surface(SurfaceError::CompletionTimeout {
                    surface: self.surface_name().to_string(),
                    waited_secs: started.elapsed().as_secs(),
                }));
            }
            sleep(Duration::from_secs(5)).await;

            // 取最新一个已能读出时长的视频元素
            let probe = session
                .evaluate(format!(
                    "(() => {{ const vids = [...document.querySelectorAll({:?})]; \
                       if (vids.length <= {}) return null; \
                       const v = vids[vids.length - 1]; \
                       if (!v.duration || isNaN(v.duration)) return null; \
                       return {{ url: v.src, duration: v.duration }}; }})()",
                    SEL_VIDEO, baseline
                ))
                .await?;

            if probe.is_null() {
                continue;
            }
            let url = probe
                .get("url")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let duration = probe.get("duration").and_then(|v| v.as_f64());
            return Ok((url, duration));
        }
    }
}

#[async_trait]
impl CapabilityAdapter for FlowVideoAdapter {
    fn surface_name(&self) -> &str {
        "flow"
    }

    async fn submit(&self, session: &Session, request: SubmitRequest) -> AppResult<SubmitOutput> {
        info!("[Flow] 🎬 提交视频提示词 ({} 字符)", request.prompt.len());
        session.goto(&self.base_url).await?;
        session
            .wait_for_selector(SEL_PROMPT_INPUT, session.op_timeout())
            .await?;

        self.apply_settings(session, &request).await?;

        let baseline = session
            .evaluate(format!(
                "document.querySelectorAll({:?}).length",
                SEL_VIDEO
            ))
            .await?
            .as_u64()
            .unwrap_or(0);

        session.fill(SEL_PROMPT_INPUT, &request.prompt).await?;
        sleep(Duration::from_millis(500)).await;
        session.click(SEL_GENERATE_BUTTON).await?;

        let (url, duration_secs) = self.wait_for_video(session, baseline).await?;
        info!(
            "[Flow] ✓ 视频就绪 (时长: {})",
            duration_secs
                .map(|d| format!("{:.1}s", d))
                .unwrap_or_else(|| "未知".to_string())
        );
        Ok(SubmitOutput::Media { url, duration_secs })
    }
}
