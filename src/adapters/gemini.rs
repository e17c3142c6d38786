//! Gemini 聊天界面适配器 - 业务能力层
//!
//! 通过浏览器驱动 Gemini 网页聊天：提交提示词（可带视频附件）、
//! 等待回复生成完毕、抽取回复全文，并带回对话链接供后续阶段复用上下文。
//!
//! 界面没有任何官方接口，全部依赖 DOM 选择器，选择器集中放在常量区便于
//! 页面改版时统一更新。

use crate::adapters::{CapabilityAdapter, SubmitOutput, SubmitRequest};
use crate::browser::{domain_of, Session};
use crate::error::{AppError, AppResult, SurfaceError};
use crate::utils::logging::truncate_text;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

// ========== 页面选择器 ==========

const SEL_PROMPT_EDITOR: &str = "div.ql-editor[contenteditable='true']";
const SEL_SEND_BUTTON: &str = "button[aria-label*='Send'], button[aria-label*='发送']";
const SEL_STOP_BUTTON: &str = "button[aria-label*='Stop'], button[aria-label*='停止']";
const SEL_RESPONSE: &str = "message-content.model-response-text";
const SEL_FILE_INPUT: &str = "input[type='file']";
const SEL_LOGIN_EMAIL: &str = "input[type='email']";
const SEL_LOGIN_PASSWORD: &str = "input[type='password']";

/// Gemini 聊天适配器
pub struct GeminiChatAdapter {
    base_url: String,
    email: String,
    password: String,
    /// 等待回复生成完毕的上限
    completion_timeout: Duration,
}

impl GeminiChatAdapter {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            completion_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// 确保已登录：凭据快照回放失效时走一次交互式登录，成功后刷新快照
    async fn ensure_logged_in(&self, session: &Session, url: &str) -> AppResult<()> {
        let on_login_page = session
            .evaluate(format!(
                "document.querySelector({:?}) !== null",
                SEL_LOGIN_EMAIL
            ))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !on_login_page {
            return Ok(());
        }

        if self.email.is_empty() || self.password.is_empty() {
            return Err(AppError::Surface(SurfaceError::MissingCredentials {
                surface: self.surface_name().to_string(),
            }));
        }

        info!("[Gemini] 🔑 凭据失效，执行交互式登录: {}", self.email);
        session.fill(SEL_LOGIN_EMAIL, &self.email).await?;
        session
            .evaluate("document.querySelector('#identifierNext button')?.click()")
            .await?;
        session
            .wait_for_selector(SEL_LOGIN_PASSWORD, Duration::from_secs(15))
            .await?;
        session.fill(SEL_LOGIN_PASSWORD, &self.password).await?;
        session
            .evaluate("document.querySelector('#passwordNext button')?.click()")
            .await?;

        // 登录重定向后编辑器出现即视为成功
        session
            .wait_for_selector(SEL_PROMPT_EDITOR, session.op_timeout())
            .await?;
        session.snapshot_credentials(&domain_of(url)).await?;
        info!("[Gemini] ✓ 登录成功，凭据快照已更新");
        Ok(())
    }

    /// 统计当前已有的回复条数（发送前取基线）
    async fn response_count(&self, session: &Session) -> AppResult<u64> {
        let count = session
            .evaluate(format!(
                "document.querySelectorAll({:?}).length",
                SEL_RESPONSE
            ))
            .await?
            .as_u64()
            .unwrap_or(0);
        Ok(count)
    }

    /// 发送一条提示词（不等待回复）
    async fn send_prompt(&self, session: &Session, request: &SubmitRequest) -> AppResult<()> {
        if !request.attachments.is_empty() {
            debug!("[Gemini] 上传 {} 个附件", request.attachments.len());
            session
                .upload_files(SEL_FILE_INPUT, &request.attachments)
                .await?;
            // 附件需要上传处理时间，过早发送会把半个附件发出去
            sleep(Duration::from_secs(5)).await;
        }

        session.fill(SEL_PROMPT_EDITOR, &request.prompt).await?;
        sleep(Duration::from_millis(500)).await;
        session.click(SEL_SEND_BUTTON).await?;
        Ok(())
    }

    /// 等待新回复生成完毕并抽取全文
    ///
    /// 完成判定：回复条数超过基线、停止按钮消失、文本连续两次轮询不再变化。
    async fn wait_and_extract(&self, session: &Session, baseline: u64) -> AppResult<String> {
        let started = Instant::now();
        let mut last_text = String::new();
        let mut stable_rounds = 0u32;

        loop {
            if started.elapsed() >= self.completion_timeout {
                return Err(AppError::Surface(SurfaceError::CompletionTimeout {
                    surface: self.surface_name().to_string(),
                    waited_secs: started.elapsed().as_secs(),
                }));
            }
            sleep(Duration::from_secs(2)).await;

            let count = self.response_count(session).await?;
            if count <= baseline {
                continue;
            }

            let generating = session
                .evaluate(format!(
                    "document.querySelector({:?}) !== null",
                    SEL_STOP_BUTTON
                ))
                .await?
                .as_bool()
                .unwrap_or(false);

            let text = session
                .evaluate(format!(
                    "(() => {{ const all = document.querySelectorAll({:?}); \
                       return all.length ? all[all.length - 1].textContent : ''; }})()",
                    SEL_RESPONSE
                ))
                .await?
                .as_str()
                .unwrap_or_default()
                .to_string();

            if generating {
                last_text = text;
                stable_rounds = 0;
                continue;
            }
            if !text.is_empty() && text == last_text {
                stable_rounds += 1;
                if stable_rounds >= 2 {
                    return Ok(text);
                }
            } else {
                last_text = text;
                stable_rounds = 0;
            }
        }
    }
}

#[async_trait]
impl CapabilityAdapter for GeminiChatAdapter {
    fn surface_name(&self) -> &str {
        "gemini"
    }

    async fn submit(&self, session: &Session, request: SubmitRequest) -> AppResult<SubmitOutput> {
        let url = request
            .options
            .conversation_url
            .clone()
            .unwrap_or_else(|| self.base_url.clone());

        info!(
            "[Gemini] 📨 提交提示词 ({} 字符)",
            request.prompt.chars().count()
        );
        session.goto(&url).await?;
        self.ensure_logged_in(session, &url).await?;
        session
            .wait_for_selector(SEL_PROMPT_EDITOR, session.op_timeout())
            .await?;

        let baseline = self.response_count(session).await?;
        self.send_prompt(session, &request).await?;

        let mut text = self.wait_and_extract(session, baseline).await?;

        // 界面偶发"已完成但正文为空"，界面级补救一次；预算仍归外层重试控制器
        if text.trim().is_empty() {
            warn!("[Gemini] ⚠️ 回复为空，重新提交一次");
            let baseline = self.response_count(session).await?;
            self.send_prompt(session, &request).await?;
            text = self.wait_and_extract(session, baseline).await?;
        }
        if text.trim().is_empty() {
            return Err(AppError::Surface(SurfaceError::EmptyResponse {
                surface: self.surface_name().to_string(),
            }));
        }

        // 记下对话链接，后续阶段在同一上下文里继续问
        let conversation_url = session.current_url().await?;
        session.snapshot_credentials(&domain_of(&url)).await?;

        info!(
            "[Gemini] ✓ 收到回复 ({} 字符): {}",
            text.chars().count(),
            truncate_text(&text, 80)
        );
        Ok(SubmitOutput::Text {
            text,
            conversation_url,
        })
    }
}
