//! 能力适配器 - 业务能力层
//!
//! 每个适配器把一个远程界面（Gemini 聊天、Flow 视频生成器、OpenAI 兼容 API）
//! 封装成统一的"提交 → 等待 → 取结果"能力，不关心流程顺序，
//! 也不做跨阶段的重试（那是重试控制器的职责）。

pub mod api_text;
pub mod flow_video;
pub mod gemini;

pub use api_text::ApiTextAdapter;
pub use flow_video::FlowVideoAdapter;
pub use gemini::GeminiChatAdapter;

use crate::browser::Session;
use crate::error::AppResult;
use async_trait::async_trait;

/// 一次提交请求
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// 提示词正文
    pub prompt: String,
    /// 附件文件路径（源视频等）
    pub attachments: Vec<String>,
    pub options: SubmitOptions,
}

/// 提交选项（各界面按需取用，不认识的忽略）
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// 继续已有远程会话（Gemini 对话链接）
    pub conversation_url: Option<String>,
    /// 画幅比例（视频界面用）
    pub aspect_ratio: Option<String>,
    /// 每条提示词的输出数量（视频界面用）
    pub outputs_per_prompt: Option<u32>,
    /// 生成档位（如 VEO3 ULTRA）
    pub veo_profile: Option<String>,
}

impl SubmitRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, url: Option<String>) -> Self {
        self.options.conversation_url = url;
        self
    }

    pub fn with_attachment(mut self, path: impl Into<String>) -> Self {
        self.attachments.push(path.into());
        self
    }
}

/// 一次提交的产出
#[derive(Debug, Clone)]
pub enum SubmitOutput {
    /// 文本响应（聊天界面 / API）
    Text {
        text: String,
        /// 本次对话的远程链接，供后续阶段复用上下文
        conversation_url: Option<String>,
    },
    /// 媒体产物（视频生成界面）
    Media {
        url: Option<String>,
        duration_secs: Option<f64>,
    },
}

impl SubmitOutput {
    /// 取文本内容，媒体产出返回 None
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SubmitOutput::Text { text, .. } => Some(text),
            SubmitOutput::Media { .. } => None,
        }
    }
}

/// 统一的远程界面能力
///
/// submit 内部允许做"一次"界面级的补救（如空响应后重新提交一次），
/// 但有界重试的预算始终归外层重试控制器所有。
#[async_trait]
pub trait CapabilityAdapter: Send + Sync {
    /// 界面名称（日志与错误信息用）
    fn surface_name(&self) -> &str;

    async fn submit(&self, session: &Session, request: SubmitRequest) -> AppResult<SubmitOutput>;
}
