//! API 文本适配器 - 业务能力层
//!
//! 文本阶段的非浏览器替代路径：走 OpenAI 兼容的聊天接口。
//! 没有附件与对话链接的概念，跨阶段上下文由上层把前序输出拼进提示词解决。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use crate::adapters::{CapabilityAdapter, SubmitOutput, SubmitRequest};
use crate::browser::Session;
use crate::config::Config;
use crate::error::{AppError, AppResult, SurfaceError};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// OpenAI 兼容接口的文本适配器
pub struct ApiTextAdapter {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl ApiTextAdapter {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for ApiTextAdapter {
    fn surface_name(&self) -> &str {
        "llm_api"
    }

    async fn submit(&self, _session: &Session, request: SubmitRequest) -> AppResult<SubmitOutput> {
        if !request.attachments.is_empty() {
            // 接口路径不支持视频附件，必须由调用方保证走浏览器适配器
            return Err(AppError::Other(
                "API 文本适配器不支持附件，视频分析请走浏览器路径".to_string(),
            ));
        }

        debug!(
            "调用 LLM API，模型: {}，消息长度: {} 字符",
            self.model_name,
            request.prompt.len()
        );

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()
            .map_err(|e| AppError::Surface(SurfaceError::ApiCallFailed {
                model: self.model_name.clone(),
                source: Box::new(e),
            }))?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(0.7)
            .build()
            .map_err(|e| AppError::Surface(SurfaceError::ApiCallFailed {
                model: self.model_name.clone(),
                source: Box::new(e),
            }))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::Surface(SurfaceError::ApiCallFailed {
                model: self.model_name.clone(),
                source: Box::new(e),
            })
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::Surface(SurfaceError::EmptyResponse {
                    surface: "llm_api".to_string(),
                })
            })?;

        debug!("LLM API 调用成功，响应 {} 字符", content.len());
        Ok(SubmitOutput::Text {
            text: content.trim().to_string(),
            conversation_url: None,
        })
    }
}
