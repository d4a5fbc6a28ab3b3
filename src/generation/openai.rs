//! 对话补全生成器
//!
//! 面向任意 OpenAI 兼容端点（base_url 可配），DeepSeek 作为预设端点提供。
//! 只取首条 choice 的文本；空回复视为 Malformed。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::generation::prompts::{system_prompt, user_prompt};
use crate::generation::{GenerationError, GenerationRequest, GenerationService};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    /// `base_url` 为 None 时使用 async-openai 的默认端点
    pub fn new(base_url: Option<&str>, model: impl Into<String>, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    /// DeepSeek 预设：固定 base_url，模型缺省为 deepseek-chat
    pub fn deepseek(model: Option<&str>, api_key: &str) -> Self {
        Self::new(
            Some(DEEPSEEK_BASE_URL),
            model.unwrap_or(DEEPSEEK_CHAT),
            api_key,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, GenerationError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt().to_string())
            .build()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt(request))
            .build()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

/// 将 API 错误归类：限流 / 配额为 QuotaExceeded，其余视为不可用
fn classify(err: &str) -> GenerationError {
    let lower = err.to_lowercase();
    if lower.contains("quota") || lower.contains("rate limit") || lower.contains("429") {
        GenerationError::QuotaExceeded
    } else {
        GenerationError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.build_messages(request)?)
            .build()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| classify(&e.to_string()))?;

        let tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GenerationError::Malformed("empty completion".to_string()))?;

        tracing::debug!(kind = %request.kind, model = %self.model, tokens, "Generation completed");
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepseek_preset_defaults_model() {
        let generator = OpenAiGenerator::deepseek(None, "sk-test");
        assert_eq!(generator.model(), DEEPSEEK_CHAT);
        assert_eq!(generator.name(), DEEPSEEK_CHAT);

        let generator = OpenAiGenerator::deepseek(Some("deepseek-reasoner"), "sk-test");
        assert_eq!(generator.model(), "deepseek-reasoner");
    }

    #[test]
    fn test_classify_quota_errors() {
        assert_eq!(
            classify("HTTP 429 Too Many Requests"),
            GenerationError::QuotaExceeded
        );
        assert_eq!(
            classify("You exceeded your current quota"),
            GenerationError::QuotaExceeded
        );
        assert!(matches!(
            classify("connection refused"),
            GenerationError::Unavailable(_)
        ));
    }
}
