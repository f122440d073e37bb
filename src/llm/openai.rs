//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient, LlmError, Role};

/// 限流时默认的建议等待时长
const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 1000;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 ChatMessage 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// HTTP 层请求超时（秒）；0 表示不设超时
    request_timeout_secs: u64,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout_secs: 0,
            usage: TokenUsage::new(),
        }
    }

    /// 为 HTTP 请求设置超时；超时错误会带上这里的秒数
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        if secs == 0 {
            return self;
        }
        match reqwest::Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()
        {
            Ok(http) => {
                self.client = self.client.with_http_client(http);
                self.request_timeout_secs = secs;
            }
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with timeout, keeping default: {}", e)
            }
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| map_openai_error(e, self.request_timeout_secs))
            })
            .collect()
    }
}

/// async_openai 错误 -> LlmError（区分可重试的网络/超时/限流）
fn map_openai_error(err: OpenAIError, timeout_secs: u64) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout(timeout_secs),
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        OpenAIError::ApiError(api) => {
            let message = api.message.clone();
            if message.to_lowercase().contains("rate limit") {
                LlmError::RateLimited {
                    retry_after_ms: DEFAULT_RATE_LIMIT_WAIT_MS,
                }
            } else {
                LlmError::Api(message)
            }
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
        other => LlmError::Api(other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| map_openai_error(e, self.request_timeout_secs))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| map_openai_error(e, self.request_timeout_secs))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 2);
        assert_eq!(usage.get(), (11, 7, 18));
    }

    #[test]
    fn test_invalid_argument_is_not_retryable() {
        let err = map_openai_error(OpenAIError::InvalidArgument("bad model".into()), 60);
        assert_eq!(err, LlmError::InvalidRequest("bad model".into()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_timeout_reports_configured_seconds() {
        // 接受连接但从不回应的本地端点
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let base_url = format!("http://{addr}/v1");
        let client =
            OpenAiClient::new(Some(&base_url), "gpt-4o-mini", "sk-test").with_request_timeout(1);
        let result = tokio::time::timeout(
            Duration::from_secs(20),
            client.complete(&[ChatMessage::user("hi")]),
        )
        .await
        .expect("client should give up on its own");
        let err = result.unwrap_err();
        assert_eq!(err, LlmError::Timeout(1));
        assert_eq!(err.to_string(), "Request timed out after 1s");
    }
}
