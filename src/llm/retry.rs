//! 带超时与有界重试的 LLM 客户端装饰器
//!
//! 每次调用施加请求超时；仅对可重试错误（网络 / 超时 / 限流）做指数退避重试。
//! max_retries = 0 时只调用一次，失败直接上抛。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};

use crate::config::LlmSection;
use crate::llm::{ChatMessage, LlmClient, LlmError};

/// 重试参数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 单次请求超时
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn from_config(llm: &LlmSection) -> Self {
        Self {
            max_retries: llm.retry.max_retries,
            initial_backoff: Duration::from_millis(llm.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(llm.retry.max_backoff_ms),
            request_timeout: Duration::from_secs(llm.timeouts.request),
        }
    }
}

/// 重试装饰器
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn attempt(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        match timeout(self.config.request_timeout, self.inner.complete(messages)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.config.request_timeout.as_secs())),
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            match self.attempt(messages).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let wait = match &e {
                        LlmError::RateLimited { retry_after_ms } => {
                            backoff.max(Duration::from_millis(*retry_after_ms))
                        }
                        _ => backoff,
                    };
                    tracing::warn!(
                        "LLM call failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        self.config.max_retries,
                        wait
                    );
                    sleep(wait).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
