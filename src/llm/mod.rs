//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与重试装饰器

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{ChatMessage, LlmClient, LlmError, Role};
