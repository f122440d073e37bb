//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 两种模式：按顺序返回预置回复（scripted），或用闭包根据 prompt 生成回复（responder）。
//! 记录收到的每个 prompt（最后一条消息内容），便于断言调用次数与内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient, LlmError};

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Mock 客户端
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// 依次返回给定回复；用完后返回 Api 错误
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 依次返回给定结果（可包含错误）
    pub fn scripted_results(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            scripted: Mutex::new(replies.into_iter().collect()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 用闭包生成回复；预置回复优先
    pub fn responder(f: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的 prompt
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }

        let next = self.scripted.lock().ok().and_then(|mut q| q.pop_front());
        match (next, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(f)) => f(&prompt),
            (None, None) => Err(LlmError::Api("mock has no scripted reply left".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mock = MockLlmClient::scripted(["first", "second"]);
        let msgs = [ChatMessage::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "second");
        assert!(mock.complete(&msgs).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_responder_sees_prompt() {
        let mock = MockLlmClient::responder(|p| Ok(format!("echo: {p}")));
        let reply = mock.complete(&[ChatMessage::user("ping")]).await.unwrap();
        assert_eq!(reply, "echo: ping");
        assert_eq!(mock.prompts(), vec!["ping".to_string()]);
    }
}
