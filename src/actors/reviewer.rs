//! Reviewer：按安全与质量清单审查代码
//!
//! 输入 WriteCode，输出 ReviewCode（comment 为模型原样回复；空回复按未通过处理，换成 [`EMPTY_REVIEW`]）。
//! 通过与否由 Planner 用 [`is_approval`] 判定。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actors::{ask_llm, current_state, Actor, ActorKind};
use crate::core::{AgentError, Message, State};
use crate::llm::LlmClient;

/// 审查通过时模型应回复的短语（大小写不敏感的子串匹配）
pub const APPROVAL_PHRASE: &str = "the code is good";

/// 模型没有给出任何审查意见时使用的意见
pub const EMPTY_REVIEW: &str =
    "The review returned no feedback. Re-check the code against the rules: no security vulnerabilities, nothing that might break the system, print the result, pip install blocks first.";

/// 审查意见是否表示通过
pub fn is_approval(comment: &str) -> bool {
    comment.to_lowercase().contains(APPROVAL_PHRASE)
}

/// 规范化审查意见：空白回复视为未通过
pub fn review_comment(reply: &str) -> String {
    if reply.trim().is_empty() {
        EMPTY_REVIEW.to_string()
    } else {
        reply.to_string()
    }
}

fn review_prompt(code: &str) -> String {
    format!(
        r#"### Code
{code}

Review the code above to determine if the code
- have security vulnerabilities
- might break the system
- print the result of the code
- pip install block not comes first

If the code is good, simply say 'The code is good' without anything else. Otherwise, suggest how to improve the code."#
    )
}

pub struct Reviewer {
    name: String,
    llm: Arc<dyn LlmClient>,
}

impl Reviewer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: ActorKind::Reviewer.as_str().to_string(),
            llm,
        }
    }
}

#[async_trait]
impl Actor for Reviewer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Reviewer
    }

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError> {
        let state = current_state(self.kind(), history)?;
        let State::WriteCode { task, code } = state else {
            return Err(AgentError::invalid_message(self.kind(), Some(state.step())));
        };

        let reply = ask_llm(self.llm.as_ref(), review_prompt(code)).await?;
        if reply.trim().is_empty() {
            tracing::warn!("reviewer: empty review, treating as rejection");
        }
        let comment = review_comment(&reply);
        Ok(Message::state(
            self.name.as_str(),
            State::ReviewCode {
                task: task.clone(),
                code: code.clone(),
                comment,
            },
        ))
    }
}
