//! Actor：无状态的消息变换器
//!
//! 每个 Actor 只接受特定的输入阶段（历史中最新 State 的 step），
//! 读取完整历史后产出一条新的携带 State 的消息。输入阶段不匹配或必填字段为空时
//! 返回 InvalidMessage / MissingField，属于编排缺陷，不重试。

pub mod coder;
pub mod planner;
pub mod reviewer;
pub mod runner;
pub mod web_search;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{latest_state, AgentError, Message, State, Step};
use crate::llm::{ChatMessage, LlmClient};

pub use coder::Coder;
pub use planner::Planner;
pub use reviewer::{is_approval, review_comment, Reviewer, APPROVAL_PHRASE, EMPTY_REVIEW};
pub use runner::Runner;
pub use web_search::WebSearch;

/// Actor 种类（编排器的路由目标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Planner,
    Coder,
    Reviewer,
    Runner,
    WebSearch,
}

impl ActorKind {
    pub const ALL: [ActorKind; 5] = [
        ActorKind::Planner,
        ActorKind::Coder,
        ActorKind::Reviewer,
        ActorKind::Runner,
        ActorKind::WebSearch,
    ];

    /// 默认的发送者名
    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::Planner => "planner",
            ActorKind::Coder => "coder",
            ActorKind::Reviewer => "reviewer",
            ActorKind::Runner => "runner",
            ActorKind::WebSearch => "web-search",
        }
    }

    /// 该 Actor 接受的输入阶段；None 表示历史中没有 State
    pub fn accepts(self, step: Option<Step>) -> bool {
        match self {
            ActorKind::Planner => matches!(
                step,
                None | Some(Step::Succeeded)
                    | Some(Step::NotATask)
                    | Some(Step::ReviewCode)
                    | Some(Step::RunCodeResult)
            ),
            ActorKind::Coder => matches!(
                step,
                Some(Step::CreateTask)
                    | Some(Step::FixCodeError)
                    | Some(Step::FixComment)
                    | Some(Step::ImproveCode)
                    | Some(Step::SearchSolutionResult)
            ),
            ActorKind::Reviewer => step == Some(Step::WriteCode),
            ActorKind::Runner => step == Some(Step::RunCode),
            ActorKind::WebSearch => step == Some(Step::SearchSolution),
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actor 能力：读取历史，产出一条新消息
#[async_trait]
pub trait Actor: Send + Sync {
    /// 发送者名（写入消息的 from）
    fn name(&self) -> &str;

    fn kind(&self) -> ActorKind;

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError>;

    /// 释放持有的外部资源（对话结束时调用）
    async fn release(&self) {}
}

/// 取出当前 State 并校验：step 必须被 kind 接受，且该 step 的必填字段非空
pub(crate) fn current_state(kind: ActorKind, history: &[Message]) -> Result<&State, AgentError> {
    let state = latest_state(history);
    let step = state.map(State::step);
    match state {
        Some(state) if kind.accepts(step) => {
            if let Some(field) = state.missing_field() {
                return Err(AgentError::MissingField {
                    step: state.step(),
                    field,
                });
            }
            Ok(state)
        }
        _ => Err(AgentError::invalid_message(kind, step)),
    }
}

/// 以单条 user 消息调用模型
pub(crate) async fn ask_llm(llm: &dyn LlmClient, prompt: String) -> Result<String, AgentError> {
    tracing::debug!(prompt_chars = prompt.chars().count(), "llm request");
    let reply = llm.complete(&[ChatMessage::user(prompt)]).await?;
    Ok(reply)
}

/// 对话中的五个 Actor
#[derive(Clone)]
pub struct Crew {
    pub planner: Arc<dyn Actor>,
    pub coder: Arc<dyn Actor>,
    pub reviewer: Arc<dyn Actor>,
    pub runner: Arc<dyn Actor>,
    pub web_search: Arc<dyn Actor>,
    /// 四个 LLM Actor 共用的客户端，用于对话结束时汇报 token 用量
    pub llm: Option<Arc<dyn LlmClient>>,
}

impl Crew {
    pub fn get(&self, kind: ActorKind) -> &Arc<dyn Actor> {
        match kind {
            ActorKind::Planner => &self.planner,
            ActorKind::Coder => &self.coder,
            ActorKind::Reviewer => &self.reviewer,
            ActorKind::Runner => &self.runner,
            ActorKind::WebSearch => &self.web_search,
        }
    }

    /// 释放所有 Actor 持有的资源
    pub async fn release(&self) {
        for kind in ActorKind::ALL {
            self.get(kind).release().await;
        }
    }

    /// 共享客户端的累计 token 用量 (prompt, completion, total)
    pub fn token_usage(&self) -> Option<(u64, u64, u64)> {
        self.llm.as_ref().map(|llm| llm.token_usage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_step_accepted_by_exactly_one_actor() {
        for step in Step::ALL {
            let accepting: Vec<_> = ActorKind::ALL
                .iter()
                .filter(|k| k.accepts(Some(step)))
                .collect();
            assert_eq!(accepting.len(), 1, "step {step} accepted by {accepting:?}");
        }
        assert!(ActorKind::Planner.accepts(None));
    }

    #[test]
    fn test_current_state_checks_step_and_fields() {
        let history = vec![Message::state(
            "planner",
            State::RunCode {
                task: "t".into(),
                code: "  ".into(),
            },
        )];
        assert!(matches!(
            current_state(ActorKind::Runner, &history),
            Err(AgentError::MissingField { step: Step::RunCode, field: "code" })
        ));
        assert!(matches!(
            current_state(ActorKind::Coder, &history),
            Err(AgentError::InvalidMessage { actor: ActorKind::Coder, .. })
        ));
        assert!(matches!(
            current_state(ActorKind::Runner, &[Message::user("hi")]),
            Err(AgentError::InvalidMessage { .. })
        ));
    }
}
