//! 对话错误类型
//!
//! 除「普通文本无法解码为 State」外，所有内部失败都同步上抛给对话驱动方；
//! InvalidMessage / MissingField / IllegalTransition 表示编排缺陷，直接终止对话。

use thiserror::Error;

use crate::actors::ActorKind;
use crate::core::Step;
use crate::llm::LlmError;
use crate::runtime::RuntimeError;
use crate::search::SearchError;

/// 对话运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 调用某个 Actor 时，历史中的最新 State 不在它接受的阶段内
    #[error("Invalid message type for {actor}: latest state is {found}")]
    InvalidMessage { actor: ActorKind, found: String },

    #[error("State {step} is missing required field `{field}`")]
    MissingField { step: Step, field: &'static str },

    /// Actor 产出了转移图不允许的 State
    #[error("Illegal transition by {actor}: {from} -> {to}")]
    IllegalTransition {
        actor: ActorKind,
        from: String,
        to: String,
    },

    /// Actor 产出的 State 缺少必填字段
    #[error("{actor} produced {step} without required field `{field}`")]
    IncompleteOutput {
        actor: ActorKind,
        step: Step,
        field: &'static str,
    },

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),

    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 构造 InvalidMessage；step 为 None 表示历史中没有 State
    pub fn invalid_message(actor: ActorKind, step: Option<Step>) -> Self {
        AgentError::InvalidMessage {
            actor,
            found: step_label(step),
        }
    }
}

/// Step 的展示名，None 显示为 absent
pub fn step_label(step: Option<Step>) -> String {
    step.map(|s| s.to_string())
        .unwrap_or_else(|| "absent".to_string())
}
