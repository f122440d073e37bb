//! Codecrew - 多智能体编程小组
//!
//! 把自由文本任务交给一组 Actor 协作完成：归纳任务、写代码、审查、执行、失败后修复或检索方案。
//!
//! 模块划分：
//! - **actors**: Planner / Coder / Reviewer / Runner / WebSearch 与 Crew
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: State 模型与编解码、消息、转移图、编排器、对话循环、会话监管、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与重试
//! - **observability**: 日志初始化
//! - **runtime**: 代码块提取与多语言持久会话执行
//! - **search**: Web 搜索后端（Bing）

pub mod actors;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod runtime;
pub mod search;

pub use crate::actors::{Actor, ActorKind, Crew};
pub use crate::core::{
    AgentError, Conversation, ConversationReport, CrewBuilder, Message, Outcome, State, Step,
};
