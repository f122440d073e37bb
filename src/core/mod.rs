//! 核心编排层：状态模型与编解码、消息信封、转移图、编排器、对话循环、会话监管、构建器

pub mod builder;
pub mod codec;
pub mod conversation;
pub mod error;
pub mod graph;
pub mod message;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use builder::{create_llm_from_config, create_search_from_config, CrewBuilder, Provider};
pub use codec::{decode_state, encode_state, STATE_FENCE_TAG};
pub use conversation::{Conversation, ConversationReport, Outcome};
pub use error::{step_label, AgentError};
pub use graph::TransitionGraph;
pub use message::{latest_state, Body, Message, USER_SENDER};
pub use orchestrator::{dispatch, Orchestrator, Route};
pub use session_supervisor::SessionSupervisor;
pub use state::{State, Step};
