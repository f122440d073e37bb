//! 消息信封：发送者 + 正文（普通文本或 State）
//!
//! 历史记录只以文本形式共享，State 必须能无损地转成文本再解回；
//! 无法解码的文本一律视为普通内容消息。

use crate::core::{decode_state, encode_state, State};

/// 人类用户的发送者名（种子消息使用）
pub const USER_SENDER: &str = "user";

/// 消息正文
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    State(State),
}

/// 对话中的单条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub body: Body,
}

impl Message {
    pub fn text(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            body: Body::Text(content.into()),
        }
    }

    pub fn state(from: impl Into<String>, state: State) -> Self {
        Self {
            from: from.into(),
            body: Body::State(state),
        }
    }

    /// 用户输入的原始任务文本
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(USER_SENDER, content)
    }

    /// 从传输文本还原：能解出 State 的是 State 消息，否则为普通文本
    pub fn from_text(from: impl Into<String>, text: &str) -> Self {
        match decode_state(text) {
            Some(state) => Self::state(from, state),
            None => Self::text(from, text),
        }
    }

    /// 转为传输文本（State 经 encode_state 编码）
    pub fn to_text(&self) -> String {
        match &self.body {
            Body::Text(content) => content.clone(),
            Body::State(state) => encode_state(state),
        }
    }

    pub fn as_state(&self) -> Option<&State> {
        match &self.body {
            Body::State(state) => Some(state),
            Body::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(content) => Some(content.as_str()),
            Body::State(_) => None,
        }
    }
}

/// 历史中最新的携带 State 的消息（即「当前」State）
pub fn latest_state(history: &[Message]) -> Option<&State> {
    history.iter().rev().find_map(Message::as_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_detects_state() {
        let state = State::RunCode {
            task: "sum".into(),
            code: "```python\nprint(2 + 3)\n```".into(),
        };
        let msg = Message::from_text("planner", &Message::state("planner", state.clone()).to_text());
        assert_eq!(msg.as_state(), Some(&state));
        assert_eq!(msg.from, "planner");
    }

    #[test]
    fn test_from_text_falls_back_to_plain_content() {
        let msg = Message::from_text(USER_SENDER, "print the sum of 2 and 3");
        assert_eq!(msg.as_text(), Some("print the sum of 2 and 3"));
        assert!(msg.as_state().is_none());
    }

    #[test]
    fn test_latest_state_skips_trailing_text() {
        let history = vec![
            Message::user("do something"),
            Message::state("planner", State::CreateTask { task: "first".into() }),
            Message::state(
                "coder",
                State::WriteCode {
                    task: "first".into(),
                    code: "print(1)".into(),
                },
            ),
            Message::user("by the way"),
        ];
        assert_eq!(latest_state(&history).map(State::step), Some(crate::core::Step::WriteCode));
        assert!(latest_state(&history[..1]).is_none());
    }
}
