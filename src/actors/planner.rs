//! Planner：状态机的推进者
//!
//! - 无 State / Succeeded / NotATask + 用户文本：请模型归纳任务，产出 CreateTask 或 NotATask
//! - ReviewCode：按审查意见产出 RunCode（通过）或 FixComment（携带原样意见）
//! - RunCodeResult：请模型判断执行记录是否完成任务，产出 Succeeded 或 FixCodeError

use std::sync::Arc;

use async_trait::async_trait;

use crate::actors::{ask_llm, current_state, is_approval, review_comment, Actor, ActorKind};
use crate::core::{latest_state, AgentError, Message, State};
use crate::llm::LlmClient;

const NOT_A_TASK_PHRASE: &str = "i can't help with that";
const EXECUTION_FAILED_PHRASE: &str = "code execution failed";

fn summarize_prompt(question: &str) -> String {
    format!(
        r#"summarize the task from user question, if it's not a question, say 'I can't help with that'.

```question
{question}
```"#
    )
}

fn judge_prompt(task: &str, run_result: &str) -> String {
    format!(
        r#"You are a helpful assistant agent, you generate the final answer based on the code execution result.

Here is the task:
{task}

Here is the code execution result:
{run_result}

If the code execute successfully, please generate the final answer. Otherwise, say 'code execution failed'."#
    )
}

/// 小写并统一弯引号，便于短语匹配
fn normalize(reply: &str) -> String {
    reply.to_lowercase().replace('\u{2019}', "'")
}

pub struct Planner {
    name: String,
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: ActorKind::Planner.as_str().to_string(),
            llm,
        }
    }

    async fn new_task(&self, history: &[Message]) -> Result<State, AgentError> {
        let Some(question) = history.last().and_then(Message::as_text) else {
            return Err(AgentError::invalid_message(
                self.kind(),
                latest_state(history).map(State::step),
            ));
        };

        let reply = ask_llm(self.llm.as_ref(), summarize_prompt(question)).await?;
        if normalize(&reply).contains(NOT_A_TASK_PHRASE) {
            tracing::info!("planner: input is not a task");
            return Ok(State::NotATask { task: None });
        }

        let summary = reply.trim();
        let task = if summary.is_empty() { question.trim() } else { summary };
        Ok(State::CreateTask {
            task: task.to_string(),
        })
    }

    async fn judge_run(&self, task: &str, code: &str, run_result: &str) -> Result<State, AgentError> {
        let reply = ask_llm(self.llm.as_ref(), judge_prompt(task, run_result)).await?;
        if normalize(&reply).contains(EXECUTION_FAILED_PHRASE) {
            return Ok(State::FixCodeError {
                task: task.to_string(),
                code: code.to_string(),
                error: run_result.to_string(),
            });
        }
        let answer = if reply.trim().is_empty() {
            run_result.to_string()
        } else {
            reply
        };
        Ok(State::Succeeded {
            task: task.to_string(),
            code: code.to_string(),
            run_result: run_result.to_string(),
            answer,
        })
    }
}

/// 审查结论 -> 下一 State；不调用模型
fn review_outcome(task: &str, code: &str, comment: &str) -> State {
    if is_approval(comment) {
        State::RunCode {
            task: task.to_string(),
            code: code.to_string(),
        }
    } else {
        State::FixComment {
            task: task.to_string(),
            code: code.to_string(),
            comment: review_comment(comment),
        }
    }
}

#[async_trait]
impl Actor for Planner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Planner
    }

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError> {
        let next = match latest_state(history) {
            None | Some(State::Succeeded { .. }) | Some(State::NotATask { .. }) => {
                self.new_task(history).await?
            }
            Some(_) => match current_state(self.kind(), history)? {
                State::ReviewCode {
                    task,
                    code,
                    comment,
                } => review_outcome(task, code, comment),
                State::RunCodeResult {
                    task,
                    code,
                    run_result,
                } => self.judge_run(task, code, run_result).await?,
                other => {
                    return Err(AgentError::invalid_message(self.kind(), Some(other.step())));
                }
            },
        };
        Ok(Message::state(self.name.as_str(), next))
    }
}
