//! 对话循环：编排器 + Actor 逐轮推进，直到终止态或轮数上限
//!
//! 每轮：检查取消 -> 询问编排器 -> 检查轮数上限 -> 以完整历史调用 Actor（可被取消）
//! -> 按转移图校验产出的 State -> 追加到历史并交给调用方。
//! 历史只由循环追加；同一时刻只有一个 Actor 在运行。
//! 循环结束（含出错与取消）时释放 Crew 持有的运行时会话。

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::actors::Crew;
use crate::core::{
    latest_state, step_label, AgentError, Message, Orchestrator, Route, State, TransitionGraph,
};

/// 对话的三种正常结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 任务完成，answer 为最终回答
    Succeeded { answer: String },
    /// 输入不是可以用代码解决的任务
    NotATask,
    /// 轮数耗尽仍未到达终止态
    Exhausted { rounds: usize },
}

impl Outcome {
    /// 由最后一条消息判定结局；不是终止态时为 Exhausted
    pub fn from_last(last: Option<&Message>, rounds: usize) -> Self {
        match last.and_then(Message::as_state) {
            Some(State::Succeeded { answer, .. }) => Outcome::Succeeded {
                answer: answer.clone(),
            },
            Some(State::NotATask { .. }) => Outcome::NotATask,
            _ => Outcome::Exhausted { rounds },
        }
    }

    /// CLI 退出码：0 成功，2 非任务，3 轮数耗尽
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Succeeded { .. } => 0,
            Outcome::NotATask => 2,
            Outcome::Exhausted { .. } => 3,
        }
    }
}

/// 完整运行的结果：结局 + 全部历史（含种子消息）
#[derive(Debug, Clone)]
pub struct ConversationReport {
    pub outcome: Outcome,
    pub history: Vec<Message>,
}

/// 一次对话
pub struct Conversation {
    crew: Crew,
    orchestrator: Orchestrator,
    graph: TransitionGraph,
    max_rounds: usize,
    cancel: CancellationToken,
}

impl Conversation {
    pub fn new(crew: Crew, max_rounds: usize) -> Self {
        Self {
            crew,
            orchestrator: Orchestrator::new(),
            graph: TransitionGraph::new(),
            max_rounds,
            cancel: CancellationToken::new(),
        }
    }

    /// 使用外部取消令牌（如 SessionSupervisor 的子 token）
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 以消息流形式运行；出错时先产出该错误再结束
    ///
    /// 流被提前丢弃时不会主动释放运行时，由会话进程的 kill_on_drop 兜底。
    pub fn run(self, seed: Vec<Message>) -> BoxStream<'static, Result<Message, AgentError>> {
        stream::unfold(Driver::new(self, seed), |mut driver| async move {
            if driver.finished {
                return None;
            }
            match driver.step().await {
                Ok(Some(message)) => Some((Ok(message), driver)),
                Ok(None) => {
                    driver.finish().await;
                    None
                }
                Err(e) => {
                    driver.finish().await;
                    Some((Err(e), driver))
                }
            }
        })
        .boxed()
    }

    /// 运行到结束并返回结局与历史
    pub async fn run_to_end(self, seed: Vec<Message>) -> Result<ConversationReport, AgentError> {
        let mut driver = Driver::new(self, seed);
        let result = loop {
            match driver.step().await {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        driver.finish().await;
        result?;

        let outcome = driver.outcome();
        Ok(ConversationReport {
            outcome,
            history: driver.history,
        })
    }
}

/// 循环的可变部分
struct Driver {
    conversation: Conversation,
    history: Vec<Message>,
    rounds: usize,
    finished: bool,
}

impl Driver {
    fn new(conversation: Conversation, history: Vec<Message>) -> Self {
        Self {
            conversation,
            history,
            rounds: 0,
            finished: false,
        }
    }

    /// 推进一轮；Ok(None) 表示正常结束
    async fn step(&mut self) -> Result<Option<Message>, AgentError> {
        let conv = &self.conversation;
        if conv.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let kind = match conv.orchestrator.next_actor(&self.history) {
            Route::Terminate => return Ok(None),
            Route::Next(kind) => kind,
        };
        if self.rounds >= conv.max_rounds {
            tracing::info!(rounds = self.rounds, "round budget exhausted");
            return Ok(None);
        }

        let input = latest_state(&self.history).map(State::step);
        let actor = conv.crew.get(kind).clone();
        let reply = tokio::select! {
            _ = conv.cancel.cancelled() => return Err(AgentError::Cancelled),
            reply = actor.generate_reply(&self.history) => reply?,
        };
        self.rounds += 1;

        let Some(output) = reply.as_state().map(State::step) else {
            return Err(AgentError::IllegalTransition {
                actor: kind,
                from: step_label(input),
                to: "plain text".to_string(),
            });
        };
        if !conv.graph.allows(input, output) {
            return Err(AgentError::IllegalTransition {
                actor: kind,
                from: step_label(input),
                to: output.to_string(),
            });
        }

        if let Some(field) = reply.as_state().and_then(State::missing_field) {
            return Err(AgentError::IncompleteOutput {
                actor: kind,
                step: output,
                field,
            });
        }

        tracing::info!(
            round = self.rounds,
            actor = %kind,
            from = %step_label(input),
            to = %output,
            "round"
        );
        self.history.push(reply.clone());
        Ok(Some(reply))
    }

    async fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.conversation.crew.release().await;
            if let Some((prompt, completion, total)) = self.conversation.crew.token_usage() {
                tracing::info!(
                    rounds = self.rounds,
                    prompt_tokens = prompt,
                    completion_tokens = completion,
                    total_tokens = total,
                    "conversation finished"
                );
            }
        }
    }

    fn outcome(&self) -> Outcome {
        Outcome::from_last(self.history.last(), self.rounds)
    }
}
