//! Runner：执行 RunCode 中的全部代码块，产出 RunCodeResult
//!
//! 同一语言的块按文档顺序依次提交（后面的块可能依赖前面块创建的变量）；
//! 不同语言的会话互相独立，并发执行。执行记录始终按块在代码中的原始顺序拼接。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;

use crate::actors::{current_state, Actor, ActorKind};
use crate::core::{AgentError, Message, State};
use crate::runtime::{extract_code_blocks, CodeBlock, ExecutionRuntime, Language, RuntimeError};

const NO_CODE_BLOCK: &str = "No supported code block (python, pwsh, csharp) was found in the code.";

/// 单个块在执行记录中的格式
fn render_block(block: &CodeBlock, result: &str) -> String {
    format!(
        "[{} Code Block]\n```{}\n{}\n```\n\n[Execute Result]\n{}\n",
        block.language,
        block.language.tag(),
        block.code,
        result
    )
}

pub struct Runner {
    name: String,
    runtime: Arc<dyn ExecutionRuntime>,
}

impl Runner {
    pub fn new(runtime: Arc<dyn ExecutionRuntime>) -> Self {
        Self {
            name: ActorKind::Runner.as_str().to_string(),
            runtime,
        }
    }

    /// 依次执行同一语言的块，返回 (原始下标, 结果)
    async fn run_lane(
        &self,
        language: Language,
        lane: Vec<(usize, &CodeBlock)>,
    ) -> Result<Vec<(usize, String)>, RuntimeError> {
        let mut results = Vec::with_capacity(lane.len());
        for (index, block) in lane {
            let execution = self.runtime.submit(&block.code, language).await?;
            results.push((index, execution.render()));
        }
        Ok(results)
    }

    /// 执行全部块并按文档顺序拼接执行记录
    pub async fn transcript(&self, code: &str) -> Result<String, RuntimeError> {
        let blocks = extract_code_blocks(code);
        if blocks.is_empty() {
            return Ok(NO_CODE_BLOCK.to_string());
        }

        let mut lanes: BTreeMap<Language, Vec<(usize, &CodeBlock)>> = BTreeMap::new();
        for (index, block) in blocks.iter().enumerate() {
            lanes.entry(block.language).or_default().push((index, block));
        }

        let lane_results = try_join_all(
            lanes
                .into_iter()
                .map(|(language, lane)| self.run_lane(language, lane)),
        )
        .await?;

        let mut results = vec![String::new(); blocks.len()];
        for (index, result) in lane_results.into_iter().flatten() {
            results[index] = result;
        }

        Ok(blocks
            .iter()
            .zip(results.iter())
            .map(|(block, result)| render_block(block, result))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl Actor for Runner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Runner
    }

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError> {
        let state = current_state(self.kind(), history)?;
        let State::RunCode { task, code } = state else {
            return Err(AgentError::invalid_message(self.kind(), Some(state.step())));
        };

        let run_result = self.transcript(code).await?;
        tracing::debug!(chars = run_result.len(), "runner transcript ready");
        Ok(Message::state(
            self.name.as_str(),
            State::RunCodeResult {
                task: task.clone(),
                code: code.clone(),
                run_result,
            },
        ))
    }

    async fn release(&self) {
        self.runtime.shutdown().await;
    }
}
