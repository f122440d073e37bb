//! WebSearch：为执行报错检索解决方案
//!
//! 先请模型生成一条简短搜索词，调用搜索后端，再请模型根据搜索结果归纳修复建议，
//! 产出 SearchSolutionResult（保留原 task / code / error）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actors::{ask_llm, current_state, Actor, ActorKind};
use crate::core::{AgentError, Message, State};
use crate::llm::LlmClient;
use crate::search::{format_hits, SearchBackend};

fn query_prompt(task: &str, error: &str) -> String {
    format!(
        r#"You are a helpful web search agent.

Here is the task:
{task}

Here is the error message:
{error}

Write one short web search query that would find the solution to this error. Reply with the query only."#
    )
}

fn solution_prompt(task: &str, code: &str, error: &str, results: &str) -> String {
    format!(
        r#"You are a helpful web search agent, you search the solution based on the task and code.

Here is the task:
{task}

Here is the code:
{code}

Here is the error message:
{error}

Here are the web search results:
{results}

Based on the search results, explain how to fix the error."#
    )
}

/// 取模型回复的第一行非空文本作为搜索词
fn clean_query(reply: &str, fallback: &str) -> String {
    let line = reply
        .lines()
        .map(|l| l.trim().trim_matches(|c: char| c == '"' || c == '`'))
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.is_empty() {
        fallback.lines().next().unwrap_or(fallback).trim().to_string()
    } else {
        line.to_string()
    }
}

pub struct WebSearch {
    name: String,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchBackend>,
    count: usize,
}

impl WebSearch {
    pub fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn SearchBackend>, count: usize) -> Self {
        Self {
            name: ActorKind::WebSearch.as_str().to_string(),
            llm,
            search,
            count,
        }
    }
}

#[async_trait]
impl Actor for WebSearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::WebSearch
    }

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError> {
        let state = current_state(self.kind(), history)?;
        let State::SearchSolution { task, code, error } = state else {
            return Err(AgentError::invalid_message(self.kind(), Some(state.step())));
        };

        let reply = ask_llm(self.llm.as_ref(), query_prompt(task, error)).await?;
        let query = clean_query(&reply, error);
        let hits = self.search.search(&query, self.count).await?;
        tracing::info!(query = %query, hits = hits.len(), "web search done");

        let solution = ask_llm(
            self.llm.as_ref(),
            solution_prompt(task, code, error, &format_hits(&hits)),
        )
        .await?;

        Ok(Message::state(
            self.name.as_str(),
            State::SearchSolutionResult {
                task: task.clone(),
                code: code.clone(),
                error: error.clone(),
                web_search_result: solution,
            },
        ))
    }
}
