//! Coder：按阶段选用不同 prompt 生成代码
//!
//! 接受 CreateTask / FixComment / ImproveCode / FixCodeError / SearchSolutionResult，
//! 正常情况下产出 WriteCode（code 为模型原样回复，其中包含围栏代码块）。
//! 新任务被模型判定为无法用代码解决时产出 NotATask；
//! 修复报错时模型要求搜索（且搜索可用）则产出 SearchSolution。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actors::{ask_llm, current_state, Actor, ActorKind};
use crate::core::{AgentError, Message, State};
use crate::llm::LlmClient;

const CANNOT_RESOLVE_PHRASE: &str = "i cannot resolve this task using code";
const SEARCH_PHRASE: &str = "search for solution";

fn create_prompt(task: &str) -> String {
    format!(
        r#"You are a helpful coder agent, you resolve tasks using python, powershell or csharp code.

Here are rules that you need to follow:
- always print the result of your code
- always use code block to wrap your code

ALWAYS put your code in a code block like this:
```<python|csharp|pwsh>
print("Hello World")
```

Using the following syntax to install pip packages:
```python
%pip install <package-name>
```

Using the following syntax to install nuget packages:
```csharp
#r "nuget:<package-name>"
```

Here is your task:
{task}

If the task can be resolved by writing code, please write the code. Otherwise, say 'I cannot resolve this task using code'."#
    )
}

fn fix_error_prompt(task: &str, code: &str, error: &str, allow_search: bool) -> String {
    let search_hint = if allow_search {
        "\n\nIf you need search web for solution, say 'I need to search for solution'."
    } else {
        ""
    };
    format!(
        r#"### Task
{task}

### Code
{code}

### Error
{error}

Your task is to fix the error in the code. Please write the corrected code and put it in a code block.

```<python|csharp|pwsh>
# Write your corrected code here
```{search_hint}"#
    )
}

fn improve_prompt(task: &str, code: &str, comment: &str) -> String {
    format!(
        r#"### Task
{task}

### Code
{code}

### Improvement
{comment}

Your task is to improve the code based on suggestions. Please write the improved code and put it in a code block.

```<python|csharp|pwsh>
# Write your improved code here
```"#
    )
}

fn apply_solution_prompt(task: &str, code: &str, error: &str, solution: &str) -> String {
    format!(
        r#"### Task
{task}

### Code
{code}

### Error
{error}

### Solution found on the web
{solution}

Your task is to fix the error in the code using the solution above. Please write the corrected code and put it in a code block.

```<python|csharp|pwsh>
# Write your corrected code here
```"#
    )
}

pub struct Coder {
    name: String,
    llm: Arc<dyn LlmClient>,
    /// 是否允许在修复报错时请求 Web 搜索
    search_enabled: bool,
}

impl Coder {
    pub fn new(llm: Arc<dyn LlmClient>, search_enabled: bool) -> Self {
        Self {
            name: ActorKind::Coder.as_str().to_string(),
            llm,
            search_enabled,
        }
    }

    async fn ask(&self, prompt: String) -> Result<String, AgentError> {
        ask_llm(self.llm.as_ref(), prompt).await
    }
}

fn write_code(task: &str, code: String) -> State {
    State::WriteCode {
        task: task.to_string(),
        code,
    }
}

#[async_trait]
impl Actor for Coder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Coder
    }

    async fn generate_reply(&self, history: &[Message]) -> Result<Message, AgentError> {
        let next = match current_state(self.kind(), history)? {
            State::CreateTask { task } => {
                let reply = self.ask(create_prompt(task)).await?;
                if reply.to_lowercase().contains(CANNOT_RESOLVE_PHRASE) {
                    tracing::info!("coder: task cannot be resolved with code");
                    State::NotATask {
                        task: Some(task.clone()),
                    }
                } else {
                    write_code(task, reply)
                }
            }
            State::FixComment {
                task,
                code,
                comment,
            }
            | State::ImproveCode {
                task,
                code,
                comment,
            } => write_code(task, self.ask(improve_prompt(task, code, comment)).await?),
            State::FixCodeError { task, code, error } => {
                let reply = self
                    .ask(fix_error_prompt(task, code, error, self.search_enabled))
                    .await?;
                if self.search_enabled && reply.to_lowercase().contains(SEARCH_PHRASE) {
                    State::SearchSolution {
                        task: task.clone(),
                        code: code.clone(),
                        error: error.clone(),
                    }
                } else {
                    write_code(task, reply)
                }
            }
            State::SearchSolutionResult {
                task,
                code,
                error,
                web_search_result,
            } => write_code(
                task,
                self.ask(apply_solution_prompt(task, code, error, web_search_result))
                    .await?,
            ),
            other => return Err(AgentError::invalid_message(self.kind(), Some(other.step()))),
        };
        Ok(Message::state(self.name.as_str(), next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Step;
    use crate::llm::MockLlmClient;

    const CODE: &str = "```python\nprint(2 + 3)\n```";

    fn make_coder(reply: &str, search_enabled: bool) -> (Coder, Arc<MockLlmClient>) {
        let llm = Arc::new(MockLlmClient::scripted([reply]));
        (Coder::new(llm.clone(), search_enabled), llm)
    }

    fn fix_error() -> Vec<Message> {
        vec![Message::state(
            "planner",
            State::FixCodeError {
                task: "sum".into(),
                code: "print(a + b)".into(),
                error: "NameError: name 'a' is not defined".into(),
            },
        )]
    }

    #[tokio::test]
    async fn test_create_task_writes_code() {
        let (coder, llm) = make_coder(CODE, false);
        let history = vec![Message::state("planner", State::CreateTask { task: "sum".into() })];
        let reply = coder.generate_reply(&history).await.unwrap();
        assert_eq!(
            reply.as_state(),
            Some(&State::WriteCode {
                task: "sum".into(),
                code: CODE.into(),
            })
        );
        assert!(llm.prompts()[0].contains("Here is your task:\nsum"));
    }

    #[tokio::test]
    async fn test_unsolvable_task() {
        let (coder, _) = make_coder("Sorry, I cannot resolve this task using code.", false);
        let history = vec![Message::state(
            "planner",
            State::CreateTask {
                task: "tell me a joke".into(),
            },
        )];
        let reply = coder.generate_reply(&history).await.unwrap();
        assert_eq!(
            reply.as_state(),
            Some(&State::NotATask {
                task: Some("tell me a joke".into())
            })
        );
    }

    #[tokio::test]
    async fn test_fix_comment_uses_comment() {
        let (coder, llm) = make_coder(CODE, false);
        let history = vec![Message::state(
            "planner",
            State::FixComment {
                task: "sum".into(),
                code: "x = 2 + 3".into(),
                comment: "print the result".into(),
            },
        )];
        let reply = coder.generate_reply(&history).await.unwrap();
        assert_eq!(reply.as_state().map(State::step), Some(Step::WriteCode));
        assert!(llm.prompts()[0].contains("### Improvement\nprint the result"));
    }

    #[tokio::test]
    async fn test_fix_error_may_request_search() {
        let (coder, llm) = make_coder("I need to search for solution", true);
        let reply = coder.generate_reply(&fix_error()).await.unwrap();
        assert_eq!(reply.as_state().map(State::step), Some(Step::SearchSolution));
        assert!(llm.prompts()[0].contains("search for solution"));
    }

    #[tokio::test]
    async fn test_search_request_ignored_when_disabled() {
        let (coder, llm) = make_coder("I need to search for solution", false);
        let reply = coder.generate_reply(&fix_error()).await.unwrap();
        assert_eq!(reply.as_state().map(State::step), Some(Step::WriteCode));
        assert!(!llm.prompts()[0].contains("search for solution"));
    }

    #[tokio::test]
    async fn test_search_result_feeds_prompt() {
        let (coder, llm) = make_coder(CODE, true);
        let history = vec![Message::state(
            "web-search",
            State::SearchSolutionResult {
                task: "sum".into(),
                code: "print(a + b)".into(),
                error: "NameError".into(),
                web_search_result: "define a and b first".into(),
            },
        )];
        let reply = coder.generate_reply(&history).await.unwrap();
        assert_eq!(reply.as_state().map(State::step), Some(Step::WriteCode));
        assert!(llm.prompts()[0].contains("define a and b first"));
    }
}
