//! 任务状态：Step 枚举与 State 和类型
//!
//! State 按 Step 打标签，每个变体只携带该阶段合法的字段（task / code / error / ...），
//! 不存在「字段有值但对当前阶段无意义」的情况。State 一经产生不再修改，每次转移都构造新值。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 任务生命周期中的阶段（状态机的状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateTask,
    WriteCode,
    ReviewCode,
    FixComment,
    RunCode,
    RunCodeResult,
    Succeeded,
    FixCodeError,
    SearchSolution,
    SearchSolutionResult,
    ImproveCode,
    NotATask,
}

impl Step {
    /// 全部阶段，按声明顺序
    pub const ALL: [Step; 12] = [
        Step::CreateTask,
        Step::WriteCode,
        Step::ReviewCode,
        Step::FixComment,
        Step::RunCode,
        Step::RunCodeResult,
        Step::Succeeded,
        Step::FixCodeError,
        Step::SearchSolution,
        Step::SearchSolutionResult,
        Step::ImproveCode,
        Step::NotATask,
    ];

    /// Succeeded 与 NotATask 为终止态
    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Succeeded | Step::NotATask)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::CreateTask => "create_task",
            Step::WriteCode => "write_code",
            Step::ReviewCode => "review_code",
            Step::FixComment => "fix_comment",
            Step::RunCode => "run_code",
            Step::RunCodeResult => "run_code_result",
            Step::Succeeded => "succeeded",
            Step::FixCodeError => "fix_code_error",
            Step::SearchSolution => "search_solution",
            Step::SearchSolutionResult => "search_solution_result",
            Step::ImproveCode => "improve_code",
            Step::NotATask => "not_a_task",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 在对话中传递的任务状态
///
/// 序列化时以 `step` 字段作为标签，字段名与变体一一对应。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum State {
    CreateTask {
        task: String,
    },
    WriteCode {
        task: String,
        code: String,
    },
    /// Reviewer 的评审结论原样放在 comment 中，由 Planner 判定通过与否
    ReviewCode {
        task: String,
        code: String,
        comment: String,
    },
    FixComment {
        task: String,
        code: String,
        comment: String,
    },
    RunCode {
        task: String,
        code: String,
    },
    RunCodeResult {
        task: String,
        code: String,
        run_result: String,
    },
    Succeeded {
        task: String,
        code: String,
        run_result: String,
        answer: String,
    },
    FixCodeError {
        task: String,
        code: String,
        error: String,
    },
    SearchSolution {
        task: String,
        code: String,
        error: String,
    },
    SearchSolutionResult {
        task: String,
        code: String,
        error: String,
        web_search_result: String,
    },
    ImproveCode {
        task: String,
        code: String,
        comment: String,
    },
    /// 非编程任务；若由 Coder 拒绝则保留原任务文本
    NotATask {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
    },
}

impl State {
    pub fn step(&self) -> Step {
        match self {
            State::CreateTask { .. } => Step::CreateTask,
            State::WriteCode { .. } => Step::WriteCode,
            State::ReviewCode { .. } => Step::ReviewCode,
            State::FixComment { .. } => Step::FixComment,
            State::RunCode { .. } => Step::RunCode,
            State::RunCodeResult { .. } => Step::RunCodeResult,
            State::Succeeded { .. } => Step::Succeeded,
            State::FixCodeError { .. } => Step::FixCodeError,
            State::SearchSolution { .. } => Step::SearchSolution,
            State::SearchSolutionResult { .. } => Step::SearchSolutionResult,
            State::ImproveCode { .. } => Step::ImproveCode,
            State::NotATask { .. } => Step::NotATask,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step().is_terminal()
    }

    pub fn task(&self) -> Option<&str> {
        match self {
            State::CreateTask { task }
            | State::WriteCode { task, .. }
            | State::ReviewCode { task, .. }
            | State::FixComment { task, .. }
            | State::RunCode { task, .. }
            | State::RunCodeResult { task, .. }
            | State::Succeeded { task, .. }
            | State::FixCodeError { task, .. }
            | State::SearchSolution { task, .. }
            | State::SearchSolutionResult { task, .. }
            | State::ImproveCode { task, .. } => Some(task.as_str()),
            State::NotATask { task } => task.as_deref(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            State::WriteCode { code, .. }
            | State::ReviewCode { code, .. }
            | State::FixComment { code, .. }
            | State::RunCode { code, .. }
            | State::RunCodeResult { code, .. }
            | State::Succeeded { code, .. }
            | State::FixCodeError { code, .. }
            | State::SearchSolution { code, .. }
            | State::SearchSolutionResult { code, .. }
            | State::ImproveCode { code, .. } => Some(code.as_str()),
            State::CreateTask { .. } | State::NotATask { .. } => None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            State::Succeeded { answer, .. } => Some(answer.as_str()),
            _ => None,
        }
    }

    /// 必填字段逐一列出（名称, 值），用于检查是否为空
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            State::CreateTask { task } => vec![("task", task.as_str())],
            State::WriteCode { task, code } | State::RunCode { task, code } => {
                vec![("task", task.as_str()), ("code", code.as_str())]
            }
            // 评审通过时 comment 可以只是一句认可，不作为必填
            State::ReviewCode { task, code, .. } => {
                vec![("task", task.as_str()), ("code", code.as_str())]
            }
            State::FixComment { task, code, comment }
            | State::ImproveCode { task, code, comment } => {
                vec![("task", task.as_str()), ("code", code.as_str()), ("comment", comment.as_str())]
            }
            State::RunCodeResult { task, code, run_result } => {
                vec![("task", task.as_str()), ("code", code.as_str()), ("run_result", run_result.as_str())]
            }
            State::Succeeded {
                task,
                code,
                run_result,
                answer,
            } => vec![
                ("task", task.as_str()),
                ("code", code.as_str()),
                ("run_result", run_result.as_str()),
                ("answer", answer.as_str()),
            ],
            State::FixCodeError { task, code, error } | State::SearchSolution { task, code, error } => {
                vec![("task", task.as_str()), ("code", code.as_str()), ("error", error.as_str())]
            }
            State::SearchSolutionResult {
                task,
                code,
                error,
                web_search_result,
            } => vec![
                ("task", task.as_str()),
                ("code", code.as_str()),
                ("error", error.as_str()),
                ("web_search_result", web_search_result.as_str()),
            ],
            State::NotATask { .. } => Vec::new(),
        }
    }

    /// 返回第一个为空（仅空白）的必填字段名；全部非空时为 None
    pub fn missing_field(&self) -> Option<&'static str> {
        self.required_fields()
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_steps() {
        let terminal: Vec<Step> = Step::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Step::Succeeded, Step::NotATask]);
    }

    #[test]
    fn test_step_matches_variant() {
        let state = State::FixCodeError {
            task: "t".into(),
            code: "c".into(),
            error: "e".into(),
        };
        assert_eq!(state.step(), Step::FixCodeError);
        assert_eq!(state.task(), Some("t"));
        assert_eq!(state.code(), Some("c"));
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_missing_field_detects_blank_values() {
        let state = State::ReviewCode {
            task: "sum".into(),
            code: "  \n".into(),
            comment: "looks fine".into(),
        };
        assert_eq!(state.missing_field(), Some("code"));

        let complete = State::RunCode {
            task: "sum".into(),
            code: "print(1)".into(),
        };
        assert_eq!(complete.missing_field(), None);
    }

    #[test]
    fn test_review_comment_is_optional() {
        let review = State::ReviewCode {
            task: "sum".into(),
            code: "print(5)".into(),
            comment: String::new(),
        };
        assert_eq!(review.missing_field(), None);

        let fix = State::FixComment {
            task: "sum".into(),
            code: "print(5)".into(),
            comment: " ".into(),
        };
        assert_eq!(fix.missing_field(), Some("comment"));
    }

    #[test]
    fn test_not_a_task_has_no_required_fields() {
        assert_eq!(State::NotATask { task: None }.missing_field(), None);
        assert_eq!(State::NotATask { task: None }.task(), None);
    }
}
