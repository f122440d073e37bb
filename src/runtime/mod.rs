//! 代码执行运行时
//!
//! 外部协作方接口：`submit(code, language) -> Execution`。运行时是长期存活的会话，
//! 同一语言的多次提交共享解释器状态（变量、导入等在块之间保留）。

pub mod code_block;
pub mod mock;
pub mod process;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use code_block::{extract_code_blocks, CodeBlock};
pub use mock::MockRuntime;
pub use process::ProcessRuntime;

/// 支持的语言（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Python,
    Pwsh,
    CSharp,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Pwsh, Language::CSharp];

    /// 代码块围栏上的规范标签
    pub fn tag(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Pwsh => "pwsh",
            Language::CSharp => "csharp",
        }
    }

    /// 从围栏标签解析（大小写不敏感，含常见别名）
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "python" | "py" | "python3" => Some(Language::Python),
            "pwsh" | "powershell" | "ps1" => Some(Language::Pwsh),
            "csharp" | "cs" | "c#" => Some(Language::CSharp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "Python",
            Language::Pwsh => "Powershell",
            Language::CSharp => "CSharp",
        };
        f.write_str(name)
    }
}

/// 单次提交的结果：捕获的输出，以及代码抛出的错误（若有）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub error: Option<String>,
}

impl Execution {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 渲染为执行记录中 [Execute Result] 之后的文本
    pub fn render(&self) -> String {
        let output = self.output.trim_end();
        match &self.error {
            None if output.is_empty() => "(no output)".to_string(),
            None => output.to_string(),
            Some(error) if output.is_empty() => format!("Error: {}", error.trim_end()),
            Some(error) => format!("{}\nError: {}", output, error.trim_end()),
        }
    }
}

/// 运行时自身的失败（进程无法启动、管道断开等）；代码抛错不属于此类
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to start {language} session: {message}")]
    Spawn { language: Language, message: String },

    #[error("{language} session closed unexpectedly")]
    SessionClosed { language: Language },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Language not available: {0}")]
    Unavailable(Language),
}

/// 执行运行时抽象
#[async_trait]
pub trait ExecutionRuntime: Send + Sync {
    /// 在对应语言的会话中执行一段代码
    async fn submit(&self, code: &str, language: Language) -> Result<Execution, RuntimeError>;

    /// 释放所有会话；对话结束时调用（含失败路径）
    async fn shutdown(&self) {}
}
