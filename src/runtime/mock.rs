//! Mock 运行时（用于测试，不启动任何解释器）

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::runtime::{Execution, ExecutionRuntime, Language, RuntimeError};

type Handler = Box<dyn Fn(&str, Language) -> Result<Execution, RuntimeError> + Send + Sync>;

/// 按闭包返回执行结果，并记录每次提交
pub struct MockRuntime {
    handler: Handler,
    calls: Mutex<Vec<(Language, String)>>,
    released: AtomicBool,
}

impl MockRuntime {
    pub fn new(
        handler: impl Fn(&str, Language) -> Result<Execution, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    /// 每次提交都返回同一输出
    pub fn with_output(output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new(move |_, _| Ok(Execution::ok(output.clone())))
    }

    /// 已提交的 (语言, 代码)
    pub fn calls(&self) -> Vec<(Language, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionRuntime for MockRuntime {
    async fn submit(&self, code: &str, language: Language) -> Result<Execution, RuntimeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((language, code.to_string()));
        }
        (self.handler)(code, language)
    }

    async fn shutdown(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
