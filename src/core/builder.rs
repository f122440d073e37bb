//! Crew 构建器：按配置组装五个 Actor
//!
//! LLM、执行运行时、搜索后端都可以注入（测试或嵌入方使用）；未注入时按配置与环境变量创建。

use std::sync::Arc;

use crate::actors::{Coder, Crew, Planner, Reviewer, Runner, WebSearch};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{
    create_deepseek_client, LlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::runtime::{ExecutionRuntime, ProcessRuntime};
use crate::search::{BingSearch, DisabledSearch, SearchBackend};

/// 选定的 LLM 后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAi { api_key: String },
    DeepSeek { api_key: String },
}

/// 按 provider 配置与可用的 Key 选择后端；env 用于读取环境变量
///
/// - openai / deepseek：必须有对应 Key
/// - auto：优先 OPENAI_API_KEY，其次 DEEPSEEK_API_KEY
pub fn select_provider(
    cfg: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Provider, AgentError> {
    let key = |name: &str| env(name).filter(|k| !k.trim().is_empty());
    let missing = |name: &str| AgentError::ConfigError(format!("{} is not set", name));

    match cfg.llm.provider.to_lowercase().as_str() {
        "openai" => key("OPENAI_API_KEY")
            .map(|api_key| Provider::OpenAi { api_key })
            .ok_or_else(|| missing("OPENAI_API_KEY")),
        "deepseek" => key("DEEPSEEK_API_KEY")
            .map(|api_key| Provider::DeepSeek { api_key })
            .ok_or_else(|| missing("DEEPSEEK_API_KEY")),
        "auto" => key("OPENAI_API_KEY")
            .map(|api_key| Provider::OpenAi { api_key })
            .or_else(|| key("DEEPSEEK_API_KEY").map(|api_key| Provider::DeepSeek { api_key }))
            .ok_or_else(|| {
                AgentError::ConfigError(
                    "no LLM API key found (set OPENAI_API_KEY or DEEPSEEK_API_KEY)".to_string(),
                )
            }),
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider `{}`",
            other
        ))),
    }
}

/// 从配置与环境变量创建带重试的 LLM 客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let inner: Arc<dyn LlmClient> = match select_provider(cfg, |name| std::env::var(name).ok())? {
        Provider::OpenAi { api_key } => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &api_key)
                    .with_request_timeout(cfg.llm.timeouts.request),
            )
        }
        Provider::DeepSeek { api_key } => {
            // 配置的模型不是 deepseek 系列时使用 deepseek-chat
            let model = Some(cfg.llm.model.as_str()).filter(|m| m.starts_with("deepseek"));
            tracing::info!("Using DeepSeek LLM ({})", model.unwrap_or("deepseek-chat"));
            Arc::new(
                create_deepseek_client(model, &api_key)
                    .with_request_timeout(cfg.llm.timeouts.request),
            )
        }
    };
    Ok(Arc::new(RetryingLlmClient::new(
        inner,
        RetryConfig::from_config(&cfg.llm),
    )))
}

/// 按配置创建搜索后端；未配置 BING_API_KEY 时禁用搜索
pub fn create_search_from_config(cfg: &AppConfig) -> Arc<dyn SearchBackend> {
    if !cfg.search.provider.eq_ignore_ascii_case("bing") {
        return Arc::new(DisabledSearch);
    }
    let Some(key) = std::env::var("BING_API_KEY").ok().filter(|k| !k.is_empty()) else {
        tracing::info!("BING_API_KEY not set, web search disabled");
        return Arc::new(DisabledSearch);
    };
    match BingSearch::new(&cfg.search.endpoint, &key, cfg.search.timeout_secs) {
        Ok(bing) => Arc::new(bing),
        Err(e) => {
            tracing::warn!("Failed to create Bing client, web search disabled: {}", e);
            Arc::new(DisabledSearch)
        }
    }
}

/// Crew 构建器
pub struct CrewBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    runtime: Option<Arc<dyn ExecutionRuntime>>,
    search: Option<Arc<dyn SearchBackend>>,
}

impl CrewBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            runtime: None,
            search: None,
        }
    }

    /// 注入 LLM（原样使用，不再包装重试）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ExecutionRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 构建五个 Actor；四个 LLM Actor 共享同一客户端，Runner 独占运行时
    pub fn build(self) -> Result<Crew, AgentError> {
        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config)?,
        };
        let runtime: Arc<dyn ExecutionRuntime> = match self.runtime {
            Some(runtime) => runtime,
            None => Arc::new(ProcessRuntime::from_config(&self.config.runtime)),
        };
        let search = match self.search {
            Some(search) => search,
            None => create_search_from_config(&self.config),
        };

        Ok(Crew {
            planner: Arc::new(Planner::new(llm.clone())),
            coder: Arc::new(Coder::new(llm.clone(), search.is_enabled())),
            reviewer: Arc::new(Reviewer::new(llm.clone())),
            runner: Arc::new(Runner::new(runtime)),
            web_search: Arc::new(WebSearch::new(llm.clone(), search, self.config.search.count)),
            llm: Some(llm),
        })
    }
}
