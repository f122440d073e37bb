//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CODECREW__*` 覆盖（双下划线表示嵌套，如 `CODECREW__LLM__PROVIDER=openai`）。
//! API Key 只从环境变量读取：OPENAI_API_KEY、DEEPSEEK_API_KEY、BING_API_KEY。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub runtime: RuntimeSection,
    pub search: SearchSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 对话轮数上限（每轮调用一次 Actor）
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> usize {
    20
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / auto（auto 按可用的 API Key 选择）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "auto".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [llm.retry] 段：max_retries = 0 表示失败即终止
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

/// 启动某语言会话的命令
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LanguageCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LanguageCommand {
    fn program(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }
}

/// [runtime] 段：单块超时与各语言解释器
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_runtime_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_python")]
    pub python: LanguageCommand,
    #[serde(default = "default_pwsh")]
    pub pwsh: LanguageCommand,
    #[serde(default = "default_csharp")]
    pub csharp: LanguageCommand,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_runtime_timeout_secs(),
            python: default_python(),
            pwsh: default_pwsh(),
            csharp: default_csharp(),
        }
    }
}

fn default_runtime_timeout_secs() -> u64 {
    120
}

fn default_python() -> LanguageCommand {
    LanguageCommand::program(if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    })
}

fn default_pwsh() -> LanguageCommand {
    LanguageCommand::program("pwsh")
}

fn default_csharp() -> LanguageCommand {
    LanguageCommand::program("csi")
}

/// [search] 段：Web 搜索（需 BING_API_KEY）
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    /// bing / none
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_count")]
    pub count: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            endpoint: default_search_endpoint(),
            count: default_search_count(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_provider() -> String {
    "bing".to_string()
}

fn default_search_endpoint() -> String {
    crate::search::bing::BING_ENDPOINT.to_string()
}

fn default_search_count() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    15
}

/// 从 config 目录加载配置，环境变量 CODECREW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CODECREW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CODECREW")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载配置；解析失败时告警并退回默认值
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_rounds, 20);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.llm.retry.max_retries, 2);
        assert_eq!(cfg.runtime.pwsh.program, "pwsh");
        assert_eq!(cfg.search.count, 5);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
max_rounds = 7

[llm]
provider = "deepseek"
model = "deepseek-chat"

[llm.retry]
max_retries = 0

[runtime]
timeout_secs = 9

[runtime.csharp]
program = "dotnet"
args = ["script"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.max_rounds, 7);
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.retry.max_retries, 0);
        assert_eq!(cfg.llm.retry.initial_backoff_ms, 500);
        assert_eq!(cfg.runtime.timeout_secs, 9);
        assert_eq!(
            cfg.runtime.csharp,
            LanguageCommand {
                program: "dotnet".into(),
                args: vec!["script".into()],
            }
        );
        assert_eq!(cfg.runtime.pwsh.program, "pwsh");
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[app]\nmax_rounds = \"many\"").unwrap();
        let cfg = load_config_or_default(Some(file.path().to_path_buf()));
        assert_eq!(cfg.app.max_rounds, 20);
    }
}
