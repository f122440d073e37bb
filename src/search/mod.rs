//! Web 搜索后端：WebSearch Actor 用它检索报错的解决方案

pub mod bing;

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

pub use bing::BingSearch;

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Web search is not configured")]
    NotConfigured,

    #[error("Search request failed: {0}")]
    Http(String),

    #[error("Search returned HTTP {0}")]
    Status(u16),

    #[error("Malformed search response: {0}")]
    Parse(String),
}

/// 搜索后端抽象
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// 是否可用；Coder 据此决定是否提供「搜索解决方案」选项
    fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// 未配置搜索时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSearch;

#[async_trait]
impl SearchBackend for DisabledSearch {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _count: usize) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::NotConfigured)
    }
}

/// 返回固定结果的后端（测试用），记录收到的查询
#[derive(Debug, Default)]
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        Ok(self.hits.iter().take(count).cloned().collect())
    }
}

/// 把搜索结果排成编号列表，供模型阅读
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No search results.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.url, hit.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_search() {
        let search = DisabledSearch;
        assert!(!search.is_enabled());
        assert!(matches!(
            search.search("anything", 3).await,
            Err(SearchError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_static_search_respects_count() {
        let hit = |n: u32| SearchHit {
            title: format!("t{n}"),
            url: format!("https://example.com/{n}"),
            snippet: String::new(),
        };
        let search = StaticSearch::new(vec![hit(1), hit(2), hit(3)]);
        let hits = search.search("numpy import error", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.queries(), vec!["numpy import error".to_string()]);
    }

    #[test]
    fn test_format_hits() {
        assert_eq!(format_hits(&[]), "No search results.");
        let text = format_hits(&[SearchHit {
            title: "Fix".into(),
            url: "https://x".into(),
            snippet: "pip install y".into(),
        }]);
        assert!(text.starts_with("1. Fix"));
        assert!(text.contains("pip install y"));
    }
}
