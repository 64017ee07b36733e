//! Tavily web search and page extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use aira_core::capability::{SearchHit, WebSearch};
use aira_core::config::TavilyConfig;
use aira_core::error::{AiraError, Result};

use crate::http;

const SERVICE: &str = "tavily";
const TIMEOUT_SECS: u64 = 30;

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, config: &TavilyConfig) -> Self {
        Self {
            client: http::build_client(TIMEOUT_SECS),
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &TavilyConfig) -> Result<Self> {
        let key = http::api_key_from_env(&config.api_key_env)?;
        Ok(Self::new(key, config))
    }

    async fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(format!("{}/{}", self.api_base, endpoint))
            .bearer_auth(&self.api_key)
            .json(body);
        http::send(request, SERVICE, TIMEOUT_SECS, AiraError::Search).await
    }
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct ExtractBody<'a> {
    urls: [&'a str; 1],
    include_images: bool,
    extract_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractResult>,
}

#[derive(Debug, Deserialize)]
struct ExtractResult {
    #[serde(default)]
    raw_content: Option<String>,
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str, depth: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        debug!(query, depth, max_results, "Searching the web");
        let body = SearchBody {
            query,
            search_depth: depth,
            max_results,
        };
        let response: SearchResponse = self
            .post("search", &body)
            .await?
            .json()
            .await
            .map_err(|e| AiraError::InvalidResponse(format!("{} search parse failed: {}", SERVICE, e)))?;

        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect())
    }

    async fn extract(&self, url: &str) -> Result<String> {
        debug!(url, "Extracting page content");
        let body = ExtractBody {
            urls: [url],
            include_images: false,
            extract_depth: "basic",
        };
        let response: ExtractResponse = self
            .post("extract", &body)
            .await?
            .json()
            .await
            .map_err(|e| AiraError::InvalidResponse(format!("{} extract parse failed: {}", SERVICE, e)))?;

        response
            .results
            .into_iter()
            .next()
            .and_then(|r| r.raw_content)
            .ok_or_else(|| AiraError::Search(format!("no content extracted from {}", url)))
    }
}
