//! Paid search-API providers (Brave news search, Tavily). Enabled only when
//! the corresponding API key is configured.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::collect::NewsProvider;
use crate::model::NewsItem;

const RESULT_CAP: usize = 5;

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("daily-brief/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()
        .context("building search http client")
}

// ------------------------------------------------------------
// Brave news search
// ------------------------------------------------------------

pub struct BraveSearchProvider {
    keyword: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct BraveReply {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<BraveSource>,
    #[serde(default)]
    meta_url: Option<BraveMetaUrl>,
}

/// Brave ships `source` either as a plain string or as an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BraveSource {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct BraveMetaUrl {
    #[serde(default)]
    hostname: Option<String>,
}

impl BraveSearchProvider {
    pub fn new(keyword: &str, api_key: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn source_label(result: &BraveResult) -> String {
        match &result.source {
            Some(BraveSource::Name(name)) => name.clone(),
            Some(BraveSource::Detailed { name: Some(name) }) => name.clone(),
            _ => result
                .meta_url
                .as_ref()
                .and_then(|m| m.hostname.clone())
                .unwrap_or_else(|| "Brave Search".to_string()),
        }
    }
}

#[async_trait]
impl NewsProvider for BraveSearchProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let http = http_client()?;
        let resp = http
            .get("https://api.search.brave.com/res/v1/news/search")
            .query(&[
                ("q", self.keyword.as_str()),
                ("count", "5"),
                ("search_lang", "en"),
                ("freshness", "pd"),
            ])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .with_context(|| format!("brave search for {}", self.keyword))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("brave search returned status {status}");
        }
        let reply: BraveReply = resp.json().await.context("decoding brave reply")?;

        Ok(reply
            .results
            .iter()
            .take(RESULT_CAP)
            .map(|r| NewsItem {
                id: NewsItem::stable_id(&r.url),
                title: r.title.clone(),
                description: r.description.clone().unwrap_or_default(),
                url: r.url.clone(),
                source: Self::source_label(r),
                // Brave reports relative ages only; treat results as fresh.
                published_at: Utc::now(),
                category: None,
            })
            .collect())
    }

    fn name(&self) -> String {
        format!("Brave Search ({})", self.keyword)
    }
}

// ------------------------------------------------------------
// Tavily search
// ------------------------------------------------------------

pub struct TavilySearchProvider {
    keyword: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TavilyReply {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: Option<String>,
}

impl TavilySearchProvider {
    pub fn new(keyword: &str, api_key: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl NewsProvider for TavilySearchProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let http = http_client()?;
        let resp = http
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.api_key,
                "query": self.keyword,
                "search_depth": "basic",
                "include_answer": false,
                "include_images": false,
                "include_raw_content": false,
                "max_results": RESULT_CAP,
                "days": 1,
            }))
            .send()
            .await
            .with_context(|| format!("tavily search for {}", self.keyword))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("tavily search returned status {status}");
        }
        let reply: TavilyReply = resp.json().await.context("decoding tavily reply")?;

        Ok(reply
            .results
            .into_iter()
            .take(RESULT_CAP)
            .map(|r| NewsItem {
                id: NewsItem::stable_id(&r.url),
                title: r.title,
                description: r.content.unwrap_or_default(),
                url: r.url,
                source: "Tavily Search".to_string(),
                published_at: Utc::now(),
                category: None,
            })
            .collect())
    }

    fn name(&self) -> String {
        format!("Tavily Search ({})", self.keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brave_source_field_tolerates_both_shapes() {
        let as_string: BraveResult = serde_json::from_str(
            r#"{"title": "t", "url": "https://e.com", "source": "PYMNTS"}"#,
        )
        .unwrap();
        assert_eq!(BraveSearchProvider::source_label(&as_string), "PYMNTS");

        let as_object: BraveResult = serde_json::from_str(
            r#"{"title": "t", "url": "https://e.com", "source": {"name": "Finextra"}}"#,
        )
        .unwrap();
        assert_eq!(BraveSearchProvider::source_label(&as_object), "Finextra");

        let hostname_only: BraveResult = serde_json::from_str(
            r#"{"title": "t", "url": "https://e.com", "meta_url": {"hostname": "e.com"}}"#,
        )
        .unwrap();
        assert_eq!(BraveSearchProvider::source_label(&hostname_only), "e.com");
    }
}
