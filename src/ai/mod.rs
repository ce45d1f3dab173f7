//! Generative-model seam: provider trait, Gemini REST implementation with
//! bounded retry, a scripted mock for tests, and a disabled stub.

pub mod aggregate;
pub mod issue_gen;
pub mod semantic;
pub mod trend;
pub mod weekly;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AiSettings;

/// Overload/rate-limit responses get this many attempts, delay doubling.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast tier: issue synthesis, clustering, yes/no classification.
    Flash,
    /// Deep tier: long-form reports, optionally web-grounded.
    Pro,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub tier: ModelTier,
    pub prompt: String,
    pub system: Option<String>,
    /// Ask the provider to ground the answer with web search.
    pub web_search: bool,
}

impl GenerateRequest {
    pub fn flash(prompt: impl Into<String>) -> Self {
        Self {
            tier: ModelTier::Flash,
            prompt: prompt.into(),
            system: None,
            web_search: false,
        }
    }

    pub fn pro(prompt: impl Into<String>) -> Self {
        Self {
            tier: ModelTier::Pro,
            prompt: prompt.into(),
            system: None,
            web_search: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    /// URLs the provider consulted when web grounding was requested.
    pub grounding_urls: Vec<String>,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;
    fn provider_name(&self) -> &'static str;
}

pub type SharedAiClient = Arc<dyn GenerativeClient>;

/// Factory: a real client when an API key is configured, otherwise the
/// disabled stub (issue generation then degrades per cluster).
pub fn build_client(settings: &AiSettings) -> SharedAiClient {
    if settings.api_key.is_empty() {
        warn!("no generative API key configured; AI features disabled");
        return Arc::new(DisabledClient);
    }
    Arc::new(GeminiClient::new(settings.clone()))
}

// ------------------------------------------------------------
// Gemini REST client
// ------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    settings: AiSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiTool {
    #[serde(rename = "google_search")]
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct GeminiReply {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiReplyContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<GroundingWeb>,
}

#[derive(Deserialize)]
struct GroundingWeb {
    #[serde(default)]
    uri: Option<String>,
}

impl GeminiClient {
    pub fn new(settings: AiSettings) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("daily-brief/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self { http, settings }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Flash => &self.settings.flash_model,
            ModelTier::Pro => &self.settings.pro_model,
        }
    }

    async fn call_once(&self, request: &GenerateRequest) -> Result<GenerateResponse, CallError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model_for(request.tier)
        );

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system.as_deref().map(|s| GeminiContent {
                parts: vec![GeminiPart { text: s }],
            }),
            tools: request.web_search.then(|| {
                vec![GeminiTool {
                    google_search: serde_json::Map::new(),
                }]
            }),
        };

        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.settings.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Fatal(e.into()))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.as_u16() == 503 {
            return Err(CallError::Transient(status.as_u16()));
        }
        if !status.is_success() {
            return Err(CallError::Fatal(anyhow::anyhow!(
                "generative API returned status {status}"
            )));
        }

        let reply: GeminiReply = resp
            .json()
            .await
            .map_err(|e| CallError::Fatal(anyhow::Error::from(e).context("decoding reply")))?;

        let candidate = reply
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| CallError::Fatal(anyhow::anyhow!("reply carried no candidates")))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let grounding_urls = candidate
            .grounding_metadata
            .map(|m| {
                m.grounding_chunks
                    .into_iter()
                    .filter_map(|c| c.web.and_then(|w| w.uri))
                    .collect()
            })
            .unwrap_or_default();

        Ok(GenerateResponse {
            text,
            grounding_urls,
        })
    }
}

enum CallError {
    /// Overloaded/rate-limited; worth retrying with backoff.
    Transient(u16),
    Fatal(anyhow::Error),
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        counter!("ai_calls_total").increment(1);
        let mut delay = INITIAL_RETRY_DELAY;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.call_once(&request).await {
                Ok(response) => return Ok(response),
                Err(CallError::Transient(status)) if attempt < MAX_ATTEMPTS => {
                    warn!(attempt, status, "generative API overloaded; retrying");
                    counter!("ai_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(CallError::Transient(status)) => {
                    bail!("generative API still overloaded (status {status}) after {MAX_ATTEMPTS} attempts")
                }
                Err(CallError::Fatal(e)) => return Err(e.context("generative API call")),
            }
        }
        unreachable!("retry loop always returns")
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Stubs
// ------------------------------------------------------------

/// Always errors; used when no API key is configured.
pub struct DisabledClient;

#[async_trait]
impl GenerativeClient for DisabledClient {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        bail!("generative client disabled")
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

enum MockReply {
    Text(String),
    Grounded(String, Vec<String>),
    Error(String),
}

/// Scripted mock: replies are popped in push order; an exhausted script
/// errors, which doubles as a transient-failure simulation.
#[derive(Default)]
pub struct MockClient {
    script: Mutex<VecDeque<MockReply>>,
    pub calls: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(MockReply::Text(text.into()));
    }

    pub fn push_grounded(&self, text: impl Into<String>, urls: Vec<String>) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(MockReply::Grounded(text.into(), urls));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(MockReply::Error(message.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeClient for MockClient {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .expect("mock script poisoned")
            .pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(GenerateResponse {
                text,
                grounding_urls: Vec::new(),
            }),
            Some(MockReply::Grounded(text, grounding_urls)) => Ok(GenerateResponse {
                text,
                grounding_urls,
            }),
            Some(MockReply::Error(message)) => bail!("{message}"),
            None => bail!("mock script exhausted"),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Shared helpers
// ------------------------------------------------------------

/// First balanced-looking JSON object in a model reply: models often wrap
/// JSON in prose or code fences.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Rebuild the `## ■ Sources` section from the issue's own sources plus
/// whatever the grounded call consulted.
pub(crate) fn sources_section(brief_sources: &[String], grounding_urls: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut section = String::from("\n## ■ Sources\n");

    let mut push = |url: &str, label: &str, seen: &mut Vec<&str>| {
        let idx = seen.len() + 1;
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_else(|| "Source".to_string());
        section.push_str(&format!("- [{idx}] {host} | [{label}] {url}\n"));
    };

    for url in brief_sources {
        if !seen.contains(&url.as_str()) {
            push(url, "Brief Origin", &mut seen);
            seen.push(url);
        }
    }
    for url in grounding_urls {
        if !seen.contains(&url.as_str()) {
            push(url, "Deep Research", &mut seen);
            seen.push(url);
        }
    }
    section
}

/// Strip a trailing model-written sources section so ours replaces it.
pub(crate) fn strip_sources_section(text: &str) -> String {
    use once_cell::sync::OnceCell;
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?is)(?:##?\s*)?■\s*Sources[\s\S]*$").expect("sources regex")
    });
    re.replace(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_block_extraction_skips_fences_and_prose() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(text), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn sources_section_labels_and_dedupes() {
        let brief = vec!["https://www.finextra.com/story".to_string()];
        let grounded = vec![
            "https://www.finextra.com/story".to_string(),
            "https://reuters.com/extra".to_string(),
        ];
        let section = sources_section(&brief, &grounded);
        assert!(section.contains("[1] finextra.com | [Brief Origin]"));
        assert!(section.contains("[2] reuters.com | [Deep Research]"));
        assert_eq!(section.matches("finextra.com").count(), 1);
    }

    #[test]
    fn trailing_sources_section_is_stripped() {
        let text = "# Report\nbody text\n\n## ■ Sources\n- [1] old";
        assert_eq!(strip_sources_section(text), "# Report\nbody text");
    }
}
