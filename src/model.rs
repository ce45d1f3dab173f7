//! Core data model shared by the collectors, the synthesis pipeline and the
//! persistence layer. Wire names stay camelCase / SCREAMING_SNAKE where the
//! public JSON API exposes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Product vertical. Both domains share one store; data is namespaced
/// through the date-key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Ai,
    Battery,
}

impl Domain {
    /// Prefix applied to brief date keys (`battery-2026-08-05`). Must stay
    /// in sync with the storage key layout or lookups miss silently.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Domain::Ai => "",
            Domain::Battery => "battery-",
        }
    }

    /// Date key for this domain. The `%Y-%m-%d` zero padding is what makes
    /// lexicographic windowing equivalent to chronological order.
    pub fn date_key(self, date: NaiveDate) -> String {
        format!("{}{}", self.key_prefix(), date.format("%Y-%m-%d"))
    }

    /// Whether a stored date key belongs to this domain.
    pub fn owns_date_key(self, key: &str) -> bool {
        match self {
            Domain::Battery => key.starts_with("battery-"),
            Domain::Ai => !key.starts_with("battery-"),
        }
    }

    /// The bare `YYYY-MM-DD` part of a (possibly prefixed) date key.
    pub fn bare_date(key: &str) -> &str {
        key.strip_prefix("battery-").unwrap_or(key)
    }
}

/// A fetched article. Immutable once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NewsItem {
    /// Stable id derived from the article URL.
    pub fn stable_id(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        hex_prefix(&digest, 8)
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

/// A synthesized brief entry, produced by the LLM from one news cluster and
/// checked against history before acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueItem {
    pub headline: String,
    /// Exactly 3 by convention; the generation prompt enforces it.
    pub key_facts: Vec<String>,
    pub insight: String,
    pub framework: String,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_line_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

/// A dated collection of issues. One per calendar day per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefReport {
    pub id: String,
    /// `YYYY-MM-DD`, prefixed for the battery domain.
    pub date: String,
    pub day_of_week: String,
    pub issues: Vec<IssueItem>,
    pub total_issues: usize,
    pub generated_at: String,
    pub markdown: String,
}

/// What a visitor or admin did; append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    ViewBrief,
    ClickIssue,
    ShareIssue,
    GenerateTrendReport,
    ClickSource,
    ViewTrendReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub action: LogAction,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Phases of a long-running generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Collecting,
    Clustering,
    Generating,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Polling-friendly status record written into the key/value store by the
/// background task. Progress never decreases; terminal states are final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_count: Option<usize>,
}

impl JobStatus {
    pub fn running(status: JobState, progress: u8) -> Self {
        Self {
            status,
            progress,
            message: None,
            report: None,
            error: None,
            cluster_count: None,
            issue_count: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn completed(report: impl Into<String>) -> Self {
        Self {
            status: JobState::Completed,
            progress: 100,
            message: None,
            report: Some(report.into()),
            error: None,
            cluster_count: None,
            issue_count: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobState::Failed,
            progress: 100,
            message: None,
            report: None,
            error: Some(error.into()),
            cluster_count: None,
            issue_count: None,
        }
    }
}

/// Uniform JSON envelope returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic_and_short() {
        let a = NewsItem::stable_id("https://example.com/story");
        let b = NewsItem::stable_id("https://example.com/story");
        let c = NewsItem::stable_id("https://example.com/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn domain_date_keys_are_zero_padded_and_prefixed() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(Domain::Ai.date_key(d), "2026-03-07");
        assert_eq!(Domain::Battery.date_key(d), "battery-2026-03-07");
        assert!(Domain::Battery.owns_date_key("battery-2026-03-07"));
        assert!(!Domain::Ai.owns_date_key("battery-2026-03-07"));
        assert_eq!(Domain::bare_date("battery-2026-03-07"), "2026-03-07");
    }

    #[test]
    fn log_action_uses_screaming_snake_on_the_wire() {
        let s = serde_json::to_string(&LogAction::GenerateTrendReport).unwrap();
        assert_eq!(s, "\"GENERATE_TREND_REPORT\"");
    }

    #[test]
    fn job_status_terminal_constructors() {
        let done = JobStatus::completed("# report");
        assert!(done.status.is_terminal());
        assert_eq!(done.progress, 100);
        let failed = JobStatus::failed("boom");
        assert!(failed.status.is_terminal());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
