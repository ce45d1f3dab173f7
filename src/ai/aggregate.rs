//! User-assembled ("cart") reports: selected issues plus optional manual
//! URLs and pasted texts, synthesized into one aggregated report.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::{GenerateRequest, SharedAiClient};
use crate::collect::normalize_text;
use crate::model::IssueItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Weekly,
    Monthly,
    #[default]
    Custom,
}

#[derive(Debug, Clone)]
pub struct ManualSource {
    pub url: String,
    pub title: String,
    pub content: String,
}

const MANUAL_CONTENT_CAP: usize = 2_000;
const PASTED_TEXT_CAP: usize = 3_000;

/// Fetch and text-extract manual source URLs. Failures are per-URL: one
/// unreachable page never sinks the report.
pub async fn fetch_content_from_urls(urls: &[String]) -> Vec<ManualSource> {
    let http = match reqwest::Client::builder()
        .user_agent(concat!("daily-brief/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            warn!(error = ?e, "building manual-source client failed");
            return Vec::new();
        }
    };

    let mut results = Vec::new();
    for url in urls.iter().filter(|u| !u.is_empty()) {
        match fetch_one(&http, url).await {
            Ok(source) => results.push(source),
            Err(e) => warn!(url = %url, error = ?e, "manual source fetch failed"),
        }
    }
    results
}

async fn fetch_one(http: &reqwest::Client, url: &str) -> Result<ManualSource> {
    let resp = http.get(url).send().await.context("requesting page")?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("page returned status {status}");
    }
    let html = resp.text().await.context("reading page body")?;

    let title = extract_title(&html).unwrap_or_else(|| "Untitled Source".to_string());
    let mut content = normalize_text(&html);
    content.truncate_to_chars(MANUAL_CONTENT_CAP);

    Ok(ManualSource {
        url: url.to_string(),
        title,
        content,
    })
}

fn extract_title(html: &str) -> Option<String> {
    use once_cell::sync::OnceCell;
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex")
    });
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| normalize_text(m.as_str()))
        .filter(|t| !t.is_empty())
}

trait TruncateChars {
    fn truncate_to_chars(&mut self, max: usize);
}

impl TruncateChars for String {
    fn truncate_to_chars(&mut self, max: usize) {
        if self.chars().count() > max {
            *self = self.chars().take(max).collect();
        }
    }
}

/// One aggregated report over the user's selection. Pro tier with a flash
/// fallback, like the other long-form reports.
pub async fn generate_aggregated_report(
    client: &SharedAiClient,
    issues: &[IssueItem],
    manual_urls: &[String],
    manual_texts: &[String],
    _report_type: ReportType,
    period_label: &str,
) -> Result<String> {
    let manual_sources = fetch_content_from_urls(manual_urls).await;

    let issues_context: String = issues
        .iter()
        .enumerate()
        .map(|(idx, issue)| {
            format!(
                "[Issue {}]\nTitle: {}\nKey Facts:\n{}\nInsight: {}\nSources:\n{}",
                idx + 1,
                issue.headline,
                issue
                    .key_facts
                    .iter()
                    .map(|f| format!("- {f}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
                issue.insight,
                if issue.sources.is_empty() {
                    "- none".to_string()
                } else {
                    issue
                        .sources
                        .iter()
                        .map(|s| format!("- {s}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let manual_context: String = manual_sources
        .iter()
        .enumerate()
        .map(|(idx, src)| {
            format!(
                "[Manual Source {}]\nTitle: {}\nURL: {}\nContent Summary:\n{}",
                idx + 1,
                src.title,
                src.url,
                src.content,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let pasted: Vec<String> = manual_texts
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            let mut t = t.clone();
            t.truncate_to_chars(PASTED_TEXT_CAP);
            t
        })
        .collect();
    let pasted_context: String = pasted
        .iter()
        .enumerate()
        .map(|(idx, text)| format!("[Pasted Text {}]\nContent:\n{}", idx + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "You are a strategic industry analyst. Using the brief issues, the extra collected \
         sources and the pasted original texts below, write the \"{period_label} aggregated \
         deep-dive report\".\n\n\
         ### Input Data\n\
         1. Brief issues ({issue_count}):\n{issues_context}\n\n\
         2. Additional sources ({manual_count}):\n{manual_context}\n\n\
         3. Pasted texts ({pasted_count}):\n{pasted_block}\n\n\
         ### Rules\n\
         - Concise bullet-point style only; no invented facts; no action items.\n\
         - Sections, each marked with ■: Executive Summary ([Signal]/[Change]/[So What]), \
         Key Developments, Core Themes, Implications, Risks & Uncertainties, Watchlist, Sources.",
        issue_count = issues.len(),
        manual_count = manual_sources.len(),
        pasted_count = pasted.len(),
        pasted_block = if pasted_context.is_empty() {
            "(none)"
        } else {
            &pasted_context
        },
    );

    info!(
        issues = issues.len(),
        manual_sources = manual_sources.len(),
        pasted = pasted.len(),
        "starting aggregated report generation"
    );

    match client.generate(GenerateRequest::pro(prompt.clone())).await {
        Ok(response) => Ok(response.text),
        Err(primary) => {
            warn!(error = ?primary, "pro tier failed; retrying aggregated report on flash");
            let response = client
                .generate(GenerateRequest::flash(prompt))
                .await
                .context("aggregated report generation (flash fallback)")?;
            Ok(response.text)
        }
    }
}
