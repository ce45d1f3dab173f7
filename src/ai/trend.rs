//! Deep-dive ("trend") report for a single issue: pro tier with web
//! grounding, then a rebuilt sources section combining the brief's own
//! citations with whatever the grounded call consulted.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::ai::{sources_section, strip_sources_section, GenerateRequest, SharedAiClient};
use crate::model::IssueItem;

const SYSTEM_PROMPT: &str = "You are a veteran strategic industry consultant. Starting from \
the provided brief issue, write a 'Deep Dive' report on its structural changes and ripple \
effects. Search the web first to fact-check and expand the brief, to find counter-arguments, \
and to trace value-chain impact. Use real names, specific numbers and official statements \
only; write concise bullet points in English. Structure: an Executive Summary ([Signal], \
[Change], [So What]), Key Developments with [Fact]/[Analysis] pairs, Core Themes, \
Implications ([Market]/[Tech]/[Comp]/[Policy]), Risks & Uncertainties, a Watchlist, and a \
final '## ■ Sources' section (the system rewrites it).";

pub async fn generate_trend_report(client: &SharedAiClient, issue: &IssueItem) -> Result<String> {
    let urls = if issue.sources.is_empty() {
        "none".to_string()
    } else {
        issue.sources.join("\n")
    };
    let user_prompt = format!(
        "# INPUTS\n- ISSUE_TITLE: {}\n- ISSUE_BULLETS: {}\n- ISSUE_URLS:\n{}\n- TODAY: {}",
        issue.headline,
        issue.key_facts.join(", "),
        urls,
        Utc::now().format("%Y-%m-%d"),
    );

    info!(headline = %issue.headline, "starting trend report generation");
    let response = client
        .generate(
            GenerateRequest::pro(user_prompt)
                .with_system(SYSTEM_PROMPT)
                .with_web_search(),
        )
        .await
        .context("trend report generation")?;

    let body = strip_sources_section(&response.text);
    let section = sources_section(&issue.sources, &response.grounding_urls);
    info!(
        brief_sources = issue.sources.len(),
        grounded = response.grounding_urls.len(),
        "trend report sources rebuilt"
    );
    Ok(format!("{body}\n\n{section}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn report_body_keeps_brief_and_grounded_sources() {
        let mock = Arc::new(MockClient::new());
        mock.push_grounded(
            "# In-Depth Brief Report\ncontent\n\n## ■ Sources\n- [1] stale",
            vec!["https://research.example/paper".to_string()],
        );
        let client: SharedAiClient = mock;

        let issue = IssueItem {
            headline: "Stripe ships new API".into(),
            key_facts: vec!["a".into(), "b".into(), "c".into()],
            insight: "i".into(),
            framework: "Payments".into(),
            sources: vec!["https://finextra.com/story".into()],
            category: None,
            one_line_summary: None,
            hashtags: None,
        };

        let report = generate_trend_report(&client, &issue).await.unwrap();
        assert!(report.starts_with("# In-Depth Brief Report"));
        assert!(!report.contains("stale"));
        assert!(report.contains("[Brief Origin] https://finextra.com/story"));
        assert!(report.contains("[Deep Research] https://research.example/paper"));
    }
}
