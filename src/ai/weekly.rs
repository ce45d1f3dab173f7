//! Weekly synthesis: AI-assisted clustering of the trailing week of issues,
//! then a pro-tier report with flash fallback when the pro tier is
//! unavailable.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::ai::{
    extract_json_block, sources_section, strip_sources_section, GenerateRequest, ModelTier,
    SharedAiClient,
};
use crate::config::DomainConfig;
use crate::model::IssueItem;

pub const MAX_CLUSTERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCluster {
    pub cluster_name: String,
    pub theme_description: String,
    /// 0-based indices into the issue list handed to the clusterer.
    pub issue_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ClusterReply {
    #[serde(default)]
    clusters: Vec<IssueCluster>,
}

/// Group related issues into up to [`MAX_CLUSTERS`] themes. Any failure
/// falls back to one catch-all cluster so the weekly report still runs.
pub async fn cluster_issues_by_ai(
    client: &SharedAiClient,
    issues: &[IssueItem],
    config: &DomainConfig,
) -> Vec<IssueCluster> {
    if issues.is_empty() {
        return Vec::new();
    }

    match try_cluster(client, issues, config).await {
        Ok(clusters) if !clusters.is_empty() => clusters,
        Ok(_) => fallback_cluster(issues),
        Err(e) => {
            warn!(error = ?e, "AI clustering failed; using a single catch-all cluster");
            fallback_cluster(issues)
        }
    }
}

async fn try_cluster(
    client: &SharedAiClient,
    issues: &[IssueItem],
    config: &DomainConfig,
) -> Result<Vec<IssueCluster>> {
    let issue_list: String = issues
        .iter()
        .enumerate()
        .map(|(idx, issue)| {
            let facts: Vec<&str> = issue.key_facts.iter().take(2).map(String::as_str).collect();
            format!("[{idx}] {}\n    Facts: {}", issue.headline, facts.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "You are a {role}. Analyze the following {count} news issues and group highly \
         related issues into clusters.\n\n\
         ## Rules\n\
         1. Each cluster should contain at least 2 issues.\n\
         2. Independent issues go into an \"Other Key Trends\" cluster.\n\
         3. Create at most {max} clusters; every issue belongs to at least one cluster.\n\
         4. Output ONLY JSON.\n\n\
         ## Issues\n{issue_list}\n\n\
         ## Output JSON Schema\n\
         {{\"clusters\": [{{\"clusterName\": \"theme name under 30 characters\", \
         \"themeDescription\": \"one sentence\", \"issueIndices\": [0, 2, 5]}}]}}",
        role = config.analyst_role,
        count = issues.len(),
        max = MAX_CLUSTERS,
    );

    let response = client.generate(GenerateRequest::flash(prompt)).await?;
    let raw = extract_json_block(&response.text).context("no JSON in clustering reply")?;
    let parsed: ClusterReply = serde_json::from_str(raw).context("parsing clustering JSON")?;

    // Out-of-bounds indices are a model hallucination; drop them, and drop
    // clusters they leave empty.
    Ok(parsed
        .clusters
        .into_iter()
        .take(MAX_CLUSTERS)
        .map(|mut c| {
            c.issue_indices.retain(|&i| i < issues.len());
            c
        })
        .filter(|c| !c.issue_indices.is_empty())
        .collect())
}

fn fallback_cluster(issues: &[IssueItem]) -> Vec<IssueCluster> {
    vec![IssueCluster {
        cluster_name: "Weekly Comprehensive Trends".to_string(),
        theme_description: "Comprehensive analysis of key trends over the last 7 days".to_string(),
        issue_indices: (0..issues.len()).collect(),
    }]
}

const SYSTEM_PROMPT: &str = "You are a veteran industry chief strategist and data scientist. \
Do not read issues fragmentally: find structural linkages across the clusters and predict \
the larger industrial flow. Search the web to synthesize, validate whether changes are noise \
or an inflection point, and build forward-looking scenarios. Quantitative data is mandatory; \
concise English bullet points only. Structure: an Executive Summary ([Top Strategic Signal], \
[Converged Mega Trend], [Strategic Recommendation]), a Structural Cluster Analysis per \
cluster with [Fact]/[Strategic Analysis]/[Structural Linkage], Second-Order Economic \
Insights, Professional Implications, Risks & Uncertainties, a Strategic Watchlist, and a \
final '## ■ Sources' section (the system rewrites it).";

/// Synthesize the weekly report from clustered issues. The pro tier is
/// tried first; a flash retry keeps the job alive under pro-tier outages,
/// flagged with a note at the top of the report.
pub async fn generate_weekly_report(
    client: &SharedAiClient,
    clusters: &[IssueCluster],
    issues: &[IssueItem],
    config: &DomainConfig,
) -> Result<String> {
    let cluster_context: String = clusters
        .iter()
        .enumerate()
        .map(|(c_idx, cluster)| {
            let details: String = cluster
                .issue_indices
                .iter()
                .filter_map(|&i| issues.get(i))
                .enumerate()
                .map(|(i_idx, issue)| {
                    format!(
                        "  [Issue {}] {}\n  - Key Facts: {}\n  - Insight: {}\n  - Sources: {}",
                        i_idx + 1,
                        issue.headline,
                        issue.key_facts.join(" / "),
                        issue.insight,
                        if issue.sources.is_empty() {
                            "none".to_string()
                        } else {
                            issue.sources.join(", ")
                        },
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "### Cluster {}: {}\nTheme: {}\nIssues Included: {}\n{}",
                c_idx + 1,
                cluster.cluster_name,
                cluster.theme_description,
                cluster.issue_indices.len(),
                details,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n");

    let user_prompt = format!(
        "# Weekly Report Generation Request ({domain})\n\n\
         ## Total Issues: {issue_count}\n## Number of Clusters: {cluster_count}\n\n---\n\
         ## Issue Data by Cluster\n\n{cluster_context}\n\n---\n\
         Write a comprehensive weekly deep-dive report based on the cluster data above. \
         Search the web first.",
        domain = config.display_name,
        issue_count = issues.len(),
        cluster_count = clusters.len(),
    );

    info!(
        clusters = clusters.len(),
        issues = issues.len(),
        "starting weekly report generation"
    );

    let request = GenerateRequest::pro(user_prompt)
        .with_system(SYSTEM_PROMPT)
        .with_web_search();

    let (response, degraded) = match client.generate(request.clone()).await {
        Ok(response) => (response, false),
        Err(primary) => {
            warn!(error = ?primary, "pro tier failed; retrying weekly report on flash");
            let response = client
                .generate(request.with_tier(ModelTier::Flash))
                .await
                .context("weekly report generation (flash fallback)")?;
            (response, true)
        }
    };

    let mut body = strip_sources_section(&response.text);
    if degraded {
        body = format!(
            "> [!NOTE]\n> Generated on a reduced model tier due to service load; \
             analysis depth may vary.\n\n{body}"
        );
    }

    let brief_sources: Vec<String> = issues.iter().flat_map(|i| i.sources.clone()).collect();
    let section = sources_section(&brief_sources, &response.grounding_urls);
    Ok(format!("{body}\n\n{section}"))
}
