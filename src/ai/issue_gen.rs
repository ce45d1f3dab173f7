//! Daily issue synthesis: cluster the collected news, skip likely-duplicate
//! clusters before paying for generation, ask the model for one issue per
//! cluster, then run the full dedup gate before acceptance.

use anyhow::{Context, Result};
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::ai::{extract_json_block, GenerateRequest, SharedAiClient};
use crate::ai::semantic::SemanticDuplicateChecker;
use crate::cluster::{cluster_by_key_terms, NewsCluster};
use crate::config::DomainConfig;
use crate::dedup::Deduplicator;
use crate::frameworks::{framework_names, match_frameworks, AnalysisFramework};
use crate::model::{IssueItem, NewsItem};
use crate::similarity::similarity;
use crate::store::StorageAdapter;

pub const MAX_ISSUES_PER_BRIEF: usize = 5;
/// Cluster lead headline vs recent issues; above this the whole cluster is
/// skipped without a generation call.
pub const CLUSTER_PRECHECK_THRESHOLD: f64 = 0.6;
pub const DEDUP_WINDOW_DAYS: u32 = 3;

pub struct IssueGenerator {
    client: SharedAiClient,
}

/// Shape the model is asked to return. `title` is accepted as an alias
/// because models drift on the field name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    #[serde(alias = "title")]
    headline: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    one_line_summary: Option<String>,
    #[serde(default)]
    hashtags: Option<Vec<String>>,
    #[serde(default)]
    key_facts: Vec<String>,
    #[serde(default, alias = "strategicInsight")]
    insight: String,
    /// 1-based indices into the cluster's article list.
    #[serde(default)]
    relevant_source_indices: Vec<usize>,
}

impl IssueGenerator {
    pub fn new(client: SharedAiClient) -> Self {
        Self { client }
    }

    /// Synthesize up to [`MAX_ISSUES_PER_BRIEF`] accepted issues. Failures
    /// local to one cluster are logged and skipped; the batch continues.
    pub async fn generate_issues(
        &self,
        config: &DomainConfig,
        news: &[NewsItem],
        storage: &dyn StorageAdapter,
    ) -> Vec<IssueItem> {
        let clusters =
            cluster_by_key_terms(news, &config.key_terms, &config.fallback_cluster_label);

        let recent = match storage.recent_issues(DEDUP_WINDOW_DAYS, config.domain).await {
            Ok(recent) => recent,
            Err(e) => {
                warn!(error = ?e, "loading recent issues failed; dedup window is empty");
                Vec::new()
            }
        };
        info!(
            recent = recent.len(),
            clusters = clusters.len(),
            "loaded recent issues for deduplication"
        );

        let checker = SemanticDuplicateChecker::new(self.client.clone());
        let dedup = Deduplicator::new(&checker);

        let mut issues = Vec::new();
        for cluster in clusters.into_iter().take(MAX_ISSUES_PER_BRIEF) {
            let Some(lead) = cluster.items.first() else {
                continue;
            };

            let likely_dupe = recent
                .iter()
                .any(|i| similarity(&i.headline, &lead.title) > CLUSTER_PRECHECK_THRESHOLD);
            if likely_dupe {
                info!(cluster = %cluster.label, "skipping likely duplicate cluster");
                continue;
            }

            match self.issue_from_cluster(config, &cluster).await {
                Ok(issue) => {
                    if dedup.is_duplicate(&issue, &recent).await {
                        info!(headline = %issue.headline, "discarded duplicate issue");
                        counter!("issues_discarded_duplicate_total").increment(1);
                        continue;
                    }
                    counter!("issues_generated_total").increment(1);
                    issues.push(issue);
                }
                Err(e) => {
                    warn!(cluster = %cluster.label, error = ?e, "issue generation failed");
                }
            }
        }
        issues
    }

    async fn issue_from_cluster(
        &self,
        config: &DomainConfig,
        cluster: &NewsCluster,
    ) -> Result<IssueItem> {
        let lead = cluster.items.first().context("empty cluster")?;
        let matched = match_frameworks(&config.frameworks, &lead.title, &lead.description);

        let prompt = build_prompt(config, cluster, &matched);
        let response = self.client.generate(GenerateRequest::flash(prompt)).await?;

        let raw = extract_json_block(&response.text).context("no JSON object in model reply")?;
        let parsed: RawIssue = serde_json::from_str(raw).context("parsing issue JSON")?;

        if parsed.headline.trim().is_empty() {
            anyhow::bail!("model returned an empty headline");
        }
        if parsed.key_facts.is_empty() {
            anyhow::bail!("model returned no key facts");
        }

        let sources = select_sources(&parsed, cluster);
        Ok(IssueItem {
            headline: parsed.headline,
            key_facts: parsed.key_facts,
            insight: parsed.insight,
            framework: framework_names(&matched),
            sources,
            category: parsed.category,
            one_line_summary: parsed.one_line_summary,
            hashtags: parsed.hashtags,
        })
    }
}

fn build_prompt(
    config: &DomainConfig,
    cluster: &NewsCluster,
    matched: &[&AnalysisFramework],
) -> String {
    let indexed: String = cluster
        .items
        .iter()
        .enumerate()
        .map(|(i, n)| format!("[{}] Title: {}\nSource: {}", i + 1, n.title, n.url))
        .collect::<Vec<_>>()
        .join("\n\n");

    let frameworks: String = matched
        .iter()
        .map(|f| format!("- {}: {}", f.name, f.insight_template))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a {role}. Synthesize ONE briefing issue from the news cluster below.\n\n\
         ## News Cluster (indexed)\n{indexed}\n\n\
         ## Applied Analysis Frameworks\n{frameworks}\n\n\
         ## Output Format (JSON)\n\
         {{\n  \"headline\": \"English headline, under 50 characters, single core topic\",\n  \
         \"category\": \"short category label\",\n  \
         \"oneLineSummary\": \"one sentence, under 150 characters\",\n  \
         \"hashtags\": [\"#Keyword1\", \"#Keyword2\", \"#Keyword3\"],\n  \
         \"keyFacts\": [\"fact 1 with concrete numbers or names\", \"fact 2\", \"fact 3\"],\n  \
         \"insight\": \"strategic implications through the applied frameworks, about 300 characters\",\n  \
         \"relevantSourceIndices\": [1, 2]\n}}\n\n\
         ## Rules\n\
         - Exactly 3 keyFacts; one single topic per issue; dry professional tone.\n\
         - relevantSourceIndices lists ONLY the article numbers directly behind this issue.\n\
         - Output pure JSON only.",
        role = config.analyst_role,
    )
}

/// Cited sources: the model's picks (bounds-checked), then a code-level
/// headline-keyword pass. The lead article always survives so an issue is
/// never published without its primary citation.
fn select_sources(parsed: &RawIssue, cluster: &NewsCluster) -> Vec<String> {
    let picked: Vec<String> = parsed
        .relevant_source_indices
        .iter()
        .filter_map(|&i| cluster.items.get(i.wrapping_sub(1)).map(|n| n.url.clone()))
        .collect();

    let candidates: Vec<String> = if picked.is_empty() {
        cluster.items.iter().map(|n| n.url.clone()).collect()
    } else {
        picked
    };

    let keywords: Vec<String> = parsed
        .headline
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(|w| w.to_lowercase())
        .collect();

    let kept: Vec<String> = candidates
        .into_iter()
        .enumerate()
        .filter(|(idx, url)| {
            let Some(article) = cluster.items.iter().find(|n| &n.url == url) else {
                return false;
            };
            if *idx == 0 {
                return true;
            }
            let content = format!("{} {}", article.title, article.description).to_lowercase();
            keywords.iter().any(|kw| content.contains(kw.as_str()))
        })
        .map(|(_, url)| url)
        .collect();

    if kept.is_empty() {
        cluster
            .items
            .first()
            .map(|n| vec![n.url.clone()])
            .unwrap_or_default()
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn news(title: &str, url: &str) -> NewsItem {
        NewsItem {
            id: NewsItem::stable_id(url),
            title: title.to_string(),
            description: String::new(),
            url: url.to_string(),
            source: "Test".into(),
            published_at: Utc::now(),
            category: None,
        }
    }

    fn raw(headline: &str, indices: &[usize]) -> RawIssue {
        RawIssue {
            headline: headline.to_string(),
            category: None,
            one_line_summary: None,
            hashtags: None,
            key_facts: vec!["a".into(), "b".into(), "c".into()],
            insight: "insight".into(),
            relevant_source_indices: indices.to_vec(),
        }
    }

    #[test]
    fn raw_issue_accepts_title_alias() {
        let parsed: RawIssue = serde_json::from_str(
            r#"{"title": "Headline", "keyFacts": ["x"], "insight": "y", "relevantSourceIndices": [1]}"#,
        )
        .unwrap();
        assert_eq!(parsed.headline, "Headline");
        assert_eq!(parsed.relevant_source_indices, vec![1]);
    }

    #[test]
    fn model_picked_indices_resolve_to_urls() {
        let cluster = NewsCluster {
            label: "Stripe".into(),
            items: vec![
                news("Stripe ships new API", "https://a.example/1"),
                news("Unrelated market note", "https://a.example/2"),
            ],
        };
        let sources = select_sources(&raw("Stripe ships new API", &[1]), &cluster);
        assert_eq!(sources, vec!["https://a.example/1".to_string()]);
    }

    #[test]
    fn out_of_range_indices_fall_back_to_keyword_filter() {
        let cluster = NewsCluster {
            label: "Stripe".into(),
            items: vec![
                news("Stripe ships new API", "https://a.example/1"),
                news("Stripe partner bank expands", "https://a.example/2"),
                news("Cobalt mine output", "https://a.example/3"),
            ],
        };
        let sources = select_sources(&raw("Stripe ships new API", &[9]), &cluster);
        // Lead always kept; second survives via the "stripe" keyword; third
        // shares no headline keyword.
        assert_eq!(
            sources,
            vec![
                "https://a.example/1".to_string(),
                "https://a.example/2".to_string()
            ]
        );
    }

    #[test]
    fn lead_article_always_survives() {
        let cluster = NewsCluster {
            label: "Other".into(),
            items: vec![news("Completely different words", "https://a.example/1")],
        };
        let sources = select_sources(&raw("zz", &[]), &cluster);
        assert_eq!(sources, vec!["https://a.example/1".to_string()]);
    }
}
