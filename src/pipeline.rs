//! Daily brief generation: collect → synthesize → dedup → persist.
//! Idempotent per day and domain: an existing brief is returned untouched
//! unless regeneration is forced.

use anyhow::{Context, Result};
use metrics::counter;
use tracing::info;

use crate::ai::issue_gen::IssueGenerator;
use crate::ai::SharedAiClient;
use crate::collect::{collect_all, NewsProvider};
use crate::config::DomainConfig;
use crate::model::BriefReport;
use crate::report::{build_empty_report, build_report};
use crate::store::{today_utc, StorageAdapter};

pub struct GenerateOutcome {
    pub report: BriefReport,
    /// False when the stored brief for the day was returned as-is.
    pub fresh: bool,
}

/// One generation run. Two truly concurrent runs for the same day can both
/// pass the existence check and both write; last write wins. Accepted for
/// the expected single-writer-per-day usage.
pub async fn generate_daily_brief(
    storage: &dyn StorageAdapter,
    ai: &SharedAiClient,
    providers: &[Box<dyn NewsProvider>],
    config: &DomainConfig,
    force: bool,
) -> Result<GenerateOutcome> {
    let today = today_utc();
    let date_key = config.domain.date_key(today);

    if !force {
        if let Some(existing) = storage
            .brief_by_date(&date_key)
            .await
            .context("checking for an existing brief")?
        {
            info!(date = %date_key, "brief already exists; skipping generation");
            return Ok(GenerateOutcome {
                report: existing,
                fresh: false,
            });
        }
    } else {
        info!(date = %date_key, "forced regeneration");
    }

    info!(date = %date_key, "step 1: collecting news");
    let news = collect_all(providers, config).await;

    if news.is_empty() {
        info!("no news collected; saving an empty brief");
        let report = build_empty_report(today, config.domain);
        storage.save_brief(&report).await.context("saving empty brief")?;
        return Ok(GenerateOutcome {
            report,
            fresh: true,
        });
    }

    info!(news = news.len(), "step 2: synthesizing issues");
    let generator = IssueGenerator::new(ai.clone());
    let issues = generator.generate_issues(config, &news, storage).await;

    info!(issues = issues.len(), "step 3: building and saving the report");
    let report = build_report(issues, today, config.domain);
    storage.save_brief(&report).await.context("saving brief")?;
    counter!("briefs_generated_total").increment(1);

    info!(date = %date_key, total = report.total_issues, "brief generation finished");
    Ok(GenerateOutcome {
        report,
        fresh: true,
    })
}
