//! Brief assembly and plain-text rendering.

use chrono::{Datelike, NaiveDate, Utc, Weekday};

use crate::model::{BriefReport, Domain, IssueItem};

const BANNER: &str =
    "================================================================================";

fn day_of_week_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Build the dated report wrapper around a set of accepted issues.
pub fn build_report(issues: Vec<IssueItem>, date: NaiveDate, domain: Domain) -> BriefReport {
    let date_key = domain.date_key(date);
    let day_of_week = day_of_week_name(date);
    let markdown = render_markdown(&issues, date, day_of_week);

    BriefReport {
        id: format!("brief-{date_key}"),
        date: date_key,
        day_of_week: day_of_week.to_string(),
        total_issues: issues.len(),
        issues,
        generated_at: Utc::now().to_rfc3339(),
        markdown,
    }
}

/// Empty report saved when collection produced nothing, so the day still
/// has an entry and generation stays idempotent.
pub fn build_empty_report(date: NaiveDate, domain: Domain) -> BriefReport {
    build_report(Vec::new(), date, domain)
}

fn render_markdown(issues: &[IssueItem], date: NaiveDate, day_of_week: &str) -> String {
    let mut md = String::new();
    md.push_str(BANNER);
    md.push('\n');
    md.push_str(&format!(
        "{} ({day_of_week})\nDaily Brief\n",
        date.format("%B %-d, %Y")
    ));
    md.push_str(BANNER);
    md.push_str("\n\n");

    if issues.is_empty() {
        md.push_str("No notable issues were collected today.\n\n");
    } else {
        for (i, issue) in issues.iter().enumerate() {
            md.push_str(&format!("Issue {}. {}\n", i + 1, issue.headline));
            for fact in &issue.key_facts {
                md.push_str(&format!("- {fact}\n"));
            }
            md.push_str(&format!("Insight: {}\nSources:\n", issue.insight));
            for source in &issue.sources {
                md.push_str(source);
                md.push('\n');
            }
            md.push('\n');
        }
    }

    md.push_str(BANNER);
    md.push('\n');
    md.push_str(&format!(
        "[{} issues | analysis date: {}]\n",
        issues.len(),
        date.format("%Y-%m-%d")
    ));
    md.push_str(BANNER);
    md
}
