//! Analysis-framework matching: picks the strategic lenses an issue is
//! written through. Frameworks live in the domain config next to the
//! cluster key terms so the two lists cannot drift apart.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisFramework {
    pub name: String,
    pub triggers: Vec<String>,
    pub insight_template: String,
}

/// Top 2 frameworks by trigger-hit count over title+description; falls back
/// to the domain's first framework when nothing matches. Stable sort keeps
/// config order for equal scores.
pub fn match_frameworks<'a>(
    frameworks: &'a [AnalysisFramework],
    title: &str,
    description: &str,
) -> Vec<&'a AnalysisFramework> {
    let text = format!("{title} {description}").to_lowercase();

    let mut matches: Vec<(&AnalysisFramework, usize)> = frameworks
        .iter()
        .filter_map(|f| {
            let score = f
                .triggers
                .iter()
                .filter(|t| text.contains(&t.to_lowercase()))
                .count();
            (score > 0).then_some((f, score))
        })
        .collect();

    if matches.is_empty() {
        return frameworks.first().into_iter().collect();
    }

    matches.sort_by(|a, b| b.1.cmp(&a.1));
    matches.into_iter().take(2).map(|(f, _)| f).collect()
}

/// Comma-joined names, the form stored on `IssueItem::framework`.
pub fn framework_names(matched: &[&AnalysisFramework]) -> String {
    matched
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
