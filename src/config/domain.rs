//! Per-domain content configuration, parsed once from embedded TOML.
//!
//! The cluster key terms and the analysis frameworks live in the same file:
//! the issue prompt names the matched frameworks and the clusters are
//! labeled by the key terms, so the two lists must evolve together.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::frameworks::AnalysisFramework;
use crate::model::Domain;

#[derive(Debug, Clone, Deserialize)]
pub struct RssFeed {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePriority {
    pub host: String,
    pub score: i64,
}

const DEFAULT_SOURCE_SCORE: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub domain: Domain,
    pub display_name: String,
    /// Role line fed into the synthesis prompts.
    pub analyst_role: String,
    /// Search keywords for the keyword-driven collectors.
    pub keywords: Vec<String>,
    /// Cluster bucket labels, scanned in priority order.
    pub key_terms: Vec<String>,
    pub fallback_cluster_label: String,
    pub max_age_hours: u64,
    pub feeds: Vec<RssFeed>,
    pub exclude_keywords: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub source_priority: Vec<SourcePriority>,
    pub frameworks: Vec<AnalysisFramework>,
    #[serde(skip)]
    compiled_patterns: Vec<Regex>,
}

impl DomainConfig {
    fn load(raw: &str) -> Self {
        let mut config: DomainConfig = toml::from_str(raw).expect("valid domain config");
        config.compiled_patterns = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid exclude pattern"))
            .collect();
        config
    }

    pub fn for_domain(domain: Domain) -> &'static DomainConfig {
        match domain {
            Domain::Ai => &FINTECH,
            Domain::Battery => &BATTERY,
        }
    }

    /// Whether an article should be dropped by the exclusion rules.
    pub fn is_excluded(&self, title: &str, description: &str) -> bool {
        let hit_keyword = self
            .exclude_keywords
            .iter()
            .any(|kw| title.contains(kw.as_str()) || description.contains(kw.as_str()));
        if hit_keyword {
            return true;
        }
        self.compiled_patterns
            .iter()
            .any(|re| re.is_match(title) || re.is_match(description))
    }

    /// Priority score for an article URL; unknown hosts rank mid-field.
    pub fn source_score(&self, url: &str) -> i64 {
        self.source_priority
            .iter()
            .find(|p| url.contains(&p.host))
            .map(|p| p.score)
            .unwrap_or(DEFAULT_SOURCE_SCORE)
    }
}

static FINTECH: Lazy<DomainConfig> =
    Lazy::new(|| DomainConfig::load(include_str!("../../config/fintech.toml")));

static BATTERY: Lazy<DomainConfig> =
    Lazy::new(|| DomainConfig::load(include_str!("../../config/battery.toml")));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_domain_configs_parse() {
        let fintech = DomainConfig::for_domain(Domain::Ai);
        assert_eq!(fintech.domain, Domain::Ai);
        assert!(!fintech.key_terms.is_empty());
        assert!(!fintech.frameworks.is_empty());
        assert!(!fintech.feeds.is_empty());

        let battery = DomainConfig::for_domain(Domain::Battery);
        assert_eq!(battery.domain, Domain::Battery);
        assert!(!battery.key_terms.is_empty());
    }

    #[test]
    fn exclusion_rules_apply() {
        let fintech = DomainConfig::for_domain(Domain::Ai);
        assert!(fintech.is_excluded("Sponsored: buy now", ""));
        assert!(!fintech.is_excluded("Stripe ships a new API", "payments"));
    }

    #[test]
    fn known_hosts_outrank_unknown_ones() {
        let fintech = DomainConfig::for_domain(Domain::Ai);
        let known = fintech.source_score("https://www.finextra.com/story/1");
        let unknown = fintech.source_score("https://example.org/post");
        assert!(known > unknown);
        assert_eq!(unknown, DEFAULT_SOURCE_SCORE);
    }
}
