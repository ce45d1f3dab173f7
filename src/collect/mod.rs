//! News collection: provider seam, per-source error isolation, and the
//! filter/dedup/rank pass that turns raw fetches into a clean batch.

pub mod rss;
pub mod search;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{DomainConfig, SearchKeys};
use crate::model::NewsItem;
use crate::similarity::similarity;

/// Keyword-driven collectors only search the top few keywords to stay
/// inside API quotas.
const SEARCH_KEYWORD_CAP: usize = 5;
/// Titles above this Jaccard similarity are treated as the same story.
const TITLE_DEDUP_THRESHOLD: f64 = 0.7;

/// One upstream news source. Failures stay local to the provider.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> String;
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_items_total", "Items fetched from providers.");
        describe_counter!("collect_kept_total", "Items kept after filtering + dedup.");
        describe_counter!(
            "collect_filtered_total",
            "Items dropped by age/exclusion rules."
        );
        describe_counter!("collect_dedup_total", "Items dropped as duplicates.");
        describe_counter!("provider_errors_total", "Provider fetch/parse errors.");
    });
}

/// Providers for a domain: its RSS feeds, a Google News search per top
/// keyword, and the paid search APIs when their keys are configured.
pub fn build_providers(config: &DomainConfig, keys: &SearchKeys) -> Vec<Box<dyn NewsProvider>> {
    let mut providers: Vec<Box<dyn NewsProvider>> = Vec::new();

    for feed in &config.feeds {
        providers.push(Box::new(rss::RssFeedProvider::new(&feed.name, &feed.url)));
    }
    for keyword in config.keywords.iter().take(SEARCH_KEYWORD_CAP) {
        providers.push(Box::new(rss::GoogleNewsProvider::new(keyword)));
    }
    match &keys.brave {
        Some(key) => {
            for keyword in config.keywords.iter().take(SEARCH_KEYWORD_CAP) {
                providers.push(Box::new(search::BraveSearchProvider::new(keyword, key)));
            }
        }
        None => info!("Brave API key not configured; skipping"),
    }
    match &keys.tavily {
        Some(key) => {
            for keyword in config.keywords.iter().take(SEARCH_KEYWORD_CAP) {
                providers.push(Box::new(search::TavilySearchProvider::new(keyword, key)));
            }
        }
        None => info!("Tavily API key not configured; skipping"),
    }

    providers
}

/// Run every provider, then filter, deduplicate and rank the batch.
/// One failing source never aborts the run.
pub async fn collect_all(
    providers: &[Box<dyn NewsProvider>],
    config: &DomainConfig,
) -> Vec<NewsItem> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for provider in providers {
        match provider.fetch_latest().await {
            Ok(mut items) => {
                info!(provider = %provider.name(), items = items.len(), "provider fetch ok");
                raw.append(&mut items);
            }
            Err(e) => {
                warn!(provider = %provider.name(), error = ?e, "provider error");
                counter!("provider_errors_total").increment(1);
            }
        }
    }
    counter!("collect_items_total").increment(raw.len() as u64);

    let (mut kept, filtered, deduped) = filter_and_deduplicate(raw, config);
    sort_by_relevance(&mut kept, config);

    counter!("collect_kept_total").increment(kept.len() as u64);
    counter!("collect_filtered_total").increment(filtered as u64);
    counter!("collect_dedup_total").increment(deduped as u64);
    info!(
        kept = kept.len(),
        filtered, deduped, "news collection finished"
    );
    kept
}

/// Drop stale/excluded items, then dedup by URL and by title similarity.
/// Returns (kept, filtered_count, dedup_count).
pub fn filter_and_deduplicate(
    items: Vec<NewsItem>,
    config: &DomainConfig,
) -> (Vec<NewsItem>, usize, usize) {
    let max_age = Duration::hours(config.max_age_hours as i64);
    let now = Utc::now();

    let mut seen_urls: Vec<String> = Vec::new();
    let mut seen_titles: Vec<String> = Vec::new();
    let mut kept = Vec::new();
    let mut filtered = 0usize;
    let mut deduped = 0usize;

    for item in items {
        if now - item.published_at > max_age {
            filtered += 1;
            continue;
        }
        if config.is_excluded(&item.title, &item.description) {
            filtered += 1;
            continue;
        }
        if seen_urls.contains(&item.url) {
            deduped += 1;
            continue;
        }
        let duplicate_title = seen_titles
            .iter()
            .any(|t| similarity(t, &item.title) > TITLE_DEDUP_THRESHOLD);
        if duplicate_title {
            deduped += 1;
            continue;
        }

        seen_urls.push(item.url.clone());
        seen_titles.push(item.title.clone());
        kept.push(item);
    }

    (kept, filtered, deduped)
}

/// Source-priority score first, then recency.
pub fn sort_by_relevance(items: &mut [NewsItem], config: &DomainConfig) {
    items.sort_by(|a, b| {
        config
            .source_score(&b.url)
            .cmp(&config.source_score(&a.url))
            .then(b.published_at.cmp(&a.published_at))
    });
}

/// Normalize fetched text: decode HTML entities, strip tags and stray
/// markup, collapse whitespace, cap the length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Domain;
    use chrono::Utc;

    fn item(title: &str, url: &str, hours_old: i64) -> NewsItem {
        NewsItem {
            id: NewsItem::stable_id(url),
            title: title.to_string(),
            description: String::new(),
            url: url.to_string(),
            source: "Test".into(),
            published_at: Utc::now() - Duration::hours(hours_old),
            category: None,
        }
    }

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>  ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn stale_items_are_filtered() {
        let config = DomainConfig::for_domain(Domain::Ai);
        let items = vec![
            item("Fresh story", "https://a.example/1", 1),
            item("Stale story", "https://a.example/2", 48),
        ];
        let (kept, filtered, _) = filter_and_deduplicate(items, config);
        assert_eq!(kept.len(), 1);
        assert_eq!(filtered, 1);
        assert_eq!(kept[0].url, "https://a.example/1");
    }

    #[test]
    fn url_and_near_title_duplicates_are_dropped() {
        let config = DomainConfig::for_domain(Domain::Ai);
        let items = vec![
            item("Stripe launches treasury product", "https://a.example/1", 1),
            item("Stripe launches treasury product", "https://a.example/1", 1),
            item(
                "Stripe launches new treasury product",
                "https://b.example/2",
                1,
            ),
            item("Cobalt prices fall sharply", "https://c.example/3", 1),
        ];
        let (kept, _, deduped) = filter_and_deduplicate(items, config);
        assert_eq!(kept.len(), 2);
        assert_eq!(deduped, 2);
    }

    #[test]
    fn ranking_prefers_priority_hosts_then_recency() {
        let config = DomainConfig::for_domain(Domain::Ai);
        let mut items = vec![
            item("B", "https://unknown.example/post", 1),
            item("A", "https://www.finextra.com/story", 5),
        ];
        sort_by_relevance(&mut items, config);
        assert_eq!(items[0].title, "A");
    }
}
