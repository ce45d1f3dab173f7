//! Greedy key-term clustering of collected news.
//!
//! Single pass, O(items × terms): each item lands in the bucket of the
//! first key term (fixed priority order) found in its lowercased
//! title+description, or in the domain's generic fallback bucket. Output is
//! ordered by bucket size descending; the stable sort leaves earlier-seen
//! buckets first on ties, so repeated runs over the same input are identical.

use std::collections::HashMap;

use crate::model::NewsItem;

#[derive(Debug, Clone, PartialEq)]
pub struct NewsCluster {
    pub label: String,
    pub items: Vec<NewsItem>,
}

pub fn cluster_by_key_terms(
    items: &[NewsItem],
    key_terms: &[String],
    fallback_label: &str,
) -> Vec<NewsCluster> {
    let lowered: Vec<String> = key_terms.iter().map(|t| t.to_lowercase()).collect();

    let mut buckets: Vec<NewsCluster> = Vec::new();
    let mut index: HashMap<usize, usize> = HashMap::new(); // term idx -> bucket idx
    let mut fallback_idx: Option<usize> = None;

    for item in items {
        let haystack = format!("{} {}", item.title, item.description).to_lowercase();
        let hit = lowered.iter().position(|t| haystack.contains(t.as_str()));

        let bucket = match hit {
            Some(term_idx) => *index.entry(term_idx).or_insert_with(|| {
                buckets.push(NewsCluster {
                    label: key_terms[term_idx].clone(),
                    items: Vec::new(),
                });
                buckets.len() - 1
            }),
            None => *fallback_idx.get_or_insert_with(|| {
                buckets.push(NewsCluster {
                    label: fallback_label.to_string(),
                    items: Vec::new(),
                });
                buckets.len() - 1
            }),
        };
        buckets[bucket].items.push(item.clone());
    }

    buckets.sort_by(|a, b| b.items.len().cmp(&a.items.len()));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn news(title: &str, description: &str) -> NewsItem {
        NewsItem {
            id: NewsItem::stable_id(title),
            title: title.to_string(),
            description: description.to_string(),
            url: format!("https://example.com/{}", title.len()),
            source: "Test".into(),
            published_at: Utc::now(),
            category: None,
        }
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_matching_term_wins() {
        let items = vec![news("Stripe adopts stablecoin payouts", "")];
        // "Stripe" comes before "Stablecoin" in priority order.
        let clusters = cluster_by_key_terms(&items, &terms(&["Stripe", "Stablecoin"]), "Other");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].label, "Stripe");
    }

    #[test]
    fn unmatched_items_fall_into_the_generic_bucket() {
        let items = vec![news("Quarterly macro outlook", "nothing fintech here")];
        let clusters = cluster_by_key_terms(&items, &terms(&["Stripe"]), "Global FinTech Trends");
        assert_eq!(clusters[0].label, "Global FinTech Trends");
    }

    #[test]
    fn buckets_are_ordered_by_size_descending() {
        let items = vec![
            news("PayPal fees update", ""),
            news("Stripe raises round", ""),
            news("Stripe ships new API", ""),
            news("Stripe partners with bank", ""),
            news("PayPal expands checkout", ""),
        ];
        let clusters = cluster_by_key_terms(&items, &terms(&["Stripe", "PayPal"]), "Other");
        assert_eq!(clusters[0].label, "Stripe");
        assert_eq!(clusters[0].items.len(), 3);
        assert_eq!(clusters[1].label, "PayPal");
        assert_eq!(clusters[1].items.len(), 2);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let items = vec![
            news("Stripe ships new API", ""),
            news("PayPal expands checkout", ""),
            news("Regulation draft published", "open banking rules"),
            news("Unrelated piece", ""),
        ];
        let key_terms = terms(&["Stripe", "PayPal", "Regulation"]);
        let a = cluster_by_key_terms(&items, &key_terms, "Other");
        let b = cluster_by_key_terms(&items, &key_terms, "Other");
        assert_eq!(a, b);
    }

    #[test]
    fn equal_sized_buckets_keep_first_seen_order() {
        let items = vec![
            news("PayPal expands checkout", ""),
            news("Stripe ships new API", ""),
        ];
        let clusters = cluster_by_key_terms(&items, &terms(&["Stripe", "PayPal"]), "Other");
        // Both singletons: insertion order (PayPal first seen) is preserved
        // by the stable sort.
        assert_eq!(clusters[0].label, "PayPal");
        assert_eq!(clusters[1].label, "Stripe");
    }
}
