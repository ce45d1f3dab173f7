// tests/dedup_gate.rs
//
// End-to-end checks of the duplicate gate: source-overlap boundary,
// headline similarity, empty history, and the classifier escalation band.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use daily_brief::dedup::{Deduplicator, DuplicateClassifier, NoClassifier};
use daily_brief::model::IssueItem;

fn issue(headline: &str, sources: &[&str]) -> IssueItem {
    IssueItem {
        headline: headline.to_string(),
        key_facts: vec!["f1".into(), "f2".into(), "f3".into()],
        insight: "insight".into(),
        framework: "Framework".into(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
        category: None,
        one_line_summary: None,
        hashtags: None,
    }
}

struct ScriptedClassifier {
    answer: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl DuplicateClassifier for ScriptedClassifier {
    async fn is_same_event(&self, _: &IssueItem, _: &IssueItem) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

#[tokio::test]
async fn half_source_overlap_is_flagged_at_the_boundary() {
    // [X, Y] vs [X, Z]: overlap 1 / min(2, 2) = 0.5, exactly at threshold.
    let candidate = issue("Entirely fresh wording here", &["https://x", "https://y"]);
    let history = vec![issue("Old unrelated words entirely", &["https://x", "https://z"])];
    let dedup = Deduplicator::new(&NoClassifier);
    assert!(dedup.is_duplicate(&candidate, &history).await);
}

#[tokio::test]
async fn rephrased_headline_without_shared_sources_is_flagged() {
    let candidate = issue(
        "NVIDIA Stock Reaches Record Highs Again Today",
        &["https://a.example/1"],
    );
    let history = vec![issue(
        "NVIDIA Stock Reaches Record Highs Today",
        &["https://b.example/2"],
    )];
    let dedup = Deduplicator::new(&NoClassifier);
    assert!(dedup.is_duplicate(&candidate, &history).await);
}

#[tokio::test]
async fn unrelated_story_with_its_own_source_passes() {
    let candidate = issue("Stripe expands into Latin America", &["https://a.example/1"]);
    let history = vec![issue(
        "Solid-state battery pilot line announced",
        &["https://b.example/2"],
    )];
    let dedup = Deduplicator::new(&NoClassifier);
    assert!(!dedup.is_duplicate(&candidate, &history).await);
}

#[tokio::test]
async fn empty_history_never_flags() {
    let dedup = Deduplicator::new(&NoClassifier);
    for headline in ["Anything", "At", "All"] {
        assert!(!dedup.is_duplicate(&issue(headline, &["https://x"]), &[]).await);
    }
}

#[tokio::test]
async fn ambiguous_band_is_settled_by_the_classifier() {
    let classifier = ScriptedClassifier {
        answer: true,
        calls: AtomicUsize::new(0),
    };
    let dedup = Deduplicator::new(&classifier);

    // Shared tokens land the pair between the band floor and the headline
    // threshold, so only the classifier can flag it.
    let candidate = issue("Coinbase earnings beat expectations", &["https://a.example/1"]);
    let history = vec![issue(
        "Coinbase quarterly earnings surprise analysts",
        &["https://b.example/2"],
    )];

    assert!(dedup.is_duplicate(&candidate, &history).await);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn classifier_saying_no_lets_the_issue_through() {
    let classifier = ScriptedClassifier {
        answer: false,
        calls: AtomicUsize::new(0),
    };
    let dedup = Deduplicator::new(&classifier);
    let candidate = issue("Coinbase earnings beat expectations", &["https://a.example/1"]);
    let history = vec![issue(
        "Coinbase quarterly earnings surprise analysts",
        &["https://b.example/2"],
    )];
    assert!(!dedup.is_duplicate(&candidate, &history).await);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}
