//! Duplicate detection for candidate issues against a trailing history
//! window. Cheap checks run first (source-URL overlap, headline token
//! similarity); only the ambiguous similarity band pays for a semantic
//! yes/no classification call.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::IssueItem;
use crate::similarity::similarity;

/// Candidate and history issue share at least this fraction of source URLs
/// (relative to the smaller list) → duplicate. The boundary value counts.
pub const SOURCE_OVERLAP_THRESHOLD: f64 = 0.5;
/// Headline Jaccard similarity strictly above this → duplicate.
pub const HEADLINE_SIMILARITY_THRESHOLD: f64 = 0.7;
/// Similarity strictly above this (and not above the headline threshold)
/// is ambiguous and escalates to the semantic classifier.
pub const SEMANTIC_BAND_FLOOR: f64 = 0.2;

/// Policy for classifier failures. Assuming "not a duplicate" over-includes
/// issues rather than silently dropping fresh content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnClassifierError {
    #[default]
    AssumeNotDuplicate,
}

/// Escalation seam: answers whether two issues describe the same core event.
#[async_trait]
pub trait DuplicateClassifier: Send + Sync {
    async fn is_same_event(&self, candidate: &IssueItem, old: &IssueItem) -> anyhow::Result<bool>;
}

/// Classifier that never escalates; used when no AI client is configured.
pub struct NoClassifier;

#[async_trait]
impl DuplicateClassifier for NoClassifier {
    async fn is_same_event(&self, _candidate: &IssueItem, _old: &IssueItem) -> anyhow::Result<bool> {
        Ok(false)
    }
}

pub struct Deduplicator<'a> {
    classifier: &'a dyn DuplicateClassifier,
    pub on_error: OnClassifierError,
}

impl<'a> Deduplicator<'a> {
    pub fn new(classifier: &'a dyn DuplicateClassifier) -> Self {
        Self {
            classifier,
            on_error: OnClassifierError::default(),
        }
    }

    /// Whether `candidate` is a near-duplicate of any issue in `history`.
    /// Short-circuits on the first matching history item.
    pub async fn is_duplicate(&self, candidate: &IssueItem, history: &[IssueItem]) -> bool {
        if history.is_empty() {
            return false;
        }

        for old in history {
            let overlap = source_overlap_ratio(&candidate.sources, &old.sources);
            if overlap >= SOURCE_OVERLAP_THRESHOLD {
                debug!(
                    overlap = format!("{:.0}%", overlap * 100.0),
                    old_headline = %old.headline,
                    "duplicate by source overlap"
                );
                return true;
            }

            let sim = similarity(&candidate.headline, &old.headline);
            if sim > HEADLINE_SIMILARITY_THRESHOLD {
                debug!(
                    similarity = format!("{sim:.2}"),
                    old_headline = %old.headline,
                    "duplicate by headline similarity"
                );
                return true;
            }

            if sim > SEMANTIC_BAND_FLOOR {
                match self.classifier.is_same_event(candidate, old).await {
                    Ok(true) => {
                        debug!(
                            candidate = %candidate.headline,
                            old_headline = %old.headline,
                            "duplicate by semantic match"
                        );
                        return true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = ?e, "semantic duplicate check failed");
                        match self.on_error {
                            OnClassifierError::AssumeNotDuplicate => {}
                        }
                    }
                }
            }
        }
        false
    }
}

/// Fraction of shared source URLs relative to the smaller source list.
/// 0 when either list is empty (nothing to compare).
pub fn source_overlap_ratio(candidate: &[String], old: &[String]) -> f64 {
    let a: HashSet<&str> = candidate.iter().map(String::as_str).collect();
    let b: HashSet<&str> = old.iter().map(String::as_str).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    intersection as f64 / a.len().min(b.len()) as f64
}
