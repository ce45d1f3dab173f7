//! Semantic duplicate classification: one yes/no call for pairs the cheap
//! checks could not settle.

use async_trait::async_trait;

use crate::ai::{GenerateRequest, SharedAiClient};
use crate::dedup::DuplicateClassifier;
use crate::model::IssueItem;

pub struct SemanticDuplicateChecker {
    client: SharedAiClient,
}

impl SemanticDuplicateChecker {
    pub fn new(client: SharedAiClient) -> Self {
        Self { client }
    }

    fn prompt(candidate: &IssueItem, old: &IssueItem) -> String {
        format!(
            "Compare these two news issues and determine if they describe the exact same \
             core event or announcement. Ignore minor differences in details or perspective.\n\n\
             Issue A: \"{}\"\nKey Facts A: {}\n\n\
             Issue B: \"{}\"\nKey Facts B: {}\n\n\
             Are they referring to the same event? Answer strictly with \"YES\" or \"NO\".",
            candidate.headline,
            candidate.key_facts.join(", "),
            old.headline,
            old.key_facts.join(", "),
        )
    }
}

#[async_trait]
impl DuplicateClassifier for SemanticDuplicateChecker {
    async fn is_same_event(&self, candidate: &IssueItem, old: &IssueItem) -> anyhow::Result<bool> {
        let response = self
            .client
            .generate(GenerateRequest::flash(Self::prompt(candidate, old)))
            .await?;
        Ok(response.text.trim().to_uppercase().contains("YES"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockClient;
    use std::sync::Arc;

    fn issue(headline: &str) -> IssueItem {
        IssueItem {
            headline: headline.to_string(),
            key_facts: vec!["a".into(), "b".into(), "c".into()],
            insight: String::new(),
            framework: String::new(),
            sources: Vec::new(),
            category: None,
            one_line_summary: None,
            hashtags: None,
        }
    }

    #[tokio::test]
    async fn yes_reply_means_same_event() {
        let mock = Arc::new(MockClient::new());
        mock.push_text("YES");
        let checker = SemanticDuplicateChecker::new(mock.clone());
        assert!(checker
            .is_same_event(&issue("A"), &issue("B"))
            .await
            .unwrap());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn anything_else_means_distinct() {
        let mock = Arc::new(MockClient::new());
        mock.push_text("No, these cover different funding rounds.");
        let checker = SemanticDuplicateChecker::new(mock);
        assert!(!checker
            .is_same_event(&issue("A"), &issue("B"))
            .await
            .unwrap());
    }
}
