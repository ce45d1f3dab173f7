// tests/store_roundtrip.rs
//
// Persistence contract checks against the two locally-testable backends
// (file, memory): save/get round-trip, latest/list ordering, delete,
// kv TTL expiry, domain-aware windowing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use daily_brief::model::{ActivityLog, Domain, IssueItem, LogAction};
use daily_brief::report::build_report;
use daily_brief::store::{file::FileStorage, memory::MemoryStorage, StorageAdapter};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("daily-brief-test-{}", uuid::Uuid::new_v4()))
}

fn backends() -> Vec<(&'static str, Arc<dyn StorageAdapter>)> {
    vec![
        ("memory", Arc::new(MemoryStorage::new()) as Arc<dyn StorageAdapter>),
        ("file", Arc::new(FileStorage::new(temp_dir())) as Arc<dyn StorageAdapter>),
    ]
}

fn issue(headline: &str) -> IssueItem {
    IssueItem {
        headline: headline.to_string(),
        key_facts: vec!["f1".into(), "f2".into(), "f3".into()],
        insight: "insight".into(),
        framework: "Framework".into(),
        sources: vec![format!("https://example.com/{}", headline.len())],
        category: Some("Category".into()),
        one_line_summary: Some("one line".into()),
        hashtags: Some(vec!["#tag".into()]),
    }
}

#[tokio::test]
async fn saved_brief_round_trips_deep_equal() {
    for (name, storage) in backends() {
        let date = Utc::now().date_naive();
        let report = build_report(vec![issue("Stripe ships API")], date, Domain::Ai);

        storage.save_brief(&report).await.unwrap();
        let loaded = storage
            .brief_by_date(&report.date)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{name}: brief missing after save"));
        assert_eq!(loaded, report, "{name}: round trip must be deep-equal");
    }
}

#[tokio::test]
async fn latest_and_list_are_most_recent_first() {
    for (name, storage) in backends() {
        let today = Utc::now().date_naive();
        for days_ago in [2i64, 0, 1] {
            let report = build_report(
                vec![issue(&format!("story {days_ago}"))],
                today - ChronoDuration::days(days_ago),
                Domain::Ai,
            );
            storage.save_brief(&report).await.unwrap();
        }

        let latest = storage.latest_brief().await.unwrap().unwrap();
        assert_eq!(latest.date, Domain::Ai.date_key(today), "{name}: latest");

        let all = storage.all_briefs(2).await.unwrap();
        assert_eq!(all.len(), 2, "{name}: limit respected");
        assert!(all[0].date > all[1].date, "{name}: ordering");
    }
}

#[tokio::test]
async fn delete_reports_whether_anything_was_removed() {
    for (name, storage) in backends() {
        let date = Utc::now().date_naive();
        let report = build_report(vec![], date, Domain::Ai);
        storage.save_brief(&report).await.unwrap();

        assert!(storage.delete_brief(&report.date).await.unwrap(), "{name}");
        assert!(storage.brief_by_date(&report.date).await.unwrap().is_none());
        assert!(
            !storage.delete_brief(&report.date).await.unwrap(),
            "{name}: second delete finds nothing"
        );
    }
}

#[tokio::test]
async fn kv_values_expire_after_their_ttl() {
    for (name, storage) in backends() {
        storage
            .kv_set("ttl_probe", &json!({"v": 1}), Some(1))
            .await
            .unwrap();
        assert!(
            storage.kv_get("ttl_probe").await.unwrap().is_some(),
            "{name}: value readable before expiry"
        );

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(
            storage.kv_get("ttl_probe").await.unwrap().is_none(),
            "{name}: value gone after ttl"
        );

        // Never-set reads the same way as expired.
        assert!(storage.kv_get("never_set").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn counter_increments_atomically_per_key() {
    for (name, storage) in backends() {
        assert_eq!(storage.kv_incr("quota", Some(60)).await.unwrap(), 1, "{name}");
        assert_eq!(storage.kv_incr("quota", Some(60)).await.unwrap(), 2, "{name}");
        assert_eq!(storage.kv_incr("quota", Some(60)).await.unwrap(), 3, "{name}");
        assert_eq!(storage.kv_incr("other", Some(60)).await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn recent_issues_respect_window_and_domain_prefix() {
    for (name, storage) in backends() {
        let today = Utc::now().date_naive();

        // In-window fintech briefs.
        for (days_ago, headline) in [(0i64, "today story"), (2, "two days ago story")] {
            let report = build_report(
                vec![issue(headline)],
                today - ChronoDuration::days(days_ago),
                Domain::Ai,
            );
            storage.save_brief(&report).await.unwrap();
        }
        // Outside the 3-day window.
        let stale = build_report(
            vec![issue("stale story")],
            today - ChronoDuration::days(5),
            Domain::Ai,
        );
        storage.save_brief(&stale).await.unwrap();
        // Same day, other domain.
        let battery = build_report(vec![issue("battery story")], today, Domain::Battery);
        storage.save_brief(&battery).await.unwrap();

        let recent = storage.recent_issues(3, Domain::Ai).await.unwrap();
        let headlines: Vec<&str> = recent.iter().map(|i| i.headline.as_str()).collect();
        assert!(headlines.contains(&"today story"), "{name}");
        assert!(headlines.contains(&"two days ago story"), "{name}");
        assert!(!headlines.contains(&"stale story"), "{name}: outside window");
        assert!(!headlines.contains(&"battery story"), "{name}: other domain");

        let battery_recent = storage.recent_issues(3, Domain::Battery).await.unwrap();
        assert_eq!(battery_recent.len(), 1, "{name}");
        assert_eq!(battery_recent[0].headline, "battery story", "{name}");
    }
}

#[tokio::test]
async fn issues_by_date_range_is_inclusive_and_unprefixed_only() {
    for (name, storage) in backends() {
        let today = Utc::now().date_naive();
        let start = today - ChronoDuration::days(3);

        for days_ago in [0i64, 3, 6] {
            let report = build_report(
                vec![issue(&format!("ai {days_ago}"))],
                today - ChronoDuration::days(days_ago),
                Domain::Ai,
            );
            storage.save_brief(&report).await.unwrap();
        }
        let battery = build_report(vec![issue("battery in range")], today, Domain::Battery);
        storage.save_brief(&battery).await.unwrap();

        let issues = storage.issues_by_date_range(start, today).await.unwrap();
        let headlines: Vec<&str> = issues.iter().map(|i| i.headline.as_str()).collect();
        assert!(headlines.contains(&"ai 0"), "{name}: end inclusive");
        assert!(headlines.contains(&"ai 3"), "{name}: start inclusive");
        assert!(!headlines.contains(&"ai 6"), "{name}: before start");
        assert!(!headlines.contains(&"battery in range"), "{name}");
    }
}

#[tokio::test]
async fn logs_come_back_most_recent_first() {
    for (name, storage) in backends() {
        for i in 0..3i64 {
            let entry = ActivityLog {
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: Utc::now().timestamp_millis() + i,
                action: LogAction::ViewBrief,
                target_id: format!("2026-08-0{}", i + 1),
                metadata: None,
                user_agent: None,
                ip: None,
            };
            storage.save_log(&entry).await.unwrap();
        }

        let logs = storage.logs(2).await.unwrap();
        assert_eq!(logs.len(), 2, "{name}: limit respected");
        assert_eq!(logs[0].target_id, "2026-08-03", "{name}: newest first");
    }
}
