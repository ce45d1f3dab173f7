//! Persistence adapter: one object-safe trait, four interchangeable
//! backends, selected once at startup by environment inspection and passed
//! around as an injected `Arc<dyn StorageAdapter>`.
//!
//! Key layout is shared between the two remote backends so data stays
//! portable between them:
//!   brief:<date>                 serialized BriefReport (90-day TTL remote)
//!   briefs_index                 sorted set of date keys, scored by date
//!   <kind>_job:<jobId>           job-status record, TTL 3600 s
//!   usage_limit:<date>:<ip>      integer counter, TTL 86400 s
//!   log:<timestamp>:<id>         activity-log entry, TTL 2592000 s
//!   logs_index                   sorted set of log keys, scored by timestamp

pub mod file;
pub mod memory;
pub mod redis;
pub mod rest_kv;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{ActivityLog, BriefReport, Domain, IssueItem};

pub const BRIEF_TTL_SECS: u64 = 7_776_000; // 90 days (remote backends only)
pub const LOG_TTL_SECS: u64 = 2_592_000; // 30 days (remote backends only)
pub const JOB_TTL_SECS: u64 = 3_600;
pub const USAGE_TTL_SECS: u64 = 86_400;

pub const BRIEFS_INDEX_KEY: &str = "briefs_index";
pub const LOGS_INDEX_KEY: &str = "logs_index";

pub fn brief_key(date_key: &str) -> String {
    format!("brief:{date_key}")
}

pub fn log_key(timestamp_ms: i64, id: &str) -> String {
    format!("log:{timestamp_ms}:{id}")
}

pub fn usage_limit_key(date: &str, ip: &str) -> String {
    format!("usage_limit:{date}:{ip}")
}

/// Uniform persistence contract. Writes propagate errors to the caller;
/// bulk reads degrade to empty with a logged warning. `kv_get` returns
/// `None` both for "never set" and "expired" — callers must treat the two
/// identically.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save_brief(&self, report: &BriefReport) -> Result<()>;
    async fn brief_by_date(&self, date_key: &str) -> Result<Option<BriefReport>>;
    async fn latest_brief(&self) -> Result<Option<BriefReport>>;
    /// Most-recent-first, at most `limit` entries.
    async fn all_briefs(&self, limit: usize) -> Result<Vec<BriefReport>>;
    async fn delete_brief(&self, date_key: &str) -> Result<bool>;

    /// Issues of the domain's briefs within the trailing `days`-day window
    /// (today inclusive), most recent brief first.
    async fn recent_issues(&self, days: u32, domain: Domain) -> Result<Vec<IssueItem>>;
    /// Issues of unprefixed (ai-domain) briefs dated within `[start, end]`.
    async fn issues_by_date_range(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<IssueItem>>;

    async fn kv_set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>) -> Result<()>;
    async fn kv_get(&self, key: &str) -> Result<Option<Value>>;
    /// Atomic increment-and-get; a fresh counter starts at 1 and takes the
    /// TTL. Closes the read-modify-write race of naive usage counters.
    async fn kv_incr(&self, key: &str, ttl_seconds: Option<u64>) -> Result<i64>;

    async fn save_log(&self, entry: &ActivityLog) -> Result<()>;
    /// Most-recent-first, at most `limit` entries.
    async fn logs(&self, limit: usize) -> Result<Vec<ActivityLog>>;

    fn backend_name(&self) -> &'static str;
}

pub type SharedStorage = Arc<dyn StorageAdapter>;

/// Typed read helper over the untyped kv surface.
pub async fn kv_get_as<T: DeserializeOwned>(
    storage: &dyn StorageAdapter,
    key: &str,
) -> Result<Option<T>> {
    match storage.kv_get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write helper over the untyped kv surface.
pub async fn kv_set_as<T: Serialize>(
    storage: &dyn StorageAdapter,
    key: &str,
    value: &T,
    ttl_seconds: Option<u64>,
) -> Result<()> {
    storage
        .kv_set(key, &serde_json::to_value(value)?, ttl_seconds)
        .await
}

/// Tagged backend variant resolved once at startup (no hidden globals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Managed key/value service over its REST command API.
    RestKv { url: String, token: String },
    /// Self-hosted Redis.
    Redis { url: String },
    /// Volatile in-process map; data loss on restart. Last resort for
    /// deployment environments without storage configured.
    InMemory,
    /// Local-disk files; the development default.
    LocalFiles { dir: PathBuf },
}

impl Backend {
    /// Precedence chain: managed KV credentials, then a Redis URL, then the
    /// in-memory fallback for production-like environments, else local files.
    pub fn detect_from_env() -> Self {
        let non_empty = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());

        if let (Some(url), Some(token)) =
            (non_empty("KV_REST_API_URL"), non_empty("KV_REST_API_TOKEN"))
        {
            return Backend::RestKv { url, token };
        }
        if let Some(url) = non_empty("KV_URL").or_else(|| non_empty("REDIS_URL")) {
            return Backend::Redis { url };
        }
        if non_empty("APP_ENV").as_deref() == Some("production") {
            return Backend::InMemory;
        }
        let dir = non_empty("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data"));
        Backend::LocalFiles { dir }
    }

    pub async fn connect(self) -> Result<SharedStorage> {
        Ok(match self {
            Backend::RestKv { url, token } => Arc::new(rest_kv::RestKvStorage::new(url, token)?),
            Backend::Redis { url } => Arc::new(redis::RedisStorage::connect(&url).await?),
            Backend::InMemory => {
                warn!("no storage configured; falling back to volatile in-memory store");
                Arc::new(memory::MemoryStorage::new())
            }
            Backend::LocalFiles { dir } => Arc::new(file::FileStorage::new(dir)),
        })
    }
}

/// Detect and connect the backend chosen by the environment.
pub async fn select_storage() -> Result<SharedStorage> {
    Backend::detect_from_env().connect().await
}

// ---- shared helpers used by the backends ----

pub(crate) fn decode_brief(raw: &str) -> Option<BriefReport> {
    match serde_json::from_str(raw) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = ?e, "skipping undecodable brief record");
            None
        }
    }
}

/// Inclusive bare-date cutoff for a trailing window ending today.
pub(crate) fn window_cutoff(today: NaiveDate, days: u32) -> String {
    let span = Duration::days(i64::from(days.saturating_sub(1)));
    (today - span).format("%Y-%m-%d").to_string()
}

/// Date keys for the trailing window, most recent first.
pub(crate) fn trailing_date_keys(today: NaiveDate, days: u32, domain: Domain) -> Vec<String> {
    (0..days.max(1))
        .map(|i| domain.date_key(today - Duration::days(i64::from(i))))
        .collect()
}

/// Unprefixed date keys for `[start, end]`, ascending.
pub(crate) fn range_date_keys(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = start;
    while current <= end {
        keys.push(Domain::Ai.date_key(current));
        current = current + Duration::days(1);
    }
    keys
}

pub(crate) fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(brief_key("2026-08-05"), "brief:2026-08-05");
        assert_eq!(brief_key("battery-2026-08-05"), "brief:battery-2026-08-05");
        assert_eq!(log_key(1_700_000_000_000, "abc"), "log:1700000000000:abc");
        assert_eq!(
            usage_limit_key("2026-08-05", "10.0.0.1"),
            "usage_limit:2026-08-05:10.0.0.1"
        );
    }

    #[test]
    fn trailing_window_enumerates_recent_days_first() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let keys = trailing_date_keys(today, 3, Domain::Battery);
        assert_eq!(
            keys,
            vec![
                "battery-2026-08-05".to_string(),
                "battery-2026-08-04".to_string(),
                "battery-2026-08-03".to_string(),
            ]
        );
        assert_eq!(window_cutoff(today, 3), "2026-08-03");
    }

    #[test]
    fn range_keys_are_inclusive() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(
            range_date_keys(start, end),
            vec!["2026-07-30", "2026-07-31", "2026-08-01"]
        );
    }
}
