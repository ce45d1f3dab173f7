//! Volatile in-process backend. Everything is lost on restart; acceptable
//! only as the last-resort fallback when a deployment environment has no
//! storage configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::model::{ActivityLog, BriefReport, Domain, IssueItem};
use crate::store::{today_utc, window_cutoff, StorageAdapter};

const MAX_LOGS: usize = 1_000;

#[derive(Debug, Clone)]
struct KvEntry {
    value: Value,
    expires_at_ms: Option<i64>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at_ms
            .is_some_and(|at| Utc::now().timestamp_millis() > at)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    // BTreeMap keeps date keys sorted; the newest brief is the last entry.
    briefs: Mutex<BTreeMap<String, BriefReport>>,
    kv: Mutex<HashMap<String, KvEntry>>,
    logs: Mutex<Vec<ActivityLog>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_expired_cleanup(&self, key: &str) -> Option<Value> {
        let mut kv = self.kv.lock().expect("kv mutex poisoned");
        match kv.get(key) {
            Some(entry) if entry.is_expired() => {
                kv.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn save_brief(&self, report: &BriefReport) -> Result<()> {
        self.briefs
            .lock()
            .expect("briefs mutex poisoned")
            .insert(report.date.clone(), report.clone());
        Ok(())
    }

    async fn brief_by_date(&self, date_key: &str) -> Result<Option<BriefReport>> {
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .get(date_key)
            .cloned())
    }

    async fn latest_brief(&self) -> Result<Option<BriefReport>> {
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .values()
            .next_back()
            .cloned())
    }

    async fn all_briefs(&self, limit: usize) -> Result<Vec<BriefReport>> {
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_brief(&self, date_key: &str) -> Result<bool> {
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .remove(date_key)
            .is_some())
    }

    async fn recent_issues(&self, days: u32, domain: Domain) -> Result<Vec<IssueItem>> {
        let cutoff = window_cutoff(today_utc(), days);
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .iter()
            .rev()
            .filter(|(key, _)| {
                domain.owns_date_key(key) && Domain::bare_date(key) >= cutoff.as_str()
            })
            .flat_map(|(_, report)| report.issues.clone())
            .collect())
    }

    async fn issues_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IssueItem>> {
        let start_key = start.format("%Y-%m-%d").to_string();
        let end_key = end.format("%Y-%m-%d").to_string();
        Ok(self
            .briefs
            .lock()
            .expect("briefs mutex poisoned")
            .iter()
            .filter(|(key, _)| {
                Domain::Ai.owns_date_key(key)
                    && key.as_str() >= start_key.as_str()
                    && key.as_str() <= end_key.as_str()
            })
            .flat_map(|(_, report)| report.issues.clone())
            .collect())
    }

    async fn kv_set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>) -> Result<()> {
        let entry = KvEntry {
            value: value.clone(),
            expires_at_ms: ttl_seconds
                .map(|t| Utc::now().timestamp_millis() + (t as i64) * 1000),
        };
        self.kv
            .lock()
            .expect("kv mutex poisoned")
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock_expired_cleanup(key))
    }

    async fn kv_incr(&self, key: &str, ttl_seconds: Option<u64>) -> Result<i64> {
        let mut kv = self.kv.lock().expect("kv mutex poisoned");
        let next = match kv.get(key) {
            Some(entry) if !entry.is_expired() => {
                let next = entry.value.as_i64().unwrap_or(0) + 1;
                let expires_at_ms = entry.expires_at_ms;
                kv.insert(
                    key.to_string(),
                    KvEntry {
                        value: Value::from(next),
                        expires_at_ms,
                    },
                );
                next
            }
            _ => {
                kv.insert(
                    key.to_string(),
                    KvEntry {
                        value: Value::from(1),
                        expires_at_ms: ttl_seconds
                            .map(|t| Utc::now().timestamp_millis() + (t as i64) * 1000),
                    },
                );
                1
            }
        };
        Ok(next)
    }

    async fn save_log(&self, entry: &ActivityLog) -> Result<()> {
        let mut logs = self.logs.lock().expect("logs mutex poisoned");
        logs.insert(0, entry.clone());
        logs.truncate(MAX_LOGS);
        Ok(())
    }

    async fn logs(&self, limit: usize) -> Result<Vec<ActivityLog>> {
        Ok(self
            .logs
            .lock()
            .expect("logs mutex poisoned")
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
