//! Local-disk backend: the development default.
//!
//! Layout under the data dir: `briefs/<date>.json`, `kv/<key>.json` with an
//! embedded expiry, `logs/<YYYY-MM-DD>.jsonl` append-only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::model::{ActivityLog, BriefReport, Domain, IssueItem};
use crate::store::{decode_brief, today_utc, window_cutoff, StorageAdapter};

pub struct FileStorage {
    briefs_dir: PathBuf,
    kv_dir: PathBuf,
    logs_dir: PathBuf,
    /// Serializes read-modify-write counter updates within this process.
    incr_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KvRecord {
    value: Value,
    /// Unix milliseconds; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

impl KvRecord {
    fn fresh(value: Value, ttl_seconds: Option<u64>) -> Self {
        Self {
            value,
            expires_at_ms: ttl_seconds.map(|t| Utc::now().timestamp_millis() + (t as i64) * 1000),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at_ms
            .is_some_and(|at| Utc::now().timestamp_millis() > at)
    }
}

impl FileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            briefs_dir: data_dir.join("briefs"),
            kv_dir: data_dir.join("kv"),
            logs_dir: data_dir.join("logs"),
            incr_lock: Mutex::new(()),
        }
    }

    async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.briefs_dir, &self.kv_dir, &self.logs_dir] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    fn brief_path(&self, date_key: &str) -> PathBuf {
        self.briefs_dir.join(format!("{date_key}.json"))
    }

    fn kv_path(&self, key: &str) -> PathBuf {
        // Colons collide with reserved characters on some filesystems.
        self.kv_dir.join(format!("{}.json", key.replace(':', "_")))
    }

    /// `.json` file stems under `briefs/`, sorted descending. Lexicographic
    /// order is chronological because date keys are zero-padded.
    async fn brief_date_keys_desc(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.briefs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(".json") {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        keys.reverse();
        Ok(keys)
    }

    async fn read_brief_file(&self, date_key: &str) -> Option<BriefReport> {
        let raw = fs::read_to_string(self.brief_path(date_key)).await.ok()?;
        decode_brief(&raw)
    }

    async fn read_kv_record(&self, key: &str) -> Option<KvRecord> {
        let path = self.kv_path(key);
        let raw = fs::read_to_string(&path).await.ok()?;
        let record: KvRecord = serde_json::from_str(&raw).ok()?;
        if record.is_expired() {
            let _ = fs::remove_file(&path).await;
            return None;
        }
        Some(record)
    }

    async fn write_kv_record(&self, key: &str, record: &KvRecord) -> Result<()> {
        self.ensure_dirs().await?;
        write_atomic(&self.kv_path(key), &serde_json::to_vec_pretty(record)?).await
    }
}

/// Write through a temp file and rename, so readers never observe a
/// half-written record.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn save_brief(&self, report: &BriefReport) -> Result<()> {
        self.ensure_dirs().await?;
        write_atomic(
            &self.brief_path(&report.date),
            &serde_json::to_vec_pretty(report)?,
        )
        .await?;
        info!(date = %report.date, "brief saved to disk");
        Ok(())
    }

    async fn brief_by_date(&self, date_key: &str) -> Result<Option<BriefReport>> {
        Ok(self.read_brief_file(date_key).await)
    }

    async fn latest_brief(&self) -> Result<Option<BriefReport>> {
        self.ensure_dirs().await?;
        let keys = self.brief_date_keys_desc().await.unwrap_or_default();
        match keys.first() {
            Some(key) => Ok(self.read_brief_file(key).await),
            None => Ok(None),
        }
    }

    async fn all_briefs(&self, limit: usize) -> Result<Vec<BriefReport>> {
        self.ensure_dirs().await?;
        let keys = self.brief_date_keys_desc().await.unwrap_or_default();
        let mut briefs = Vec::new();
        for key in keys.into_iter().take(limit) {
            if let Some(report) = self.read_brief_file(&key).await {
                briefs.push(report);
            }
        }
        Ok(briefs)
    }

    async fn delete_brief(&self, date_key: &str) -> Result<bool> {
        match fs::remove_file(self.brief_path(date_key)).await {
            Ok(()) => {
                info!(date = %date_key, "brief deleted");
                Ok(true)
            }
            Err(e) => {
                warn!(date = %date_key, error = ?e, "brief delete failed");
                Ok(false)
            }
        }
    }

    async fn recent_issues(&self, days: u32, domain: Domain) -> Result<Vec<IssueItem>> {
        self.ensure_dirs().await?;
        let cutoff = window_cutoff(today_utc(), days);
        let keys = match self.brief_date_keys_desc().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = ?e, "listing briefs failed");
                return Ok(Vec::new());
            }
        };

        let mut issues = Vec::new();
        for key in keys {
            if !domain.owns_date_key(&key) || Domain::bare_date(&key) < cutoff.as_str() {
                continue;
            }
            if let Some(report) = self.read_brief_file(&key).await {
                issues.extend(report.issues);
            }
        }
        Ok(issues)
    }

    async fn issues_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IssueItem>> {
        self.ensure_dirs().await?;
        let start_key = start.format("%Y-%m-%d").to_string();
        let end_key = end.format("%Y-%m-%d").to_string();

        let mut keys: Vec<String> = self
            .brief_date_keys_desc()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|k| {
                Domain::Ai.owns_date_key(k)
                    && k.as_str() >= start_key.as_str()
                    && k.as_str() <= end_key.as_str()
            })
            .collect();
        keys.sort();

        let mut issues = Vec::new();
        for key in keys {
            if let Some(report) = self.read_brief_file(&key).await {
                issues.extend(report.issues);
            }
        }
        Ok(issues)
    }

    async fn kv_set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>) -> Result<()> {
        self.write_kv_record(key, &KvRecord::fresh(value.clone(), ttl_seconds))
            .await
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_kv_record(key).await.map(|r| r.value))
    }

    async fn kv_incr(&self, key: &str, ttl_seconds: Option<u64>) -> Result<i64> {
        let _guard = self.incr_lock.lock().await;
        let next = match self.read_kv_record(key).await {
            Some(record) => {
                let current = record.value.as_i64().unwrap_or(0);
                let record = KvRecord {
                    value: Value::from(current + 1),
                    expires_at_ms: record.expires_at_ms,
                };
                self.write_kv_record(key, &record).await?;
                current + 1
            }
            None => {
                self.write_kv_record(key, &KvRecord::fresh(Value::from(1), ttl_seconds))
                    .await?;
                1
            }
        };
        Ok(next)
    }

    async fn save_log(&self, entry: &ActivityLog) -> Result<()> {
        self.ensure_dirs().await?;
        let day = Utc
            .timestamp_millis_opt(entry.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
            .date_naive();
        let path = self.logs_dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")));

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        f.write_all(&line).await?;
        Ok(())
    }

    async fn logs(&self, limit: usize) -> Result<Vec<ActivityLog>> {
        self.ensure_dirs().await?;
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.logs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".jsonl") {
                files.push(name);
            }
        }
        files.sort();
        files.reverse();

        let mut logs = Vec::new();
        for name in files {
            if logs.len() >= limit {
                break;
            }
            let Ok(content) = fs::read_to_string(self.logs_dir.join(&name)).await else {
                continue;
            };
            for line in content.lines().rev() {
                if logs.len() >= limit {
                    break;
                }
                if let Ok(entry) = serde_json::from_str::<ActivityLog>(line) {
                    logs.push(entry);
                }
            }
        }
        Ok(logs)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
