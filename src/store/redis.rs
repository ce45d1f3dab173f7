//! Self-hosted Redis backend over a multiplexed tokio connection.
//! Shares its key layout with the REST backend so data stays portable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{info, warn};

use crate::model::{ActivityLog, BriefReport, Domain, IssueItem};
use crate::store::{
    brief_key, decode_brief, log_key, range_date_keys, today_utc, trailing_date_keys,
    StorageAdapter, BRIEFS_INDEX_KEY, BRIEF_TTL_SECS, LOGS_INDEX_KEY, LOG_TTL_SECS,
};

pub struct RedisStorage {
    conn: MultiplexedConnection,
}

impl RedisStorage {
    /// Connect once; the multiplexed connection is cloned per operation.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("parsing redis url")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("connecting to redis")?;
        info!("connected to redis backend");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// Sorted-set score for a brief: midnight UTC of its bare date.
    fn date_score(date_key: &str) -> i64 {
        NaiveDate::parse_from_str(Domain::bare_date(date_key), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0)
    }

    async fn briefs_for_keys(&self, date_keys: &[String]) -> Result<Vec<BriefReport>> {
        if date_keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = date_keys.iter().map(|d| brief_key(d)).collect();
        let mut conn = self.conn();
        let raw: Vec<Option<String>> = conn.mget(&keys).await.context("MGET briefs")?;
        Ok(raw
            .into_iter()
            .flatten()
            .filter_map(|s| decode_brief(&s))
            .collect())
    }
}

#[async_trait]
impl StorageAdapter for RedisStorage {
    async fn save_brief(&self, report: &BriefReport) -> Result<()> {
        let payload = serde_json::to_string(report)?;
        let mut conn = self.conn();
        let () = conn
            .set_ex(brief_key(&report.date), payload, BRIEF_TTL_SECS)
            .await
            .context("SET brief")?;
        let () = conn
            .zadd(BRIEFS_INDEX_KEY, &report.date, Self::date_score(&report.date))
            .await
            .context("ZADD briefs_index")?;
        info!(date = %report.date, "brief saved to redis");
        Ok(())
    }

    async fn brief_by_date(&self, date_key: &str) -> Result<Option<BriefReport>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(brief_key(date_key)).await.context("GET brief")?;
        Ok(raw.as_deref().and_then(decode_brief))
    }

    async fn latest_brief(&self) -> Result<Option<BriefReport>> {
        let mut conn = self.conn();
        let dates: Vec<String> = conn
            .zrevrange(BRIEFS_INDEX_KEY, 0, 0)
            .await
            .context("ZREVRANGE briefs_index")?;
        match dates.first() {
            Some(date) => self.brief_by_date(date).await,
            None => Ok(None),
        }
    }

    async fn all_briefs(&self, limit: usize) -> Result<Vec<BriefReport>> {
        let mut conn = self.conn();
        let dates: Vec<String> = conn
            .zrevrange(BRIEFS_INDEX_KEY, 0, limit.saturating_sub(1) as isize)
            .await
            .context("ZREVRANGE briefs_index")?;
        self.briefs_for_keys(&dates).await
    }

    async fn delete_brief(&self, date_key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let outcome: redis::RedisResult<()> = async {
            let () = conn.del(brief_key(date_key)).await?;
            let () = conn.zrem(BRIEFS_INDEX_KEY, date_key).await?;
            Ok(())
        }
        .await;
        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(date = %date_key, error = ?e, "brief delete failed");
                Ok(false)
            }
        }
    }

    async fn recent_issues(&self, days: u32, domain: Domain) -> Result<Vec<IssueItem>> {
        let date_keys = trailing_date_keys(today_utc(), days, domain);
        match self.briefs_for_keys(&date_keys).await {
            Ok(briefs) => Ok(briefs.into_iter().flat_map(|b| b.issues).collect()),
            Err(e) => {
                warn!(error = ?e, "recent issues lookup failed");
                Ok(Vec::new())
            }
        }
    }

    async fn issues_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IssueItem>> {
        let date_keys = range_date_keys(start, end);
        match self.briefs_for_keys(&date_keys).await {
            Ok(briefs) => Ok(briefs.into_iter().flat_map(|b| b.issues).collect()),
            Err(e) => {
                warn!(error = ?e, "date range lookup failed");
                Ok(Vec::new())
            }
        }
    }

    async fn kv_set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.conn();
        match ttl_seconds {
            Some(ttl) => {
                let () = conn.set_ex(key, payload, ttl).await.context("SET EX")?;
            }
            None => {
                let () = conn.set(key, payload).await.context("SET")?;
            }
        }
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(key).await.context("GET")?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn kv_incr(&self, key: &str, ttl_seconds: Option<u64>) -> Result<i64> {
        let mut conn = self.conn();
        let count: i64 = conn.incr(key, 1).await.context("INCR")?;
        if count == 1 {
            if let Some(ttl) = ttl_seconds {
                let () = conn.expire(key, ttl as i64).await.context("EXPIRE")?;
            }
        }
        Ok(count)
    }

    async fn save_log(&self, entry: &ActivityLog) -> Result<()> {
        let key = log_key(entry.timestamp, &entry.id);
        let payload = serde_json::to_string(entry)?;
        let mut conn = self.conn();
        // Entry and index land together.
        let () = redis::pipe()
            .atomic()
            .set_ex(&key, payload, LOG_TTL_SECS)
            .ignore()
            .zadd(LOGS_INDEX_KEY, &key, entry.timestamp)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("log pipeline")?;
        Ok(())
    }

    async fn logs(&self, limit: usize) -> Result<Vec<ActivityLog>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn
            .zrevrange(LOGS_INDEX_KEY, 0, limit.saturating_sub(1) as isize)
            .await
            .context("ZREVRANGE logs_index")?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Option<String>> = conn.mget(&keys).await.context("MGET logs")?;
        Ok(raw
            .into_iter()
            .flatten()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
