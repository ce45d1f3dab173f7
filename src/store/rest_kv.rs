//! Managed key/value backend spoken over its REST command API (Upstash
//! style: POST a JSON command array, read `{"result": ...}`). Uses the same
//! key layout as the Redis backend, so data is portable between the two.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::model::{ActivityLog, BriefReport, Domain, IssueItem};
use crate::store::{
    brief_key, decode_brief, log_key, range_date_keys, today_utc, trailing_date_keys,
    StorageAdapter, BRIEFS_INDEX_KEY, BRIEF_TTL_SECS, LOGS_INDEX_KEY, LOG_TTL_SECS,
};

pub struct RestKvStorage {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestKvStorage {
    pub fn new(base_url: String, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("daily-brief/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building kv rest client")?;
        info!("using managed kv rest backend");
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Execute one command array against the REST endpoint.
    async fn command(&self, cmd: Value) -> Result<Value> {
        let resp = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .context("kv rest request")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("kv rest command failed with status {status}");
        }
        let reply: CommandReply = resp.json().await.context("kv rest response body")?;
        if let Some(error) = reply.error {
            bail!("kv rest command error: {error}");
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let result = self.command(json!(["GET", key])).await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn set_string(&self, key: &str, value: String, ttl_seconds: Option<u64>) -> Result<()> {
        let cmd = match ttl_seconds {
            Some(ttl) => json!(["SET", key, value, "EX", ttl.to_string()]),
            None => json!(["SET", key, value]),
        };
        self.command(cmd).await?;
        Ok(())
    }

    /// Members of a sorted set, highest score first.
    async fn zrevrange(&self, index: &str, limit: usize) -> Result<Vec<String>> {
        let stop = limit.saturating_sub(1).to_string();
        let result = self
            .command(json!(["ZRANGE", index, "0", stop, "REV"]))
            .await?;
        Ok(result
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = vec![Value::from("MGET")];
        cmd.extend(keys.iter().map(|k| Value::from(k.as_str())));
        let result = self.command(Value::Array(cmd)).await?;
        Ok(result
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn briefs_for_keys(&self, date_keys: &[String]) -> Result<Vec<BriefReport>> {
        let keys: Vec<String> = date_keys.iter().map(|d| brief_key(d)).collect();
        Ok(self
            .mget(&keys)
            .await?
            .into_iter()
            .flatten()
            .filter_map(|s| decode_brief(&s))
            .collect())
    }

    fn date_score(date_key: &str) -> i64 {
        NaiveDate::parse_from_str(Domain::bare_date(date_key), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0)
    }
}

#[async_trait]
impl StorageAdapter for RestKvStorage {
    async fn save_brief(&self, report: &BriefReport) -> Result<()> {
        let payload = serde_json::to_string(report)?;
        self.set_string(&brief_key(&report.date), payload, Some(BRIEF_TTL_SECS))
            .await?;
        self.command(json!([
            "ZADD",
            BRIEFS_INDEX_KEY,
            Self::date_score(&report.date).to_string(),
            report.date.as_str()
        ]))
        .await?;
        info!(date = %report.date, "brief saved to managed kv");
        Ok(())
    }

    async fn brief_by_date(&self, date_key: &str) -> Result<Option<BriefReport>> {
        Ok(self
            .get_string(&brief_key(date_key))
            .await?
            .as_deref()
            .and_then(decode_brief))
    }

    async fn latest_brief(&self) -> Result<Option<BriefReport>> {
        let dates = self.zrevrange(BRIEFS_INDEX_KEY, 1).await?;
        match dates.first() {
            Some(date) => self.brief_by_date(date).await,
            None => Ok(None),
        }
    }

    async fn all_briefs(&self, limit: usize) -> Result<Vec<BriefReport>> {
        let dates = self.zrevrange(BRIEFS_INDEX_KEY, limit).await?;
        self.briefs_for_keys(&dates).await
    }

    async fn delete_brief(&self, date_key: &str) -> Result<bool> {
        let outcome: Result<()> = async {
            self.command(json!(["DEL", brief_key(date_key)])).await?;
            self.command(json!(["ZREM", BRIEFS_INDEX_KEY, date_key]))
                .await?;
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
        self.set_string(key, serde_json::to_string(value)?, ttl_seconds)
            .await
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .get_string(key)
            .await?
            .and_then(|s| serde_json::from_str(&s).ok()))
    }

    async fn kv_incr(&self, key: &str, ttl_seconds: Option<u64>) -> Result<i64> {
        let result = self.command(json!(["INCR", key])).await?;
        let count = result.as_i64().context("INCR reply was not an integer")?;
        if count == 1 {
            if let Some(ttl) = ttl_seconds {
                self.command(json!(["EXPIRE", key, ttl.to_string()])).await?;
            }
        }
        Ok(count)
    }

    async fn save_log(&self, entry: &ActivityLog) -> Result<()> {
        let key = log_key(entry.timestamp, &entry.id);
        self.set_string(&key, serde_json::to_string(entry)?, Some(LOG_TTL_SECS))
            .await?;
        self.command(json!([
            "ZADD",
            LOGS_INDEX_KEY,
            entry.timestamp.to_string(),
            key.as_str()
        ]))
        .await?;
        Ok(())
    }

    async fn logs(&self, limit: usize) -> Result<Vec<ActivityLog>> {
        let keys = self.zrevrange(LOGS_INDEX_KEY, limit).await?;
        Ok(self
            .mget(&keys)
            .await?
            .into_iter()
            .flatten()
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "kv-rest"
    }
}
