//! RSS-backed providers: configured feeds plus Google News keyword search.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::collect::{normalize_text, NewsProvider};
use crate::model::NewsItem;

const FEED_ITEM_CAP: usize = 10;
const SEARCH_ITEM_CAP: usize = 5;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("daily-brief/", env!("CARGO_PKG_VERSION"), " (+AIBriefBot)"))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()
        .context("building rss http client")
}

/// Literal entities some feeds leave undeclared break the XML parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn parse_rss_items(xml: &str, source: &str, cap: usize) -> Result<Vec<NewsItem>> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&cleaned).context("parsing rss xml")?;

    let mut out = Vec::new();
    for item in rss.channel.item.into_iter().take(cap) {
        let (Some(title), Some(link)) = (item.title, item.link) else {
            continue;
        };
        let title = normalize_text(&title);
        if title.is_empty() {
            continue;
        }
        out.push(NewsItem {
            id: NewsItem::stable_id(&link),
            title,
            description: normalize_text(item.description.as_deref().unwrap_or_default()),
            url: link,
            source: source.to_string(),
            published_at: item
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now),
            category: None,
        });
    }
    Ok(out)
}

/// One configured feed (Finextra, PYMNTS, Electrive, ...).
pub struct RssFeedProvider {
    name: String,
    url: String,
}

impl RssFeedProvider {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NewsProvider for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let http = http_client()?;
        let body = http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("fetching feed {}", self.name))?
            .text()
            .await
            .context("reading feed body")?;
        parse_rss_items(&body, &self.name, FEED_ITEM_CAP)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Google News RSS search for one keyword, limited to the last 24 hours.
pub struct GoogleNewsProvider {
    keyword: String,
}

impl GoogleNewsProvider {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
        }
    }
}

#[async_trait]
impl NewsProvider for GoogleNewsProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let http = http_client()?;
        let body = http
            .get("https://news.google.com/rss/search")
            .query(&[
                ("q", format!("{} when:1d", self.keyword).as_str()),
                ("hl", "en-US"),
                ("gl", "US"),
                ("ceid", "US:en"),
            ])
            .send()
            .await
            .with_context(|| format!("searching google news for {}", self.keyword))?
            .text()
            .await
            .context("reading google news body")?;
        parse_rss_items(&body, "Google News", SEARCH_ITEM_CAP)
    }

    fn name(&self) -> String {
        format!("Google News ({})", self.keyword)
    }
}
