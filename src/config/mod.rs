//! Runtime configuration: env-driven settings read once at startup plus
//! per-domain content configuration parsed from embedded TOML.

pub mod domain;

pub use domain::{DomainConfig, RssFeed, SourcePriority};

use std::env;

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Generative-model settings. Model ids can be pinned per environment.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub api_key: String,
    pub flash_model: String,
    pub pro_model: String,
}

impl AiSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            flash_model: non_empty("GEMINI_FLASH_MODEL")
                .unwrap_or_else(|| "gemini-3-flash-preview".to_string()),
            pro_model: non_empty("GEMINI_PRO_MODEL")
                .unwrap_or_else(|| "gemini-3.1-pro-preview".to_string()),
        }
    }
}

/// Optional search-provider credentials; a missing key simply disables the
/// corresponding collector.
#[derive(Debug, Clone, Default)]
pub struct SearchKeys {
    pub brave: Option<String>,
    pub tavily: Option<String>,
}

impl SearchKeys {
    pub fn from_env() -> Self {
        Self {
            brave: non_empty("BRAVE_SEARCH_API_KEY"),
            tavily: non_empty("TAVILY_API_KEY"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let port = non_empty("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        Self { port }
    }
}
