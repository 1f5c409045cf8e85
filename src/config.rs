use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Delay before the first run after startup, in seconds
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Maximum number of feed fetches in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_articles_per_source")]
    pub max_articles_per_source: usize,
    #[serde(default)]
    pub cache: CacheConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Expired-entry sweep interval in minutes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// One configured outlet.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub feed_url: String,
    /// Human-facing homepage of the outlet
    pub url: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Grouping tag the source was registered under (e.g. "global", "asia")
    #[serde(default = "default_group")]
    pub group: String,
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_initial_delay_secs() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_articles_per_source() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    5
}

fn default_group() -> String {
    "global".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        if self.refresh_interval == 0 {
            bail!("refresh_interval must be at least 1 minute");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be at least 1");
        }
        if self.cache.cleanup_interval == 0 {
            bail!("cache.cleanup_interval must be at least 1 minute");
        }
        if self.refresh_interval.checked_mul(60).is_none() {
            bail!("refresh_interval is too large: {}", self.refresh_interval);
        }
        if self.cache.cleanup_interval.checked_mul(60).is_none() {
            bail!(
                "cache.cleanup_interval is too large: {}",
                self.cache.cleanup_interval
            );
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                bail!("duplicate source name: {}", source.name);
            }
            let url = Url::parse(&source.feed_url).map_err(|e| {
                anyhow::anyhow!("invalid feed_url for '{}': {}", source.name, e)
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!(
                    "unsupported feed_url scheme for '{}': {}",
                    source.name,
                    url.scheme()
                );
            }
        }
        Ok(())
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(60))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval.saturating_mul(60))
    }
}
