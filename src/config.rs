use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::executor::ExecutionConfig;
use crate::scrape::ScrapeConfig;

/// How to get hold of a browser.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    /// Websocket URL of an already running browser (local or cloud-provisioned)
    pub cdp_url: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Persistent user-data dir so logins survive between runs
    pub profile_dir: Option<PathBuf>,
    /// Per-candidate wait when resolving a locator
    pub resolve_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub browser: BrowserConfig,
    pub execution: ExecutionConfig,
    pub scrape: ScrapeConfig,
}

impl Config {
    /// Read from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let millis = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("{key} must be a number of milliseconds, got '{v}'")),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let headless = match lookup("BROWSER_HEADLESS") {
            Some(v) => parse_bool(&v).with_context(|| format!("BROWSER_HEADLESS: '{v}'"))?,
            None => true,
        };

        let max_scrolls = match lookup("SCRAPE_MAX_SCROLLS") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .with_context(|| format!("SCRAPE_MAX_SCROLLS must be a count, got '{v}'"))?,
            None => 200,
        };

        let defaults = ScrapeConfig::default();

        Ok(Self {
            browser: BrowserConfig {
                cdp_url: lookup("BROWSER_CDP_URL").filter(|v| !v.trim().is_empty()),
                chrome_path: lookup("CHROME_PATH").map(PathBuf::from),
                headless,
                profile_dir: lookup("BROWSER_PROFILE_DIR").map(PathBuf::from),
                resolve_timeout: millis("RESOLVE_TIMEOUT_MS", 3000)?,
            },
            execution: ExecutionConfig {
                stabilization_wait: millis("STABILIZATION_WAIT_MS", 1000)?,
            },
            scrape: ScrapeConfig {
                response_filter: lookup("SCRAPE_RESPONSE_FILTER")
                    .unwrap_or(defaults.response_filter),
                poll_interval: millis("SCRAPE_POLL_MS", 1500)?,
                settle_delay: millis("SCRAPE_SETTLE_MS", 5000)?,
                max_height_checks: max_scrolls,
            },
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected true/false, got '{other}'"),
    }
}
