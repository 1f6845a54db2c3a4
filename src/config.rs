use crate::content;
use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Target authors, in report iteration order.
    pub authors: Vec<String>,
    /// Community tag posts and comments must carry to count.
    pub community: String,
    /// Target language code for the bilingual halving rule.
    #[serde(default = "default_language")]
    pub language: String,
    /// Candidate API endpoints, tried in this order on every call.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Trailing activity window for posts and comments.
    #[serde(default)]
    pub window: WindowConfig,
    /// Longer trailing window for poll participation.
    #[serde(default = "WindowConfig::poll_default")]
    pub poll_window: WindowConfig,
    /// Known poll custom_json ids for the compliance variant.
    #[serde(default)]
    pub polls: Vec<String>,
    /// Beneficiary account the compliance report looks for.
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default)]
    pub reports: ReportConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WindowConfig {
    pub days: i64,
    pub hours: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        // Just short of a full week, matching the weekly report cadence.
        Self { days: 6, hours: 23 }
    }
}

impl WindowConfig {
    fn poll_default() -> Self {
        Self { days: 21, hours: 23 }
    }

    pub fn start_before(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - Duration::days(self.days) - Duration::hours(self.hours)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_entries_file")]
    pub entries_file: String,
    #[serde(default = "default_authors_file")]
    pub authors_file: String,
    /// When set, the ranked score lines are also written here.
    #[serde(default)]
    pub scores_file: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            entries_file: default_entries_file(),
            authors_file: default_authors_file(),
            scores_file: None,
        }
    }
}

fn default_language() -> String {
    "it".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_entries_file() -> String {
    "entries.txt".to_string()
}

fn default_authors_file() -> String {
    "authors_list.txt".to_string()
}

fn default_endpoints() -> Vec<String> {
    vec![
        "https://api.deathwing.me".to_string(),
        "https://api.hive.blog".to_string(),
        "https://hive-api.arcange.eu".to_string(),
        "https://api.openhive.network".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authors: vec![
                "libertycrypto27".to_string(),
                "will91".to_string(),
                "steveguereschi".to_string(),
                "lozio71".to_string(),
                "harbiter".to_string(),
                "arc7icwolf".to_string(),
            ],
            community: "hive-146620".to_string(),
            language: default_language(),
            endpoints: default_endpoints(),
            timeout_seconds: default_timeout(),
            window: WindowConfig::default(),
            poll_window: WindowConfig::poll_default(),
            polls: Vec::new(),
            beneficiary: Some("balaenoptera".to_string()),
            reports: ReportConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let rendered =
            serde_yaml::to_string(&Config::default()).context("rendering default configuration")?;
        std::fs::write(path, rendered)
            .with_context(|| format!("writing configuration {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.authors.is_empty() {
            bail!("no target authors configured");
        }
        if self.community.is_empty() {
            bail!("no target community configured");
        }
        if self.endpoints.is_empty() {
            bail!("no API endpoints configured");
        }
        for endpoint in &self.endpoints {
            Url::parse(endpoint).with_context(|| format!("invalid endpoint URL: {endpoint}"))?;
        }
        if content::parse_language(&self.language).is_none() {
            bail!("unsupported language code: {}", self.language);
        }
        for window in [&self.window, &self.poll_window] {
            if window.days < 0 || window.hours < 0 {
                bail!("window sizes must be non-negative");
            }
            if window.days == 0 && window.hours == 0 {
                bail!("window size must be greater than zero");
            }
        }
        Ok(())
    }
}
