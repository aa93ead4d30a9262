use crate::model::PeriodSlot;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const ENV_CONFIG_PATH: &str = "ATTENDANCED_CONFIG";
pub const ENV_API_BASE_URL: &str = "ATTENDANCED_API_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "ATTENDANCED_TIMEOUT_MS";
pub const ENV_TEACHER_EMAIL: &str = "ATTENDANCED_TEACHER_EMAIL";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// Opens a session at startup when set; otherwise the UI sends `session.open`.
    pub teacher_email: Option<String>,
    pub periods: Vec<PeriodSlot>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            teacher_email: None,
            periods: default_periods(),
        }
    }
}

pub fn default_periods() -> Vec<PeriodSlot> {
    [
        ("09:00-10:00", false),
        ("10:00-11:00", false),
        ("11:00-11:30", true),
        ("11:30-12:30", false),
        ("12:30-13:30", false),
        ("13:30-14:30", false),
        ("14:30-15:30", false),
    ]
    .into_iter()
    .map(|(label, is_break)| PeriodSlot {
        label: label.to_string(),
        is_break,
    })
    .collect()
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// File named by `ATTENDANCED_CONFIG` first, then individual env overrides.
    pub fn load_with<F>(env: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match env(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
            Some(p) => Self::from_file(Path::new(p.trim()))?,
            None => Config::default(),
        };

        if let Some(v) = env(ENV_API_BASE_URL) {
            cfg.api_base_url = v.trim().to_string();
        }
        if let Some(v) = env(ENV_TIMEOUT_MS) {
            cfg.request_timeout_ms = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be an integer", ENV_TIMEOUT_MS))?;
        }
        if let Some(v) = env(ENV_TEACHER_EMAIL) {
            let v = v.trim();
            if !v.is_empty() {
                cfg.teacher_email = Some(v.to_string());
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "apiBaseUrl must start with http:// or https://, got {:?}",
                self.api_base_url
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(anyhow!("requestTimeoutMs must be > 0"));
        }
        let mut seen = HashSet::new();
        for p in &self.periods {
            if p.label.trim().is_empty() {
                return Err(anyhow!("period labels must not be empty"));
            }
            if !seen.insert(p.label.as_str()) {
                return Err(anyhow!("duplicate period label {:?}", p.label));
            }
        }
        Ok(())
    }

    pub fn period(&self, label: &str) -> Option<&PeriodSlot> {
        self.periods.iter().find(|p| p.label == label)
    }
}
