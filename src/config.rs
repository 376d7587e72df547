use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Topic;

const MIN_POLL_INTERVAL_MS: u64 = 100;
const MIN_RECONNECT_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub resume_index: u64,
    #[serde(alias = "poll_ms", alias = "interval_ms")]
    pub poll_interval_ms: u64,
    pub force_update_capacity: usize,
    #[serde(alias = "force_update_timeout")]
    pub force_update_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub stream_topics: Vec<Topic>,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
    #[serde(skip)]
    pub source: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            resume_index: 1000,
            poll_interval_ms: 2000,
            force_update_capacity: 8,
            force_update_timeout_ms: 2000,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            stream_topics: Topic::STREAMED.to_vec(),
            log_filter: "info".to_string(),
            log_file: None,
            source: None,
        }
    }
}

impl WatcherConfig {
    pub fn discover() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read watcher config {}", path.display()))?;
        let mut parsed = Self::parse(&raw)
            .with_context(|| format!("failed to parse watcher config {}", path.display()))?;
        parsed.source = Some(path.display().to_string());
        Ok(parsed)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Self = serde_yaml::from_str(raw)?;
        Ok(parsed.normalized())
    }

    fn normalized(mut self) -> Self {
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self.force_update_capacity = self.force_update_capacity.max(1);
        self.reconnect_initial_ms = self.reconnect_initial_ms.max(MIN_RECONNECT_MS);
        self.reconnect_max_ms = self.reconnect_max_ms.max(self.reconnect_initial_ms);
        self.stream_topics.retain(|topic| topic.is_streamed());
        self.stream_topics.sort();
        self.stream_topics.dedup();
        if self.stream_topics.is_empty() {
            self.stream_topics = Topic::STREAMED.to_vec();
        }
        if self.log_filter.trim().is_empty() {
            self.log_filter = "info".to_string();
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn force_update_timeout(&self) -> Duration {
        Duration::from_millis(self.force_update_timeout_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

const CONFIG_ENV: &str = "NOMAD_WATCH_CONFIG";
const LOCAL_CONFIGS: [&str; 3] = ["nomad-watch.yaml", "nomad-watch.yml", ".nomad-watch.yaml"];
const USER_CONFIG: &str = ".config/nomad-watch/config.yaml";

fn discover_config_path() -> Option<PathBuf> {
    let explicit = std::env::var(CONFIG_ENV).ok();
    let home = std::env::var_os("HOME").map(PathBuf::from);
    resolve_config_path(explicit.as_deref(), home.as_deref(), Path::exists)
}

fn resolve_config_path(
    explicit: Option<&str>,
    home: Option<&Path>,
    exists: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    if let Some(path) = explicit.map(str::trim).filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    LOCAL_CONFIGS
        .iter()
        .map(PathBuf::from)
        .chain(home.map(|home| home.join(USER_CONFIG)))
        .find(|candidate| exists(candidate.as_path()))
}
