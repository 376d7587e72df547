use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Topic {
    Job,
    Deployment,
    Allocation,
    Namespace,
    TaskGroup,
    Log,
}

impl Topic {
    pub const ALL: [Self; 6] = [
        Self::Job,
        Self::Deployment,
        Self::Allocation,
        Self::Namespace,
        Self::TaskGroup,
        Self::Log,
    ];

    pub const STREAMED: [Self; 3] = [Self::Job, Self::Deployment, Self::Allocation];

    pub fn title(self) -> &'static str {
        match self {
            Self::Job => "Job",
            Self::Deployment => "Deployment",
            Self::Allocation => "Allocation",
            Self::Namespace => "Namespace",
            Self::TaskGroup => "TaskGroup",
            Self::Log => "Log",
        }
    }

    pub fn is_streamed(self) -> bool {
        Self::STREAMED.contains(&self)
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Handler {
    Error,
    Info,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum NamespaceScope {
    All,
    #[default]
    Default,
    Named(String),
}

impl NamespaceScope {
    pub fn label(&self) -> Option<String> {
        match self {
            Self::All => Some("*".to_string()),
            Self::Default => None,
            Self::Named(namespace) => Some(namespace.clone()),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Default => write!(f, "default"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SearchOptions {
    pub namespace: NamespaceScope,
    pub region: Option<String>,
}

impl SearchOptions {
    pub fn all_namespaces() -> Self {
        Self {
            namespace: NamespaceScope::All,
            region: None,
        }
    }

    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: NamespaceScope::Named(namespace.into()),
            region: None,
        }
    }
}

pub type Topics = BTreeMap<Topic, Vec<String>>;

pub fn topic_filter(topics: &[Topic]) -> Topics {
    topics
        .iter()
        .map(|topic| (*topic, vec!["*".to_string()]))
        .collect()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    #[default]
    Stdout,
    Stderr,
}

impl LogSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl Display for LogSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub job_type: String,
    pub status: String,
    pub status_summary: BTreeMap<String, u32>,
    pub submit_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    pub id: String,
    pub job_id: String,
    pub namespace: String,
    pub status: String,
    pub status_description: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alloc {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub job_id: String,
    pub task_group: String,
    pub task_names: Vec<String>,
    pub desired_status: String,
    pub client_status: String,
    pub node_id: String,
    pub node_name: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGroup {
    pub name: String,
    pub job_id: String,
    pub queued: u32,
    pub complete: u32,
    pub failed: u32,
    pub running: u32,
    pub starting: u32,
    pub lost: u32,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamFrame {
    pub offset: i64,
    pub data: Vec<u8>,
    pub file: String,
    pub file_event: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Events {
    pub index: u64,
    pub events: Vec<Event>,
}

impl Events {
    pub fn last_index(&self) -> u64 {
        self.events
            .iter()
            .map(|event| event.index)
            .fold(self.index, u64::max)
    }
}
