use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::activity::ActivitySignal;
use crate::model::{
    Alloc, Deployment, Events, Job, LogSource, Namespace, SearchOptions, StreamFrame, TaskGroup,
    Topics,
};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

pub type EventStream = BoxStream<'static, ClientResult<Events>>;

pub type LogStream = BoxStream<'static, ClientResult<StreamFrame>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {address} failed: {message}")]
    Transport { address: String, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Api { status: 404, .. })
    }
}

#[async_trait]
pub trait Nomad: Send + Sync {
    fn address(&self) -> String;

    async fn jobs(&self, opts: &SearchOptions) -> ClientResult<Vec<Job>>;

    async fn namespaces(&self, opts: &SearchOptions) -> ClientResult<Vec<Namespace>>;

    async fn deployments(&self, opts: &SearchOptions) -> ClientResult<Vec<Deployment>>;

    async fn task_groups(&self, job_id: &str, opts: &SearchOptions)
    -> ClientResult<Vec<TaskGroup>>;

    async fn allocations(&self, opts: &SearchOptions) -> ClientResult<Vec<Alloc>>;

    async fn job_allocs(&self, job_id: &str, opts: &SearchOptions) -> ClientResult<Vec<Alloc>>;

    /// Tails the log of `task` inside `alloc_id`. The implementation should stop
    /// producing once `cancel` fires.
    async fn logs(
        &self,
        alloc_id: &str,
        task: &str,
        source: LogSource,
        cancel: ActivitySignal,
    ) -> ClientResult<LogStream>;

    async fn stream(&self, topics: &Topics, index: u64) -> ClientResult<EventStream>;
}
