use thiserror::Error;

use crate::client::ClientError;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no active subscriber")]
    NoSubscriber,

    #[error("watch loop is not running")]
    NotWatching,

    #[error("watch loop is already running")]
    AlreadyWatching,

    #[error("forced update timed out after {0:?}")]
    ForceUpdateTimeout(std::time::Duration),

    #[error("allocation {0} not found")]
    UnknownAllocation(String),

    #[error("allocation {0} has no tasks")]
    NoTasks(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}
