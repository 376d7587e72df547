//! In-memory view of a Nomad cluster for a terminal dashboard.
//!
//! A [`Watcher`] consumes the cluster event stream for jobs, deployments and
//! allocations, polls namespaces and task groups, and tails allocation logs.
//! Every update lands in a [`SharedState`] and is announced to the single view
//! currently subscribed to that [`Topic`].

pub mod activity;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod state;
pub mod telemetry;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{Activities, Activity, ActivityPool, ActivitySignal};
pub use client::{ClientError, ClientResult, EventStream, LogStream, Nomad};
pub use config::WatcherConfig;
pub use error::{Result, WatchError};
pub use model::{Handler, LogSource, SearchOptions, Topic};
pub use state::{SharedState, State};
pub use watcher::{HandlerFn, NotifyFn, Refresh, Watcher};
