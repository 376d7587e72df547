use chrono::Local;
use tracing::debug;

use super::Watcher;
use crate::activity::ActivitySignal;
use crate::client::{ClientError, ClientResult};
use crate::model::{SearchOptions, Topic};
use crate::state::State;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Refresh {
    Jobs,
    Deployments,
    Allocations,
    Namespaces,
    TaskGroups(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) enum Applied {
    Stored,
    Failed,
    Cancelled,
}

pub(super) type StateWrite = Box<dyn FnOnce(&mut State) + Send>;

impl Refresh {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Jobs => Topic::Job,
            Self::Deployments => Topic::Deployment,
            Self::Allocations => Topic::Allocation,
            Self::Namespaces => Topic::Namespace,
            Self::TaskGroups(_) => Topic::TaskGroup,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::TaskGroups(job_id) => format!("task groups of {job_id}"),
            other => other.topic().title().to_string(),
        }
    }
}

impl Watcher {
    pub(super) async fn refresh(
        &self,
        refresh: &Refresh,
        signal: Option<&ActivitySignal>,
    ) -> Applied {
        let fetched = self.fetch(refresh).await;
        self.commit(refresh, signal, fetched)
    }

    pub(super) async fn fetch(&self, refresh: &Refresh) -> ClientResult<StateWrite> {
        let write: StateWrite = match refresh {
            Refresh::Jobs => {
                let jobs = self.nomad.jobs(&SearchOptions::all_namespaces()).await?;
                Box::new(move |state| state.jobs = jobs)
            }
            Refresh::Deployments => {
                let deployments = self
                    .nomad
                    .deployments(&SearchOptions::all_namespaces())
                    .await?;
                Box::new(move |state| state.deployments = deployments)
            }
            Refresh::Allocations => {
                let allocations = self
                    .nomad
                    .allocations(&SearchOptions::all_namespaces())
                    .await?;
                Box::new(move |state| state.allocations = allocations)
            }
            Refresh::Namespaces => {
                let namespaces = self.nomad.namespaces(&SearchOptions::default()).await?;
                Box::new(move |state| state.namespaces = namespaces)
            }
            Refresh::TaskGroups(job_id) => {
                let opts = self.task_group_options(job_id);
                debug!("querying task groups of {job_id} in {} namespace", opts.namespace);
                let task_groups = self.nomad.task_groups(job_id, &opts).await?;
                Box::new(move |state| state.task_groups = task_groups)
            }
        };
        Ok(write)
    }

    pub(super) fn commit(
        &self,
        refresh: &Refresh,
        signal: Option<&ActivitySignal>,
        fetched: ClientResult<StateWrite>,
    ) -> Applied {
        let write = match fetched {
            Ok(write) => write,
            Err(error) => {
                if signal.is_some_and(ActivitySignal::is_cancelled) {
                    return Applied::Cancelled;
                }
                self.report_refresh(refresh, &error);
                return Applied::Failed;
            }
        };

        // Subscriptions deactivate under this lock, so the check and the write
        // cannot straddle a view switch.
        let _slot = self.lock_subscriber();
        if signal.is_some_and(ActivitySignal::is_cancelled) {
            debug!("discarding {} refresh from a deactivated task", refresh.label());
            return Applied::Cancelled;
        }
        self.store(refresh.topic(), write);
        Applied::Stored
    }

    /// Writes into the state store. Callers hold the subscriber lock.
    pub(super) fn store(&self, topic: Topic, write: StateWrite) {
        let mut state = self.state.write();
        write(&mut state);
        state.mark_updated(topic, Local::now());
        debug!("{topic} refreshed ({} entries)", state.len_of(topic));
    }

    fn task_group_options(&self, job_id: &str) -> SearchOptions {
        self.state
            .read()
            .job(job_id)
            .filter(|job| !job.namespace.is_empty())
            .map(|job| SearchOptions::in_namespace(job.namespace.clone()))
            .unwrap_or_default()
    }

    pub(super) fn report_refresh(&self, refresh: &Refresh, error: &ClientError) {
        self.report(&format!("{} refresh", refresh.label()), error);
    }
}
