use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Alloc, Deployment, Job, Namespace, TaskGroup, Topic};

#[derive(Debug, Clone, Default)]
pub struct State {
    pub jobs: Vec<Job>,
    pub deployments: Vec<Deployment>,
    pub allocations: Vec<Alloc>,
    pub namespaces: Vec<Namespace>,
    pub task_groups: Vec<TaskGroup>,
    pub logs: Vec<u8>,
    pub last_event_index: Option<u64>,
    updated_at: HashMap<Topic, DateTime<Local>>,
}

impl State {
    pub fn updated_at(&self, topic: Topic) -> Option<DateTime<Local>> {
        self.updated_at.get(&topic).copied()
    }

    pub fn mark_updated(&mut self, topic: Topic, at: DateTime<Local>) {
        self.updated_at.insert(topic, at);
    }

    pub fn allocation(&self, id: &str) -> Option<&Alloc> {
        self.allocations.iter().find(|alloc| alloc.id == id)
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn logs_text(&self) -> String {
        String::from_utf8_lossy(&self.logs).into_owned()
    }

    pub fn len_of(&self, topic: Topic) -> usize {
        match topic {
            Topic::Job => self.jobs.len(),
            Topic::Deployment => self.deployments.len(),
            Topic::Allocation => self.allocations.len(),
            Topic::Namespace => self.namespaces.len(),
            Topic::TaskGroup => self.task_groups.len(),
            Topic::Log => self.logs.len(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<State>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not hold the guard while calling into the watcher.
    pub fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> State {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::SharedState;
    use crate::model::{Alloc, Topic};
    use chrono::Local;

    #[test]
    fn allocation_lookup_scans_cached_list() {
        let state = SharedState::new();
        state.write().allocations = vec![
            Alloc {
                id: "a1".to_string(),
                ..Alloc::default()
            },
            Alloc {
                id: "a2".to_string(),
                task_names: vec!["web".to_string()],
                ..Alloc::default()
            },
        ];

        let guard = state.read();
        assert_eq!(
            guard.allocation("a2").map(|alloc| alloc.task_names.clone()),
            Some(vec!["web".to_string()])
        );
        assert!(guard.allocation("missing").is_none());
    }

    #[test]
    fn updated_at_tracks_each_topic_independently() {
        let state = SharedState::new();
        let now = Local::now();
        state.write().mark_updated(Topic::Job, now);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.updated_at(Topic::Job), Some(now));
        assert_eq!(snapshot.updated_at(Topic::Deployment), None);
    }

    #[test]
    fn log_length_is_reported_in_bytes() {
        let state = SharedState::new();
        state.write().logs.extend_from_slice("héllo".as_bytes());
        assert_eq!(state.read().len_of(Topic::Log), 6);
        assert_eq!(state.read().logs_text(), "héllo");
    }
}
