use futures::StreamExt;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::refresh::{Applied, StateWrite};
use super::{Refresh, Watcher};
use crate::activity::{Activity, ActivitySignal};
use crate::client::LogStream;
use crate::error::{Result, WatchError};
use crate::model::{Handler, LogSource, Topic};

impl Watcher {
    pub async fn subscribe_to_namespaces(
        self: &Arc<Self>,
        notify: impl Fn() + Send + Sync + 'static,
    ) {
        self.subscribe_polling(Refresh::Namespaces, Arc::new(notify))
            .await;
    }

    pub async fn subscribe_to_task_groups(
        self: &Arc<Self>,
        job_id: &str,
        notify: impl Fn() + Send + Sync + 'static,
    ) {
        self.subscribe_polling(Refresh::TaskGroups(job_id.to_string()), Arc::new(notify))
            .await;
    }

    /// Tails the first task of `alloc_id`. An allocation that cannot be resolved
    /// leaves the current subscription in place.
    pub async fn subscribe_to_logs(
        self: &Arc<Self>,
        alloc_id: &str,
        source: LogSource,
        notify: impl Fn() + Send + Sync + 'static,
    ) -> Result<()> {
        let task = match self.resolve_task(alloc_id).await {
            Ok(task) => task,
            Err(error) => {
                self.notify_handler(Handler::Error, &error.to_string());
                return Err(error);
            }
        };

        let (activity, signal) = Activity::new(format!("logs {alloc_id}/{task} ({source})"));
        {
            let mut slot = self.lock_subscriber();
            self.install(&mut slot, Topic::Log, Arc::new(notify));
            self.store(Topic::Log, Box::new(|state| state.logs.clear()));
            self.activities.add(activity);
        }
        self.notify(Topic::Log);

        let frames = match self
            .nomad
            .logs(alloc_id, &task, source, signal.clone())
            .await
        {
            Ok(frames) => frames,
            Err(error) => {
                self.report(&format!("log stream for {alloc_id}/{task}"), &error);
                return Err(error.into());
            }
        };

        info!("tailing {source} of {alloc_id}/{task}");
        tokio::spawn(Arc::clone(self).tail_logs(frames, signal));
        Ok(())
    }

    async fn subscribe_polling(self: &Arc<Self>, refresh: Refresh, notify: super::NotifyFn) {
        let topic = refresh.topic();
        let fetched = self.fetch(&refresh).await;
        let (activity, signal) = Activity::new(format!("poll {}", refresh.label()));

        let failure = {
            let mut slot = self.lock_subscriber();
            self.install(&mut slot, topic, notify);
            let failure = match fetched {
                Ok(write) => {
                    self.store(topic, write);
                    None
                }
                Err(error) => Some(error),
            };
            self.activities.add(activity);
            failure
        };
        if let Some(error) = failure {
            self.report_refresh(&refresh, &error);
        }
        self.notify(topic);

        tokio::spawn(Arc::clone(self).poll(refresh, signal));
    }

    async fn poll(self: Arc<Self>, refresh: Refresh, mut signal: ActivitySignal) {
        let period = self.config.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = signal.cancelled() => break,
                _ = ticker.tick() => {
                    if self.refresh(&refresh, Some(&signal)).await == Applied::Cancelled {
                        break;
                    }
                    if !self.notify_active(refresh.topic(), &signal) {
                        break;
                    }
                }
            }
        }
        debug!("stopped polling {}", refresh.label());
    }

    async fn tail_logs(self: Arc<Self>, mut frames: LogStream, mut signal: ActivitySignal) {
        loop {
            tokio::select! {
                _ = signal.cancelled() => break,
                maybe_frame = frames.next() => match maybe_frame {
                    Some(Ok(frame)) => {
                        let data = frame.data;
                        let write: StateWrite = Box::new(move |state| state.logs.extend_from_slice(&data));
                        if !self.commit_active(Topic::Log, &signal, write) {
                            break;
                        }
                    }
                    Some(Err(error)) => self.report("log stream", &error),
                    None => {
                        debug!("log stream ended");
                        break;
                    }
                },
            }
        }
        debug!("stopped tailing logs");
    }

    fn notify_active(&self, topic: Topic, signal: &ActivitySignal) -> bool {
        let notify = {
            let slot = self.lock_subscriber();
            if signal.is_cancelled() {
                return false;
            }
            Self::notify_fn(&slot, topic)
        };
        if let Some(notify) = notify {
            notify();
        }
        true
    }

    fn commit_active(&self, topic: Topic, signal: &ActivitySignal, write: StateWrite) -> bool {
        let notify = {
            let slot = self.lock_subscriber();
            if signal.is_cancelled() {
                return false;
            }
            self.store(topic, write);
            Self::notify_fn(&slot, topic)
        };
        if let Some(notify) = notify {
            notify();
        }
        true
    }

    async fn resolve_task(&self, alloc_id: &str) -> Result<String> {
        if let Some(task) = self.cached_task(alloc_id)? {
            return Ok(task);
        }

        debug!("allocation {alloc_id} not cached, refreshing allocations");
        match self.fetch(&Refresh::Allocations).await {
            Ok(write) => {
                self.commit(&Refresh::Allocations, None, Ok(write));
            }
            Err(error) if error.is_not_found() => {
                return Err(WatchError::UnknownAllocation(alloc_id.to_string()));
            }
            Err(error) => return Err(error.into()),
        }
        self.cached_task(alloc_id)?
            .ok_or_else(|| WatchError::UnknownAllocation(alloc_id.to_string()))
    }

    fn cached_task(&self, alloc_id: &str) -> Result<Option<String>> {
        let state = self.state.read();
        let Some(alloc) = state.allocation(alloc_id) else {
            return Ok(None);
        };
        alloc
            .task_names
            .first()
            .cloned()
            .map(Some)
            .ok_or_else(|| WatchError::NoTasks(alloc_id.to_string()))
    }
}
