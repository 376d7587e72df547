mod refresh;
mod subscriptions;

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::activity::{Activities, Activity, ActivityPool};
use crate::client::{ClientError, ClientResult, EventStream, Nomad};
use crate::config::WatcherConfig;
use crate::error::{Result, WatchError};
use crate::model::{Events, Handler, Topic, Topics, topic_filter};
use crate::state::SharedState;

pub use refresh::Refresh;

pub type NotifyFn = Arc<dyn Fn() + Send + Sync>;
pub type HandlerFn = Arc<dyn Fn(&str) + Send + Sync>;

struct Subscriber {
    topic: Topic,
    notify: NotifyFn,
}

#[derive(Default)]
struct Handlers {
    error: Option<HandlerFn>,
    info: Option<HandlerFn>,
}

impl Handlers {
    fn slot(&mut self, kind: Handler) -> &mut Option<HandlerFn> {
        match kind {
            Handler::Error => &mut self.error,
            Handler::Info => &mut self.info,
        }
    }
}

pub struct Watcher {
    state: SharedState,
    nomad: Arc<dyn Nomad>,
    config: WatcherConfig,
    subscriber: Mutex<Option<Subscriber>>,
    handlers: Mutex<Handlers>,
    activities: Arc<dyn Activities>,
    force_tx: mpsc::Sender<Topic>,
    force_rx: Mutex<Option<mpsc::Receiver<Topic>>>,
    watching: AtomicBool,
    shutdown: Activity,
}

impl Watcher {
    pub fn new(state: SharedState, nomad: Arc<dyn Nomad>, config: WatcherConfig) -> Self {
        let (force_tx, force_rx) = mpsc::channel(config.force_update_capacity.max(1));
        let (shutdown, _) = Activity::new("watch loop");
        Self {
            state,
            nomad,
            config,
            subscriber: Mutex::new(None),
            handlers: Mutex::new(Handlers::default()),
            activities: Arc::new(ActivityPool::new()),
            force_tx,
            force_rx: Mutex::new(Some(force_rx)),
            watching: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn with_activities(mut self, activities: Arc<dyn Activities>) -> Self {
        self.activities = activities;
        self
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn address(&self) -> String {
        self.nomad.address()
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    pub fn subscribed_topic(&self) -> Option<Topic> {
        self.lock_subscriber().as_ref().map(|subscriber| subscriber.topic)
    }

    /// Installs `notify` as the only subscriber and stops every background
    /// task started for the previous one. Call this before registering a new
    /// task with the activity pool.
    pub fn subscribe(&self, topic: Topic, notify: impl Fn() + Send + Sync + 'static) {
        let mut slot = self.lock_subscriber();
        self.install(&mut slot, topic, Arc::new(notify));
    }

    pub fn unsubscribe(&self) {
        if let Some(previous) = self.lock_subscriber().take() {
            debug!("unsubscribed from {}", previous.topic);
        }
    }

    pub fn subscribe_handler(&self, kind: Handler, handle: impl Fn(&str) + Send + Sync + 'static) {
        *self.lock_handlers().slot(kind) = Some(Arc::new(handle));
    }

    pub fn notify_handler(&self, kind: Handler, message: &str) {
        let handle = self.lock_handlers().slot(kind).clone();
        if let Some(handle) = handle {
            handle(message);
        }
    }

    pub fn notify(&self, topic: Topic) {
        let notify = Self::notify_fn(&self.lock_subscriber(), topic);
        if let Some(notify) = notify {
            notify();
        }
    }

    pub async fn force_update(&self) -> Result<()> {
        if !self.is_watching() {
            return Err(WatchError::NotWatching);
        }
        let topic = self.subscribed_topic().ok_or(WatchError::NoSubscriber)?;
        let timeout = self.config.force_update_timeout();
        self.force_tx
            .send_timeout(topic, timeout)
            .await
            .map_err(|error| match error {
                SendTimeoutError::Timeout(_) => WatchError::ForceUpdateTimeout(timeout),
                SendTimeoutError::Closed(_) => WatchError::NotWatching,
            })
    }

    pub fn shutdown(&self) {
        info!("watcher shutting down");
        self.shutdown.cancel();
        self.activities.deactivate_all();
    }

    pub async fn watch(&self) -> Result<()> {
        let mut force_rx = self
            .force_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(WatchError::AlreadyWatching)?;
        self.watching.store(true, Ordering::Release);
        let mut shutdown = self.shutdown.signal();

        let topics = topic_filter(&self.config.stream_topics);
        let mut index = self.config.resume_index;
        let mut backoff = Backoff::new(self.config.reconnect_initial(), self.config.reconnect_max());
        let mut events = self.open_stream(&topics, index).await;

        self.update(Topic::Job, false).await;
        self.update(Topic::Deployment, false).await;

        let reconnect = sleep(Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_pending = false;
        if events.is_none() {
            reconnect.as_mut().reset(Instant::now() + backoff.next_delay());
            reconnect_pending = true;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe_batch = next_batch(&mut events) => match maybe_batch {
                    Some(Ok(batch)) => {
                        backoff.reset();
                        index = index.max(self.record_index(&batch));
                        for event in &batch.events {
                            self.update(event.topic, true).await;
                        }
                    }
                    Some(Err(error)) => self.report("event stream", &error),
                    None => {
                        warn!("event stream closed, resuming from index {index}");
                        events = None;
                        reconnect.as_mut().reset(Instant::now() + backoff.next_delay());
                        reconnect_pending = true;
                    }
                },
                () = &mut reconnect, if reconnect_pending => {
                    reconnect_pending = false;
                    events = self.open_stream(&topics, index).await;
                    if events.is_some() {
                        self.notify_handler(Handler::Info, "event stream reconnected");
                    } else {
                        reconnect.as_mut().reset(Instant::now() + backoff.next_delay());
                        reconnect_pending = true;
                    }
                }
                maybe_topic = force_rx.recv() => {
                    let Some(topic) = maybe_topic else { break };
                    debug!("forced update for {topic}");
                    self.update(topic, true).await;
                }
            }
        }

        self.watching.store(false, Ordering::Release);
        self.activities.deactivate_all();
        info!("watch loop stopped");
        Ok(())
    }

    async fn open_stream(&self, topics: &Topics, index: u64) -> Option<EventStream> {
        match self.nomad.stream(topics, index).await {
            Ok(stream) => {
                info!("event stream opened at index {index} on {}", self.nomad.address());
                Some(stream)
            }
            Err(error) => {
                self.report("event stream", &error);
                None
            }
        }
    }

    fn record_index(&self, batch: &Events) -> u64 {
        let last = batch.last_index();
        if last == 0 {
            return 0;
        }
        self.state.write().last_event_index = Some(last);
        last.saturating_add(1)
    }

    async fn update(&self, topic: Topic, notify: bool) {
        let refresh = match topic {
            Topic::Job => Some(Refresh::Jobs),
            Topic::Deployment => Some(Refresh::Deployments),
            Topic::Allocation => Some(Refresh::Allocations),
            Topic::Namespace => Some(Refresh::Namespaces),
            // kept current by their own background task
            Topic::TaskGroup | Topic::Log => None,
        };
        if let Some(refresh) = refresh {
            self.refresh(&refresh, None).await;
        }
        if notify {
            self.notify(topic);
        }
    }

    fn report(&self, context: &str, error: &ClientError) {
        warn!("{context} failed: {error}");
        self.notify_handler(Handler::Error, &error.to_string());
    }

    fn install(&self, slot: &mut Option<Subscriber>, topic: Topic, notify: NotifyFn) {
        *slot = Some(Subscriber { topic, notify });
        self.activities.deactivate_all();
        info!("subscribed to {topic}");
    }

    fn notify_fn(slot: &Option<Subscriber>, topic: Topic) -> Option<NotifyFn> {
        slot.as_ref()
            .filter(|subscriber| subscriber.topic == topic)
            .map(|subscriber| Arc::clone(&subscriber.notify))
    }

    fn lock_subscriber(&self) -> MutexGuard<'_, Option<Subscriber>> {
        self.subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn next_batch(events: &mut Option<EventStream>) -> Option<ClientResult<Events>> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
