use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

pub trait Activities: Send + Sync {
    fn add(&self, activity: Activity);
    fn deactivate_all(&self);
}

#[derive(Debug)]
pub struct Activity {
    label: String,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ActivitySignal {
    cancel: watch::Receiver<bool>,
}

impl Activity {
    pub fn new(label: impl Into<String>) -> (Self, ActivitySignal) {
        let (cancel, rx) = watch::channel(false);
        (
            Self {
                label: label.into(),
                cancel,
            },
            ActivitySignal { cancel: rx },
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn signal(&self) -> ActivitySignal {
        ActivitySignal {
            cancel: self.cancel.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn deactivate(self) {
        self.cancel();
    }
}

impl ActivitySignal {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        // Err means the owning Activity is gone, which counts as cancellation.
        let _ = self.cancel.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Default)]
pub struct ActivityPool {
    activities: Mutex<Vec<Activity>>,
}

impl ActivityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Activity>> {
        self.activities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Activities for ActivityPool {
    fn add(&self, activity: Activity) {
        debug!("activity added: {}", activity.label());
        self.lock().push(activity);
    }

    fn deactivate_all(&self) {
        let drained = std::mem::take(&mut *self.lock());
        for activity in drained {
            debug!("activity deactivated: {}", activity.label());
            activity.deactivate();
        }
    }
}
