use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

use crate::activity::ActivitySignal;
use crate::client::{ClientError, ClientResult, EventStream, LogStream, Nomad};
use crate::model::{
    Alloc, Deployment, Events, Job, LogSource, Namespace, SearchOptions, StreamFrame, TaskGroup,
    Topics,
};

pub(crate) struct Scripted<T> {
    returns: Option<Result<T, (u16, String)>>,
    on_call: VecDeque<Result<T, (u16, String)>>,
    calls: usize,
}

impl<T> Default for Scripted<T> {
    fn default() -> Self {
        Self {
            returns: None,
            on_call: VecDeque::new(),
            calls: 0,
        }
    }
}

impl<T: Clone + Default> Scripted<T> {
    pub fn set(&mut self, value: T) {
        self.returns = Some(Ok(value));
    }

    pub fn fail(&mut self, message: &str) {
        self.fail_with(500, message);
    }

    pub fn fail_with(&mut self, status: u16, message: &str) {
        self.returns = Some(Err((status, message.to_string())));
    }

    pub fn push(&mut self, result: Result<T, String>) {
        self.on_call.push_back(result.map_err(|message| (500, message)));
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    fn next(&mut self) -> ClientResult<T> {
        self.calls += 1;
        self.on_call
            .pop_front()
            .or_else(|| self.returns.clone())
            .unwrap_or_else(|| Ok(T::default()))
            .map_err(|(status, message)| ClientError::api(status, message))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LogCall {
    pub alloc_id: String,
    pub task: String,
    pub source: LogSource,
}

#[derive(Default)]
pub(crate) struct FakeNomad {
    pub job_list: Mutex<Scripted<Vec<Job>>>,
    pub deployment_list: Mutex<Scripted<Vec<Deployment>>>,
    pub allocation_list: Mutex<Scripted<Vec<Alloc>>>,
    pub job_alloc_list: Mutex<Scripted<Vec<Alloc>>>,
    pub namespace_list: Mutex<Scripted<Vec<Namespace>>>,
    pub task_group_list: Mutex<Scripted<Vec<TaskGroup>>>,
    pub task_group_calls: Mutex<Vec<(String, SearchOptions)>>,
    pub task_group_gate: Mutex<Option<Arc<Semaphore>>>,
    pub streams: Mutex<VecDeque<ClientResult<EventStream>>>,
    pub stream_calls: Mutex<Vec<u64>>,
    pub log_streams: Mutex<VecDeque<ClientResult<LogStream>>>,
    pub log_calls: Mutex<Vec<LogCall>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("fake lock poisoned")
}

impl FakeNomad {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_stream(&self) -> UnboundedSender<ClientResult<Events>> {
        let (tx, rx) = unbounded();
        lock(&self.streams).push_back(Ok(rx.boxed()));
        tx
    }

    pub fn push_stream_error(&self, message: &str) {
        lock(&self.streams).push_back(Err(ClientError::Stream(message.to_string())));
    }

    pub fn push_log_stream(&self) -> UnboundedSender<ClientResult<StreamFrame>> {
        let (tx, rx) = unbounded();
        lock(&self.log_streams).push_back(Ok(rx.boxed()));
        tx
    }

    pub fn gate_task_groups(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *lock(&self.task_group_gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn stream_indexes(&self) -> Vec<u64> {
        lock(&self.stream_calls).clone()
    }
}

#[async_trait]
impl Nomad for FakeNomad {
    fn address(&self) -> String {
        "http://fake-nomad:4646".to_string()
    }

    async fn jobs(&self, _opts: &SearchOptions) -> ClientResult<Vec<Job>> {
        lock(&self.job_list).next()
    }

    async fn namespaces(&self, _opts: &SearchOptions) -> ClientResult<Vec<Namespace>> {
        lock(&self.namespace_list).next()
    }

    async fn deployments(&self, _opts: &SearchOptions) -> ClientResult<Vec<Deployment>> {
        lock(&self.deployment_list).next()
    }

    async fn task_groups(
        &self,
        job_id: &str,
        opts: &SearchOptions,
    ) -> ClientResult<Vec<TaskGroup>> {
        lock(&self.task_group_calls).push((job_id.to_string(), opts.clone()));
        let result = lock(&self.task_group_list).next();
        let gate = lock(&self.task_group_gate).clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        result
    }

    async fn allocations(&self, _opts: &SearchOptions) -> ClientResult<Vec<Alloc>> {
        lock(&self.allocation_list).next()
    }

    async fn job_allocs(&self, _job_id: &str, _opts: &SearchOptions) -> ClientResult<Vec<Alloc>> {
        lock(&self.job_alloc_list).next()
    }

    async fn logs(
        &self,
        alloc_id: &str,
        task: &str,
        source: LogSource,
        _cancel: ActivitySignal,
    ) -> ClientResult<LogStream> {
        lock(&self.log_calls).push(LogCall {
            alloc_id: alloc_id.to_string(),
            task: task.to_string(),
            source,
        });
        lock(&self.log_streams)
            .pop_front()
            .unwrap_or_else(|| Ok(futures::stream::pending().boxed()))
    }

    async fn stream(&self, _topics: &Topics, index: u64) -> ClientResult<EventStream> {
        lock(&self.stream_calls).push(index);
        lock(&self.streams)
            .pop_front()
            .unwrap_or_else(|| Ok(futures::stream::pending().boxed()))
    }
}

pub(crate) fn job(id: &str, namespace: &str) -> Job {
    Job {
        id: id.to_string(),
        name: id.to_string(),
        namespace: namespace.to_string(),
        status: "running".to_string(),
        ..Job::default()
    }
}

pub(crate) fn namespace(name: &str) -> Namespace {
    Namespace {
        name: name.to_string(),
        description: String::new(),
    }
}

pub(crate) fn task_group(name: &str, job_id: &str) -> TaskGroup {
    TaskGroup {
        name: name.to_string(),
        job_id: job_id.to_string(),
        running: 1,
        ..TaskGroup::default()
    }
}

pub(crate) fn alloc(id: &str, tasks: &[&str]) -> Alloc {
    Alloc {
        id: id.to_string(),
        name: format!("{id}.web[0]"),
        task_names: tasks.iter().map(|task| task.to_string()).collect(),
        ..Alloc::default()
    }
}

pub(crate) fn frame(data: &str) -> StreamFrame {
    StreamFrame {
        data: data.as_bytes().to_vec(),
        ..StreamFrame::default()
    }
}
