// tests/common/mod.rs
// Scripted source client shared by the scheduler and API tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portfolio_refresh::refresh::error::FetchError;
use portfolio_refresh::refresh::types::RepoRecord;
use portfolio_refresh::{Record, SourceClient, SourceKind};
use tokio::sync::{Notify, Semaphore};

#[derive(Clone, Debug)]
pub enum Step {
    Items(Vec<Record>),
    Network,
    Auth,
    Parse,
    Panic,
}

/// Plays back `Step`s in order; the last step repeats forever.
/// A gated client blocks every fetch until `release` adds a permit.
pub struct ScriptedClient {
    source: SourceKind,
    script: Mutex<VecDeque<Step>>,
    gate: Semaphore,
    pub started: Notify,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(source: SourceKind, steps: Vec<Step>) -> Arc<Self> {
        Self::build(source, steps, Semaphore::MAX_PERMITS)
    }

    pub fn gated(source: SourceKind, steps: Vec<Step>) -> Arc<Self> {
        Self::build(source, steps, 0)
    }

    fn build(source: SourceKind, steps: Vec<Step>, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            source,
            script: Mutex::new(steps.into()),
            gate: Semaphore::new(permits),
            started: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Step::Items(vec![]))
        }
    }
}

#[async_trait::async_trait]
impl SourceClient for ScriptedClient {
    async fn fetch(&self, _identifier: &str) -> Result<Vec<Record>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();

        match self.next_step() {
            Step::Items(items) => Ok(items),
            Step::Network => Err(FetchError::Network("connection reset".into())),
            Step::Auth => Err(FetchError::Auth { status: 401 }),
            Step::Parse => Err(FetchError::parse("unexpected shape", "<html>")),
            Step::Panic => panic!("scripted client panic"),
        }
    }

    fn source(&self) -> SourceKind {
        self.source
    }
}

pub fn repo(name: &str) -> Record {
    Record::Repo(RepoRecord {
        name: name.into(),
        description: Some(format!("{name} description")),
        url: format!("https://github.com/someone/{name}"),
        language: Some("Rust".into()),
        stars: 1,
        forks: 0,
        updated_at: None,
        fork: false,
    })
}

/// Poll `cond` every 10ms (virtual time when paused) until it holds.
pub async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
