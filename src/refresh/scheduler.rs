// src/refresh/scheduler.rs
//! Recurring refresh triggers, one independent tokio task per source.
//!
//! Each source runs a cycle as soon as the scheduler starts, then waits its
//! cadence after the cycle completes. A per-source in-flight flag makes
//! cycles for the same source mutually exclusive: a trigger that finds the
//! flag set is skipped and counted, never queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::refresh::error::ConfigError;
use crate::refresh::store::SnapshotStore;
use crate::refresh::types::{SourceClient, SourceConfig, SourceKind};
use crate::refresh::{run_cycle, CycleOutcome};

/// Exponential backoff applied to network errors inside one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub max_retries: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// No retries; failures wait for the next cadence tick.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << shift).min(self.max_delay)
    }
}

/// Sleep for `d`, returning `false` early if stop is signalled (or the
/// scheduler is gone).
pub(crate) async fn sleep_unless_stopped(d: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if *stop.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = sleep_until(deadline) => return true,
            changed = stop.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

struct Job {
    config: SourceConfig,
    cadence: Duration,
    client: Arc<dyn SourceClient>,
    in_flight: AtomicBool,
    skipped: AtomicU64,
    completed: AtomicU64,
    /// Cycles in flight across all sources; shared with the scheduler.
    active: Arc<watch::Sender<usize>>,
}

/// Releases the source's in-flight flag when the cycle ends, including on panic.
struct InFlightGuard {
    job: Arc<Job>,
}

impl InFlightGuard {
    fn acquire(job: &Arc<Job>) -> Option<Self> {
        job.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        job.active.send_modify(|n| *n += 1);
        Some(Self { job: job.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.job.in_flight.store(false, Ordering::Release);
        self.job.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Result of an out-of-band trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A cycle is running; the handle resolves when it has written the store.
    Started(JoinHandle<CycleOutcome>),
    /// A cycle for this source was already in flight.
    Skipped,
    /// The scheduler has been stopped.
    Stopped,
    /// No such source is registered.
    Unknown,
}

pub struct Scheduler {
    store: Arc<SnapshotStore>,
    backoff: Backoff,
    jobs: HashMap<SourceKind, Arc<Job>>,
    stop_tx: watch::Sender<bool>,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<watch::Sender<usize>>,
}

impl Scheduler {
    pub fn new(store: Arc<SnapshotStore>, backoff: Backoff) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            backoff,
            jobs: HashMap::new(),
            stop_tx,
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            active: Arc::new(watch::channel(0).0),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Registered sources in `SourceKind` order.
    pub fn sources(&self) -> Vec<SourceKind> {
        let mut v: Vec<_> = self.jobs.keys().copied().collect();
        v.sort();
        v
    }

    pub fn register_source(
        &mut self,
        config: SourceConfig,
        cadence: Duration,
        client: Arc<dyn SourceClient>,
    ) -> Result<(), ConfigError> {
        let source = config.source;
        if self.started.load(Ordering::Acquire) {
            return Err(ConfigError::AlreadyStarted);
        }
        if cadence.is_zero() {
            return Err(ConfigError::NonPositiveCadence(source));
        }
        if config.identifier.trim().is_empty() {
            return Err(ConfigError::EmptyIdentifier(source));
        }
        if client.source() != source {
            return Err(ConfigError::SourceMismatch {
                config: source,
                client: client.source(),
            });
        }
        if self.jobs.contains_key(&source) {
            return Err(ConfigError::DuplicateSource(source));
        }

        tracing::info!(
            target: "refresh",
            %source,
            identifier = %config.identifier,
            cadence_secs = cadence.as_secs(),
            "source registered"
        );
        self.jobs.insert(
            source,
            Arc::new(Job {
                config,
                cadence,
                client,
                in_flight: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                active: self.active.clone(),
            }),
        );
        Ok(())
    }

    /// Spawn one loop per registered source. Each loop fires immediately.
    pub fn start(&self) {
        if *self.stop_tx.borrow() {
            tracing::warn!(target: "refresh", "start() after stop(); ignoring");
            return;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!(target: "refresh", "scheduler already started");
            return;
        }

        let mut handles = match self.handles.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        for source in self.sources() {
            let Some(job) = self.jobs.get(&source).cloned() else {
                continue;
            };
            let store = self.store.clone();
            let backoff = self.backoff;
            let stop = self.stop_tx.subscribe();
            handles.push(tokio::spawn(source_loop(job, store, backoff, stop)));
        }
        tracing::info!(target: "refresh", sources = handles.len(), "refresh scheduler started");
    }

    /// Cancel all pending triggers. In-flight cycles run to completion.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
        tracing::info!(target: "refresh", "refresh scheduler stopping");
    }

    /// `stop()` and wait until every loop has exited and every in-flight
    /// cycle, scheduled or manual, has written the store.
    pub async fn shutdown(&self) {
        self.stop();
        let handles = {
            let mut guard = match self.handles.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        for h in handles {
            if let Err(e) = h.await {
                tracing::error!(target: "refresh", error = %e, "source loop ended abnormally");
            }
        }
        let mut active = self.active.subscribe();
        let closed = active.wait_for(|n| *n == 0).await.is_err();
        if closed {
            tracing::debug!(target: "refresh", "cycle counter closed");
        }
        tracing::info!(target: "refresh", "refresh scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Run one cycle for `source` now, outside its cadence.
    pub fn trigger(&self, source: SourceKind) -> TriggerOutcome {
        if self.is_stopped() {
            return TriggerOutcome::Stopped;
        }
        let Some(job) = self.jobs.get(&source) else {
            return TriggerOutcome::Unknown;
        };
        let Some(guard) = InFlightGuard::acquire(job) else {
            record_skip(job, "manual");
            return TriggerOutcome::Skipped;
        };
        let store = self.store.clone();
        let backoff = self.backoff;
        let stop = self.stop_tx.subscribe();
        tracing::info!(target: "refresh", %source, "manual refresh triggered");
        TriggerOutcome::Started(tokio::spawn(guarded_cycle(guard, store, backoff, stop)))
    }

    /// Triggers skipped because a cycle was already running.
    pub fn skipped(&self, source: SourceKind) -> u64 {
        self.jobs
            .get(&source)
            .map_or(0, |j| j.skipped.load(Ordering::Relaxed))
    }

    /// Cycles that ran to completion (successful or not).
    pub fn completed(&self, source: SourceKind) -> u64 {
        self.jobs
            .get(&source)
            .map_or(0, |j| j.completed.load(Ordering::Relaxed))
    }

    pub fn is_in_flight(&self, source: SourceKind) -> bool {
        self.jobs
            .get(&source)
            .is_some_and(|j| j.in_flight.load(Ordering::Acquire))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

fn record_skip(job: &Job, trigger: &'static str) {
    let source = job.config.source;
    job.skipped.fetch_add(1, Ordering::Relaxed);
    counter!("refresh_skipped_total", "source" => source.as_str()).increment(1);
    tracing::warn!(target: "refresh", %source, trigger, "fetch still in flight; trigger skipped");
}

/// Run one cycle while holding the source's guard. The cycle gets its own
/// task so a panicking client is caught here, for scheduled and manual
/// triggers alike.
async fn guarded_cycle(
    guard: InFlightGuard,
    store: Arc<SnapshotStore>,
    backoff: Backoff,
    mut stop: watch::Receiver<bool>,
) -> CycleOutcome {
    let job = guard.job.clone();
    let source = job.config.source;

    let cycle = {
        let job = job.clone();
        let store = store.clone();
        tokio::spawn(async move {
            run_cycle(&job.config, job.client.as_ref(), &store, &backoff, &mut stop).await
        })
    };
    let outcome = match cycle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = e.to_string();
            tracing::error!(target: "refresh", %source, error = %message, "refresh cycle panicked");
            store.mark_stale(source, format!("refresh cycle panicked: {message}"));
            counter!("refresh_cycles_total", "source" => source.as_str(), "outcome" => "panic")
                .increment(1);
            CycleOutcome::Panicked { message }
        }
    };

    job.completed.fetch_add(1, Ordering::Relaxed);
    drop(guard);
    outcome
}

async fn source_loop(
    job: Arc<Job>,
    store: Arc<SnapshotStore>,
    backoff: Backoff,
    mut stop: watch::Receiver<bool>,
) {
    let source = job.config.source;
    loop {
        if *stop.borrow_and_update() {
            break;
        }

        match InFlightGuard::acquire(&job) {
            Some(guard) => {
                guarded_cycle(guard, store.clone(), backoff, stop.clone()).await;
            }
            None => record_skip(&job, "schedule"),
        }

        if !sleep_unless_stopped(job.cadence, &mut stop).await {
            break;
        }
    }
    tracing::info!(target: "refresh", %source, "schedule stopped");
}
