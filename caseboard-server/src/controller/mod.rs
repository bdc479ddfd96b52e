// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Blackboard Controller - Priority Scheduling for Knowledge Sources
//!
//! Receives mutation records from the graph store, derives eligibility per
//! registered knowledge source, and schedules work on a priority queue.
//!
//! ## Architecture
//!
//! ```text
//! GraphStore ──notify()──► eligibility ──► BinaryHeap(priority, seq)
//!     ▲                    (dedup, cooldown,        │
//!     │                     per-case cap)           ▼
//!     └───── mutations ◄── knowledge source ◄── worker task(s)
//! ```
//!
//! `notify` is synchronous and enqueue-only; it is invoked by the store
//! while the store's lock is held, so no suspension occurs between a record
//! being produced and its classification here. That makes the dedup and
//! cooldown accounting race-free without re-entrant locks.
//!
//! Quiescence is guaranteed by three fences: at most one live task per
//! (source, case), a per-(source, case) cooldown, and a per-case lifetime
//! cap on enqueued tasks.

use caseboard_core::MutationRecord;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;

/// Scheduling priority; lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Clustering - dedup before wasting compute on duplicates.
    Critical = 0,
    /// Forensics and debunk propagation - evidence analysis.
    High = 1,
    /// Claim extraction, fact-checking, cross-referencing.
    Medium = 2,
    /// Role assignment after the others have had their say.
    Low = 3,
    /// Synthesis and cleanup.
    Background = 4,
}

/// What a knowledge source receives when it fires.
#[derive(Debug, Clone)]
pub struct TriggerPayload {
    pub event_type: String,
    pub case_id: String,
    pub record: MutationRecord,
}

pub type SourceHandler =
    Arc<dyn Fn(TriggerPayload) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type SourceCondition = Arc<dyn Fn(&TriggerPayload) -> bool + Send + Sync>;

struct KnowledgeSource {
    name: String,
    priority: Priority,
    trigger_types: Vec<String>,
    handler: SourceHandler,
    condition: Option<SourceCondition>,
    cooldown: Duration,
}

struct QueuedTask {
    priority: Priority,
    seq: u64,
    source_idx: usize,
    payload: TriggerPayload,
}

// Heap order is (priority, seq) only; seq is unique, so ties cannot occur.
impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedTask {}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

#[derive(Default)]
struct ControllerInner {
    queue: BinaryHeap<Reverse<QueuedTask>>,
    /// (source name, case id) pairs enqueued or running.
    active: HashSet<(String, String)>,
    /// Completion time of the last run per (source name, case id).
    last_run: HashMap<(String, String), Instant>,
    /// Tasks enqueued per case over the controller's lifetime.
    trigger_counts: HashMap<String, u32>,
    /// Cases already warned about cap saturation.
    cap_warned: HashSet<String>,
    /// Last mutation seen per case, for the optional idle reset.
    last_mutation: HashMap<String, Instant>,
    seq: u64,
    in_flight: usize,
}

pub struct BlackboardController {
    sources: RwLock<Vec<Arc<KnowledgeSource>>>,
    inner: Mutex<ControllerInner>,
    wake: Notify,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    tasks_completed: AtomicU64,

    max_triggers_per_case: u32,
    default_cooldown: Duration,
    handler_timeout: Duration,
    trigger_reset_idle: Option<Duration>,
    worker_concurrency: usize,
}

impl BlackboardController {
    pub fn new(engine: &EngineConfig) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            inner: Mutex::new(ControllerInner::default()),
            wake: Notify::new(),
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            tasks_completed: AtomicU64::new(0),
            max_triggers_per_case: engine.max_triggers_per_case,
            default_cooldown: engine.default_cooldown(),
            handler_timeout: engine.handler_timeout(),
            trigger_reset_idle: engine.trigger_reset_idle(),
            worker_concurrency: engine.worker_concurrency.max(1),
        }
    }

    /// Register a knowledge source. `cooldown` of `None` takes the
    /// configured default.
    pub fn register(
        &self,
        name: &str,
        priority: Priority,
        trigger_types: &[&str],
        handler: SourceHandler,
        condition: Option<SourceCondition>,
        cooldown: Option<Duration>,
    ) {
        let mut sources = self.sources.write();
        debug_assert!(
            sources.iter().all(|s| s.name != name),
            "knowledge source names must be unique"
        );
        sources.push(Arc::new(KnowledgeSource {
            name: name.to_string(),
            priority,
            trigger_types: trigger_types.iter().map(|t| t.to_string()).collect(),
            handler,
            condition,
            cooldown: cooldown.unwrap_or(self.default_cooldown),
        }));
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    /// Called by the graph store on every mutation, under the store's lock.
    /// Evaluates and enqueues matching sources; never blocks, never runs a
    /// handler inline.
    pub fn notify(&self, event_type: &str, record: &MutationRecord) {
        let case_id = record.case_id();
        if case_id.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut woken = 0usize;
        {
            let mut inner = self.inner.lock();

            if let Some(idle) = self.trigger_reset_idle {
                let quiet = inner
                    .last_mutation
                    .get(case_id)
                    .map(|last| now.duration_since(*last) >= idle)
                    .unwrap_or(false);
                if quiet && inner.trigger_counts.get(case_id).copied().unwrap_or(0) > 0 {
                    info!("Case {case_id} idle for {idle:?}, resetting trigger count");
                    inner.trigger_counts.remove(case_id);
                    inner.cap_warned.remove(case_id);
                }
            }
            inner.last_mutation.insert(case_id.to_string(), now);

            if inner.trigger_counts.get(case_id).copied().unwrap_or(0)
                >= self.max_triggers_per_case
            {
                self.warn_cap_once(&mut inner, case_id);
                return;
            }

            let sources = self.sources.read();
            for (idx, source) in sources.iter().enumerate() {
                if !source.trigger_types.iter().any(|t| t == event_type) {
                    continue;
                }
                let payload = TriggerPayload {
                    event_type: event_type.to_string(),
                    case_id: case_id.to_string(),
                    record: record.clone(),
                };
                if let Some(condition) = &source.condition {
                    if !condition(&payload) {
                        continue;
                    }
                }
                let key = (source.name.clone(), case_id.to_string());
                if inner.active.contains(&key) {
                    continue;
                }
                if let Some(last) = inner.last_run.get(&key) {
                    if now.duration_since(*last) < source.cooldown {
                        continue;
                    }
                }
                // Per-enqueue cap check: the cap bounds total tasks per
                // case over the controller's lifetime, not just per notify.
                if inner.trigger_counts.get(case_id).copied().unwrap_or(0)
                    >= self.max_triggers_per_case
                {
                    self.warn_cap_once(&mut inner, case_id);
                    break;
                }

                inner.seq += 1;
                let seq = inner.seq;
                inner.queue.push(Reverse(QueuedTask {
                    priority: source.priority,
                    seq,
                    source_idx: idx,
                    payload,
                }));
                inner.active.insert(key);
                *inner
                    .trigger_counts
                    .entry(case_id.to_string())
                    .or_insert(0) += 1;
                woken += 1;
                debug!(
                    "Enqueued {} for case {case_id} on {event_type} (seq {seq})",
                    source.name
                );
            }
        }
        for _ in 0..woken {
            self.wake.notify_one();
        }
    }

    fn warn_cap_once(&self, inner: &mut ControllerInner, case_id: &str) {
        if inner.cap_warned.insert(case_id.to_string()) {
            warn!(
                "Case {case_id} reached the anti-loop cap ({}); further triggers dropped",
                self.max_triggers_per_case
            );
        }
    }

    fn pop(&self) -> Option<QueuedTask> {
        let mut inner = self.inner.lock();
        let task = inner.queue.pop().map(|Reverse(task)| task);
        if task.is_some() {
            inner.in_flight += 1;
        }
        task
    }

    async fn run_task(&self, task: QueuedTask) {
        let source = {
            let sources = self.sources.read();
            sources.get(task.source_idx).cloned()
        };
        let key = (
            source
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            task.payload.case_id.clone(),
        );

        if let Some(source) = source {
            let name = source.name.clone();
            let case_id = task.payload.case_id.clone();
            // Spawned so a panicking handler is contained, and kept as a
            // handle so a timed-out handler can be cancelled.
            let mut handle = tokio::spawn((source.handler)(task.payload));
            match tokio::time::timeout(self.handler_timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    debug!("Knowledge source {name} completed for case {case_id}")
                }
                Ok(Ok(Err(e))) => {
                    error!("Knowledge source {name} failed for case {case_id}: {e:#}")
                }
                Ok(Err(join_err)) => {
                    error!("Knowledge source {name} panicked for case {case_id}: {join_err}")
                }
                Err(_) => {
                    handle.abort();
                    error!(
                        "Knowledge source {name} timed out after {:?} for case {case_id}",
                        self.handler_timeout
                    );
                }
            }
        }

        // Bookkeeping runs however the handler exited: the cooldown clock
        // starts and the dedup slot frees up even on error or timeout.
        let mut inner = self.inner.lock();
        inner.last_run.insert(key.clone(), Instant::now());
        inner.active.remove(&key);
        inner.in_flight -= 1;
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!("Controller worker {worker_id} started");
        loop {
            let notified = self.wake.notified();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Some(task) = self.pop() {
                self.run_task(task).await;
                continue;
            }
            notified.await;
        }
        debug!("Controller worker {worker_id} stopped");
    }

    /// Launch the worker task(s).
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_concurrency {
            let controller = Arc::clone(self);
            workers.push(tokio::spawn(controller.worker_loop(worker_id)));
        }
        info!(
            "Blackboard controller started ({} worker(s), {} source(s))",
            self.worker_concurrency,
            self.source_count()
        );
    }

    /// Stop dequeueing, let in-flight handlers finish, then clear the
    /// queue and the active set.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.await;
        }
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.active.clear();
        info!("Blackboard controller stopped");
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True when nothing is queued or in flight. Once idle, the engine
    /// stays idle until the next external mutation: no timer re-enqueues
    /// skipped work.
    pub fn idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.queue.is_empty() && inner.in_flight == 0 && inner.active.is_empty()
    }

    /// Poll until idle or `timeout` elapses. Returns whether the engine
    /// quiesced.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn trigger_count(&self, case_id: &str) -> u32 {
        self.inner
            .lock()
            .trigger_counts
            .get(case_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseboard_core::{GraphNode, NodeData, NodeKind};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn engine_config(cap: u32) -> EngineConfig {
        EngineConfig {
            max_triggers_per_case: cap,
            default_cooldown_secs: 0.0,
            handler_timeout_secs: 5.0,
            ..Default::default()
        }
    }

    fn report_record(case_id: &str, node_id: &str) -> MutationRecord {
        MutationRecord::AddNode {
            node: GraphNode {
                id: node_id.into(),
                kind: NodeKind::Report,
                case_id: case_id.into(),
                data: NodeData(json!({}).as_object().cloned().unwrap()),
                created_at: Utc::now(),
            },
        }
    }

    fn recording_handler(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> SourceHandler {
        Arc::new(move |_payload| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push(name.to_string());
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_tie_break() {
        let controller = Arc::new(BlackboardController::new(&engine_config(100)));
        let log = Arc::new(Mutex::new(Vec::new()));

        controller.register(
            "background",
            Priority::Background,
            &["node:report"],
            recording_handler(log.clone(), "background"),
            None,
            None,
        );
        controller.register(
            "critical",
            Priority::Critical,
            &["node:report"],
            recording_handler(log.clone(), "critical"),
            None,
            None,
        );
        controller.register(
            "medium_a",
            Priority::Medium,
            &["node:report"],
            recording_handler(log.clone(), "medium_a"),
            None,
            None,
        );
        controller.register(
            "medium_b",
            Priority::Medium,
            &["node:report"],
            recording_handler(log.clone(), "medium_b"),
            None,
            None,
        );

        // Enqueue everything before the worker starts so pop order is
        // fully determined by (priority, seq).
        controller.notify("node:report", &report_record("C1", "R-1"));
        controller.start();
        assert!(controller.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(
            *log.lock(),
            vec!["critical", "medium_a", "medium_b", "background"]
        );
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_dedup_one_instance_per_source_and_case() {
        let controller = Arc::new(BlackboardController::new(&engine_config(100)));
        let log = Arc::new(Mutex::new(Vec::new()));
        controller.register(
            "clustering",
            Priority::Critical,
            &["node:report"],
            recording_handler(log.clone(), "clustering"),
            None,
            None,
        );

        // Worker not started: the first notify occupies the (source, case)
        // slot, the second is deduplicated, a different case is not.
        controller.notify("node:report", &report_record("C1", "R-1"));
        controller.notify("node:report", &report_record("C1", "R-2"));
        controller.notify("node:report", &report_record("C2", "R-3"));
        assert_eq!(controller.trigger_count("C1"), 1);
        assert_eq!(controller.trigger_count("C2"), 1);

        controller.start();
        assert!(controller.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(log.lock().len(), 2);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_back_to_back_runs() {
        let mut config = engine_config(100);
        config.default_cooldown_secs = 60.0;
        let controller = Arc::new(BlackboardController::new(&config));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        controller.register(
            "network",
            Priority::Medium,
            &["node:report"],
            Arc::new(move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            None,
            None,
        );
        controller.start();

        controller.notify("node:report", &report_record("C1", "R-1"));
        assert!(controller.wait_idle(Duration::from_secs(2)).await);
        // Second trigger lands within the cooldown window.
        controller.notify("node:report", &report_record("C1", "R-2"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(controller.trigger_count("C1"), 1);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_anti_loop_cap_bounds_lifetime_tasks() {
        let controller = Arc::new(BlackboardController::new(&engine_config(3)));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        controller.register(
            "pathological",
            Priority::Critical,
            &["node:report"],
            Arc::new(move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            None,
            Some(Duration::ZERO),
        );
        controller.start();

        for i in 0..20 {
            controller.notify("node:report", &report_record("C1", &format!("R-{i}")));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(controller.wait_idle(Duration::from_secs(2)).await);

        assert_eq!(controller.trigger_count("C1"), 3);
        assert!(runs.load(Ordering::SeqCst) <= 3);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_bookkeeping_after_handler_failure_and_timeout() {
        let mut config = engine_config(100);
        config.handler_timeout_secs = 0.05;
        let controller = Arc::new(BlackboardController::new(&config));
        controller.register(
            "failing",
            Priority::High,
            &["node:report"],
            Arc::new(|_| Box::pin(async { anyhow::bail!("external service exploded") })),
            None,
            Some(Duration::ZERO),
        );
        controller.register(
            "hanging",
            Priority::High,
            &["node:report"],
            Arc::new(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
            }),
            None,
            Some(Duration::ZERO),
        );
        controller.start();

        controller.notify("node:report", &report_record("C1", "R-1"));
        // The hanging handler is cancelled at the 50ms timeout; both slots
        // must clear and the case must not be poisoned.
        assert!(controller.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(controller.tasks_completed(), 2);

        controller.notify("node:report", &report_record("C1", "R-2"));
        assert!(controller.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(controller.tasks_completed(), 4);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_condition_gates_enqueue() {
        let controller = Arc::new(BlackboardController::new(&engine_config(100)));
        let log = Arc::new(Mutex::new(Vec::new()));
        controller.register(
            "forensics",
            Priority::High,
            &["node:report"],
            recording_handler(log.clone(), "forensics"),
            Some(Arc::new(|payload: &TriggerPayload| {
                payload
                    .record
                    .node()
                    .map(|n| n.data.media_url().is_some())
                    .unwrap_or(false)
            })),
            None,
        );
        controller.start();

        controller.notify("node:report", &report_record("C1", "R-1"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().is_empty());
        assert_eq!(controller.trigger_count("C1"), 0);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_idle_reset_reopens_saturated_case() {
        let mut config = engine_config(2);
        config.trigger_reset_idle_secs = Some(0.2);
        let controller = Arc::new(BlackboardController::new(&config));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        controller.register(
            "clustering",
            Priority::Critical,
            &["node:report"],
            Arc::new(move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            None,
            Some(Duration::ZERO),
        );
        controller.start();

        for i in 0..4 {
            controller.notify("node:report", &report_record("C1", &format!("R-{i}")));
            assert!(controller.wait_idle(Duration::from_secs(2)).await);
        }
        assert_eq!(controller.trigger_count("C1"), 2);

        // Quiet period elapses; the next mutation reopens the case.
        tokio::time::sleep(Duration::from_millis(250)).await;
        controller.notify("node:report", &report_record("C1", "R-fresh"));
        assert!(controller.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(controller.trigger_count("C1"), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drains_and_clears() {
        let controller = Arc::new(BlackboardController::new(&engine_config(100)));
        controller.register(
            "slowish",
            Priority::Medium,
            &["node:report"],
            Arc::new(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(())
                })
            }),
            None,
            Some(Duration::ZERO),
        );
        controller.start();
        controller.notify("node:report", &report_record("C1", "R-1"));
        tokio::time::sleep(Duration::from_millis(5)).await;

        controller.stop().await;
        assert!(!controller.running());
        assert!(controller.idle());
    }
}
