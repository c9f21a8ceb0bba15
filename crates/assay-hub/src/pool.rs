//! Sandbox Worker Pool - bounded concurrent script execution
//!
//! A fixed set of worker threads each own one [`SandboxRuntime`]. A single
//! dispatcher task owns all scheduling state, so no locks are involved:
//!
//! ```text
//!  callers ──Submit──▶ dispatcher ──Job──▶ worker thread (runtime 0)
//!     ▲                  │  ▲      ──Job──▶ worker thread (runtime 1)
//!     └──── oneshot ─────┘  └──────Completion──────┘
//! ```
//!
//! - A submission goes to the first idle worker, otherwise to the back of a
//!   FIFO queue
//! - Every job carries a correlation id; its completion is routed back to
//!   the caller waiting on that id
//! - Each completion frees its worker and starts at most one queued job
//!
//! At most `size` scripts run at once. A worker whose runtime faulted is
//! given a fresh runtime when `respawn_on_fault` is set. A worker that
//! cannot build a runtime stays up and fails each job it receives.

use crate::config::HubConfig;
use crate::error::{Error, Result};
use assay_core::{IndexMap, Value};
use assay_script::{MacroSnapshot, RuntimeState, SandboxLimits, SandboxRuntime};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Builds a runtime on a worker thread
pub type RuntimeFactory = Arc<dyn Fn() -> SandboxRuntime + Send + Sync>;

type Outcome = assay_script::Result<Value>;

/// One script run
#[derive(Debug, Clone)]
pub struct Task {
    pub script: Arc<str>,
    pub bindings: IndexMap<String, Value>,
    pub snapshot: Arc<MacroSnapshot>,
}

impl Task {
    pub fn new(script: impl Into<Arc<str>>) -> Self {
        Self {
            script: script.into(),
            bindings: IndexMap::new(),
            snapshot: Arc::new(MacroSnapshot::default()),
        }
    }

    pub fn with_bindings(mut self, bindings: IndexMap<String, Value>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Arc<MacroSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub size: usize,
    pub busy: usize,
    pub queued: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub faults: u64,
}

enum Command {
    Submit {
        task: Task,
        reply: oneshot::Sender<Outcome>,
    },
    Stats(oneshot::Sender<PoolStats>),
}

struct Job {
    correlation: u64,
    task: Task,
}

struct Completion {
    worker: usize,
    correlation: u64,
    outcome: Outcome,
}

/// Handle to the pool; clones share the same workers
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl WorkerPool {
    /// Start a pool whose runtimes use the configured memory limit
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &HubConfig) -> Result<Self> {
        let limits = SandboxLimits::with_memory_mb(config.memory_limit_mb);
        Self::with_factory(config, Arc::new(move || SandboxRuntime::new(limits)))
    }

    /// Start a pool with a custom runtime factory
    pub fn with_factory(config: &HubConfig, factory: RuntimeFactory) -> Result<Self> {
        let size = config.pool_size();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let (jobs_tx, jobs_rx) = std_mpsc::channel::<Job>();
            let worker = WorkerLoop {
                index,
                factory: Arc::clone(&factory),
                jobs: jobs_rx,
                done: completions_tx.clone(),
                timeout: config.timeout(),
                respawn_on_fault: config.respawn_on_fault,
            };
            thread::Builder::new()
                .name(format!("assay-sandbox-{}", index))
                .spawn(move || worker.run())
                .map_err(|e| Error::Join(format!("failed to spawn sandbox worker: {}", e)))?;
            workers.push(WorkerSlot {
                jobs: jobs_tx,
                busy: false,
            });
        }
        drop(completions_tx);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            workers,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            next_correlation: 0,
            dispatched: 0,
            completed: 0,
            faults: 0,
        };
        tokio::spawn(dispatcher.run(commands_rx, completions_rx));

        info!(size, timeout_ms = config.timeout_ms, "sandbox pool started");
        Ok(Self {
            commands: commands_tx,
            size,
        })
    }

    /// Number of runtimes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a task and return the receiver for its outcome
    ///
    /// The task is handed to the dispatcher before this returns, so tasks
    /// enqueued one after another run in that order.
    pub fn enqueue(&self, task: Task) -> Result<oneshot::Receiver<Outcome>> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Submit { task, reply })
            .map_err(|_| Error::PoolClosed)?;
        Ok(outcome)
    }

    /// Run a task and wait for its outcome
    pub async fn submit(&self, task: Task) -> Result<Value> {
        let outcome = self.enqueue(task)?.await.map_err(|_| Error::PoolClosed)?;
        Ok(outcome?)
    }

    /// Current counters
    pub async fn stats(&self) -> Result<PoolStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(tx))
            .map_err(|_| Error::PoolClosed)?;
        rx.await.map_err(|_| Error::PoolClosed)
    }
}

struct WorkerSlot {
    jobs: std_mpsc::Sender<Job>,
    busy: bool,
}

struct Pending {
    reply: oneshot::Sender<Outcome>,
}

struct Dispatcher {
    workers: Vec<WorkerSlot>,
    queue: VecDeque<(Task, oneshot::Sender<Outcome>)>,
    pending: HashMap<u64, Pending>,
    next_correlation: u64,
    dispatched: u64,
    completed: u64,
    faults: u64,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                Some(done) = completions.recv() => self.complete(done),
                command = commands.recv() => match command {
                    Some(Command::Submit { task, reply }) => self.submit(task, reply),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    None => break,
                },
            }
        }
        debug!(in_flight = self.pending.len(), "sandbox pool dispatcher stopped");
    }

    fn idle_worker(&self) -> Option<usize> {
        self.workers.iter().position(|w| !w.busy)
    }

    fn submit(&mut self, task: Task, reply: oneshot::Sender<Outcome>) {
        match self.idle_worker() {
            Some(worker) => self.dispatch(worker, task, reply),
            None => self.queue.push_back((task, reply)),
        }
    }

    fn dispatch(&mut self, worker: usize, task: Task, reply: oneshot::Sender<Outcome>) {
        let correlation = self.next_correlation;
        self.next_correlation += 1;

        let slot = &mut self.workers[worker];
        if let Err(std_mpsc::SendError(job)) = slot.jobs.send(Job { correlation, task }) {
            error!(worker, correlation = job.correlation, "sandbox worker is gone");
            let _ = reply.send(Err(assay_script::Error::Faulted(format!(
                "sandbox worker {} is unavailable",
                worker
            ))));
            return;
        }
        slot.busy = true;
        self.dispatched += 1;
        self.pending.insert(correlation, Pending { reply });
    }

    fn complete(&mut self, done: Completion) {
        self.completed += 1;
        if matches!(done.outcome, Err(assay_script::Error::Faulted(_))) {
            self.faults += 1;
        }
        match self.pending.remove(&done.correlation) {
            // the caller may have stopped waiting
            Some(pending) => {
                let _ = pending.reply.send(done.outcome);
            }
            None => warn!(correlation = done.correlation, "completion for unknown task"),
        }

        if let Some(slot) = self.workers.get_mut(done.worker) {
            slot.busy = false;
        }
        if let Some((task, reply)) = self.queue.pop_front() {
            self.dispatch(done.worker, task, reply);
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.workers.len(),
            busy: self.workers.iter().filter(|w| w.busy).count(),
            queued: self.queue.len(),
            dispatched: self.dispatched,
            completed: self.completed,
            faults: self.faults,
        }
    }
}

struct WorkerLoop {
    index: usize,
    factory: RuntimeFactory,
    jobs: std_mpsc::Receiver<Job>,
    done: mpsc::UnboundedSender<Completion>,
    timeout: Duration,
    respawn_on_fault: bool,
}

impl WorkerLoop {
    fn run(self) {
        let Some(mut runtime) = self.build() else {
            return self.refuse_jobs();
        };
        while let Ok(job) = self.jobs.recv() {
            let Job { correlation, task } = job;
            let outcome = runtime.run(&task.script, &task.bindings, task.snapshot, self.timeout);
            let faulted = runtime.state() == RuntimeState::Faulted;

            let completion = Completion {
                worker: self.index,
                correlation,
                outcome,
            };
            if self.done.send(completion).is_err() {
                break;
            }

            if faulted && self.respawn_on_fault {
                warn!(worker = self.index, "replacing faulted sandbox runtime");
                match self.build() {
                    Some(fresh) => runtime = fresh,
                    None => return self.refuse_jobs(),
                }
            }
        }
        debug!(worker = self.index, runs = runtime.runs(), "sandbox worker exiting");
    }

    fn build(&self) -> Option<SandboxRuntime> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(runtime) => Some(runtime),
            Err(_) => {
                error!(worker = self.index, "sandbox runtime factory panicked");
                None
            }
        }
    }

    /// Answer every remaining job with a fault
    fn refuse_jobs(self) {
        while let Ok(job) = self.jobs.recv() {
            let completion = Completion {
                worker: self.index,
                correlation: job.correlation,
                outcome: Err(assay_script::Error::Faulted(format!(
                    "sandbox worker {} has no runtime",
                    self.index
                ))),
            };
            if self.done.send(completion).is_err() {
                break;
            }
        }
        debug!(worker = self.index, "sandbox worker exiting without runtime");
    }
}
