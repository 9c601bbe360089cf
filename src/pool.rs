//! Subscriber worker pool management.
//!
//! Workers are external processes that subscribe to the fabric and report
//! per-message latency as CSV on stdout. The pool manager reconciles the live
//! worker count toward the desired count by at most one spawn or one
//! termination per tick, bounding per-tick cost and avoiding process-creation
//! storms.
//!
//! Each spawned worker gets a dedicated stdout reader task forwarding complete
//! lines over an unbounded channel (the same pattern the harness uses for
//! fabric connections), which gives the rest of the harness a non-blocking
//! view of the worker's output stream. Stderr is passthrough-logged.
//!
//! The readiness handshake is carried across ticks: a freshly spawned worker
//! sits in a pending slot and its handshake is advanced one non-blocking step
//! per reconcile call, so a slow-starting worker never stalls polling of the
//! workers that are already live.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The single readiness sentinel a worker emits once its subscription is live.
pub const READY_SENTINEL: &str = "Starting Subscription";

/// How a worker process is launched.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable (defaults to the bundled `subscriber-worker` binary)
    pub command: PathBuf,
    pub fabric_address: String,
    pub fabric_port: u16,
    pub username: String,
    pub password: String,
    pub topic: String,
    /// Deadline for the readiness handshake after spawn
    pub readiness_timeout: Duration,
}

/// A live worker process plus its captured output stream.
///
/// Owned exclusively by the pool manager; destroyed (killed and awaited) on
/// pool shrink or shutdown. Workers are never assumed to self-terminate.
pub struct WorkerHandle {
    id: String,
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// One non-blocking read attempt against the captured stdout stream.
    pub fn try_next_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }

    /// Kill the worker and reap it. No drain: latency records still in
    /// flight for this worker are lost.
    pub async fn terminate(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(worker = %self.id, "kill signal failed (already exited?): {}", e);
        }
        match self.child.wait().await {
            Ok(status) => debug!(worker = %self.id, "worker exited: {}", status),
            Err(e) => warn!(worker = %self.id, "failed to reap worker: {}", e),
        }
        self.stdout_task.abort();
        self.stderr_task.abort();
    }
}

/// A spawned worker whose readiness handshake has not completed yet.
struct PendingWorker {
    id: String,
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    deadline: Instant,
}

impl PendingWorker {
    fn into_handle(self) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            child: self.child,
            lines: self.lines,
            stdout_task: self.stdout_task,
            stderr_task: self.stderr_task,
        }
    }

    async fn cancel(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        self.stdout_task.abort();
        self.stderr_task.abort();
    }
}

/// Result of one reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Live count already matched the desired count
    Unchanged,
    Spawned(String),
    Terminated(String),
    /// A spawned worker's readiness handshake is still in flight; it will
    /// be advanced again on the next call without blocking this one.
    Pending(String),
    /// The worker exited or timed out before its readiness handshake; the
    /// next reconciliation tick will try again.
    SpawnFailed(String),
}

/// Reconciles the live subscriber-worker set toward the desired count.
pub struct WorkerPoolManager {
    config: WorkerConfig,
    workers: Vec<WorkerHandle>,
    pending: Option<PendingWorker>,
    next_worker_index: u64,
}

impl WorkerPoolManager {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            workers: Vec::new(),
            pending: None,
            next_worker_index: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.workers.len()
    }

    /// Mutable view of the live workers for transport polling.
    pub fn workers_mut(&mut self) -> &mut [WorkerHandle] {
        &mut self.workers
    }

    /// Move the live set one step toward `desired`.
    ///
    /// At most one spawn, one handshake step, or one termination per call;
    /// calling repeatedly with an unchanged desired count is an idempotent
    /// no-op. A failed spawn is reported, not retried within the same call.
    /// No call blocks on a spawning worker.
    pub async fn reconcile(&mut self, desired: usize) -> ReconcileOutcome {
        if let Some(pending) = self.pending.take() {
            if self.workers.len() >= desired {
                // The desired count dropped below the in-flight spawn.
                let id = pending.id.clone();
                pending.cancel().await;
                info!(worker = %id, desired, "in-flight worker spawn cancelled");
                return ReconcileOutcome::Terminated(id);
            }
            return self.advance_pending(pending).await;
        }

        let live = self.workers.len();
        if live < desired {
            match self.begin_spawn() {
                Ok(pending) => self.advance_pending(pending).await,
                Err(e) => {
                    let id = format!("sub-{}", self.next_worker_index - 1);
                    warn!(worker = %id, "worker spawn failed: {:#}", e);
                    ReconcileOutcome::SpawnFailed(id)
                }
            }
        } else if live > desired {
            // Shrink from the most-recently-added end.
            let handle = self
                .workers
                .pop()
                .expect("live > desired implies a worker exists");
            let id = handle.id.clone();
            handle.terminate().await;
            info!(worker = %id, live = live - 1, desired, "subscriber worker terminated");
            ReconcileOutcome::Terminated(id)
        } else {
            ReconcileOutcome::Unchanged
        }
    }

    /// Tear down every remaining worker, the spawning one included. Called
    /// exactly once at shutdown.
    pub async fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel().await;
        }
        while let Some(handle) = self.workers.pop() {
            handle.terminate().await;
        }
    }

    /// Launch one worker process and start its readiness handshake.
    fn begin_spawn(&mut self) -> Result<PendingWorker> {
        let id = format!("sub-{}", self.next_worker_index);
        self.next_worker_index += 1;

        let mut child = Command::new(&self.config.command)
            .arg(&id)
            .arg("--fabric-address")
            .arg(&self.config.fabric_address)
            .arg("--fabric-port")
            .arg(self.config.fabric_port.to_string())
            .arg("--username")
            .arg(&self.config.username)
            .arg("--password")
            .arg(&self.config.password)
            .arg("--subscription-topic")
            .arg(&self.config.topic)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker command {:?}", self.config.command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("worker stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("worker stderr not captured"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stdout_task = spawn_stdout_forwarder(stdout, tx);
        let stderr_task = spawn_stderr_logger(id.clone(), stderr);
        debug!(worker = %id, "worker spawned, awaiting readiness");

        Ok(PendingWorker {
            id,
            child,
            lines: rx,
            stdout_task,
            stderr_task,
            deadline: Instant::now() + self.config.readiness_timeout,
        })
    }

    /// Advance an in-flight readiness handshake one non-blocking step: drain
    /// whatever stdout lines have already arrived looking for the sentinel,
    /// check for worker exit, enforce the deadline, otherwise park the
    /// worker again until the next tick.
    async fn advance_pending(&mut self, mut pending: PendingWorker) -> ReconcileOutcome {
        loop {
            match pending.lines.try_recv() {
                Ok(line) if line.trim() == READY_SENTINEL => {
                    let handle = pending.into_handle();
                    let id = handle.id.clone();
                    info!(
                        worker = %id,
                        live = self.workers.len() + 1,
                        "subscriber worker ready"
                    );
                    self.workers.push(handle);
                    return ReconcileOutcome::Spawned(id);
                }
                Ok(line) => {
                    debug!(worker = %pending.id, "pre-readiness output: {}", line.trim());
                }
                Err(_) => break,
            }
        }

        match pending.child.try_wait() {
            Ok(Some(status)) => {
                let id = pending.id.clone();
                pending.stdout_task.abort();
                pending.stderr_task.abort();
                warn!(worker = %id, "worker exited before readiness handshake: {}", status);
                return ReconcileOutcome::SpawnFailed(id);
            }
            Ok(None) => {}
            Err(e) => {
                let id = pending.id.clone();
                pending.cancel().await;
                warn!(worker = %id, "could not poll spawning worker: {}", e);
                return ReconcileOutcome::SpawnFailed(id);
            }
        }

        if Instant::now() >= pending.deadline {
            let id = pending.id.clone();
            pending.cancel().await;
            warn!(worker = %id, "worker readiness handshake timed out");
            return ReconcileOutcome::SpawnFailed(id);
        }

        let id = pending.id.clone();
        self.pending = Some(pending);
        ReconcileOutcome::Pending(id)
    }
}

fn spawn_stdout_forwarder(
    stdout: ChildStdout,
    tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn spawn_stderr_logger(id: String, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(worker = %id, "stderr: {}", line);
        }
    })
}
