//! Automation: an ordered queue of method keys replayed one at a time
//!
//! [`Sequencer::run`] snapshots the queue, then for each key prepares the
//! request from the workspace, executes it, feeds the response back for token
//! extraction and records the outcome. Failures never stop a run; only
//! [`Sequencer::stop`] does, checked at the top of each step.

use crate::collection::MethodKey;
use crate::config::{AutomationConfig, SharedConfig};
use crate::error::{AppError, AppResult};
use crate::executor::{Exchange, HttpExecutor};
use crate::workspace::SharedWorkspace;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latest outcome of a queued method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
    Failure,
}

impl StepStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Success => "✅",
            Self::Failure => "❌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub key: MethodKey,
    pub status: StepStatus,
}

impl QueueEntry {
    /// The key, prefixed with its outcome marker once it has run
    pub fn label(&self) -> String {
        match self.status {
            StepStatus::Pending => self.key.to_string(),
            status => format!("{} {}", status.marker(), self.key),
        }
    }
}

/// User-ordered list of methods to replay. Never reordered automatically.
#[derive(Debug, Clone, Default)]
pub struct AutomationQueue {
    entries: Vec<QueueEntry>,
}

impl AutomationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: MethodKey) -> AppResult<()> {
        if self.contains(&key) {
            return Err(AppError::AlreadyQueued(key.to_string()));
        }
        self.entries.push(QueueEntry {
            key,
            status: StepStatus::Pending,
        });
        Ok(())
    }

    /// Append every key not already queued, returning how many were added
    pub fn add_all(&mut self, keys: impl IntoIterator<Item = MethodKey>) -> usize {
        keys.into_iter()
            .filter_map(|key| self.add(key).ok())
            .count()
    }

    pub fn remove(&mut self, index: usize) -> AppResult<MethodKey> {
        if index >= self.entries.len() {
            return Err(AppError::QueuePosition(index));
        }
        Ok(self.entries.remove(index).key)
    }

    /// Swap with the previous entry; returns the new index
    pub fn move_up(&mut self, index: usize) -> AppResult<usize> {
        if index >= self.entries.len() {
            return Err(AppError::QueuePosition(index));
        }
        if index == 0 {
            return Ok(0);
        }
        self.entries.swap(index, index - 1);
        Ok(index - 1)
    }

    /// Swap with the next entry; returns the new index
    pub fn move_down(&mut self, index: usize) -> AppResult<usize> {
        if index >= self.entries.len() {
            return Err(AppError::QueuePosition(index));
        }
        if index + 1 == self.entries.len() {
            return Ok(index);
        }
        self.entries.swap(index, index + 1);
        Ok(index + 1)
    }

    pub fn retain(&mut self, keep: impl Fn(&MethodKey) -> bool) {
        self.entries.retain(|entry| keep(&entry.key));
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.entries.iter().any(|entry| &entry.key == key)
    }

    pub fn keys(&self) -> Vec<MethodKey> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn mark(&mut self, key: &MethodKey, status: StepStatus) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| &entry.key == key) {
            entry.status = status;
        }
    }

    pub fn reset_statuses(&mut self) {
        for entry in &mut self.entries {
            entry.status = StepStatus::Pending;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Sequencer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Completed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
        };
        f.write_str(label)
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the run, 1-based
    pub index: u32,
    pub key: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: f64,
    /// Why the step failed, when it did not get a status below 400
    pub error: Option<String>,
}

/// Aggregated run results
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSummary {
    /// Steps that were executed
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    /// Steps left unrun because the run was stopped
    pub skipped: u32,
    pub cancelled: bool,
    pub total_duration_ms: f64,
    pub steps: Vec<StepResult>,
}

/// Drives queued requests through the executor, one at a time
pub struct Sequencer {
    workspace: SharedWorkspace,
    executor: HttpExecutor,
    config: SharedConfig,
    cancel: Arc<AtomicBool>,
    state: Mutex<RunState>,
    last_summary: Mutex<Option<RunSummary>>,
}

impl Sequencer {
    pub fn new(workspace: SharedWorkspace, executor: HttpExecutor, config: SharedConfig) -> Self {
        Self {
            workspace,
            executor,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunState::Idle),
            last_summary: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), RunState::Running | RunState::Stopping)
    }

    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary.lock().clone()
    }

    /// Request cancellation. Returns false when no run is active.
    ///
    /// An in-flight request still completes; no further step starts.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if *state != RunState::Running {
            return false;
        }
        *state = RunState::Stopping;
        self.cancel.store(true, Ordering::SeqCst);
        tracing::info!("Automation stop requested");
        true
    }

    /// Run the queue once, in its current order.
    ///
    /// Pacing is read from the configuration when the run starts.
    pub async fn run(&self) -> AppResult<RunSummary> {
        let keys = {
            let mut ws = self.workspace.write();
            if !ws.has_collection() {
                return Err(AppError::NoCollection);
            }
            if ws.queue().is_empty() {
                return Err(AppError::EmptyQueue);
            }

            let mut state = self.state.lock();
            if matches!(*state, RunState::Running | RunState::Stopping) {
                return Err(AppError::AutomationRunning);
            }
            *state = RunState::Running;
            self.cancel.store(false, Ordering::SeqCst);
            *self.last_summary.lock() = None;

            ws.queue_mut().reset_statuses();
            ws.transcript().info("Starting automation...");
            ws.queue().keys()
        };

        tracing::info!(steps = keys.len(), "Starting automation");
        let pacing = self.config.get().automation;
        let summary = self.drive(keys.into(), &pacing).await;

        let final_state = if summary.cancelled {
            RunState::Idle
        } else {
            RunState::Completed
        };
        *self.state.lock() = final_state;
        *self.last_summary.lock() = Some(summary.clone());

        {
            let ws = self.workspace.read();
            if summary.cancelled {
                ws.transcript().warn("Automation stopped by user");
            } else {
                ws.transcript().info(format!(
                    "Automation completed: {} total, {} successful, {} failed",
                    summary.total, summary.successful, summary.failed
                ));
            }
        }

        tracing::info!(
            total = %summary.total,
            successful = %summary.successful,
            failed = %summary.failed,
            cancelled = %summary.cancelled,
            "Automation finished"
        );

        Ok(summary)
    }

    async fn drive(&self, mut queue: VecDeque<MethodKey>, pacing: &AutomationConfig) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        pause(pacing.start_delay_ms).await;

        let mut index = 0;
        while let Some(key) = queue.pop_front() {
            if self.cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                summary.skipped = queue.len() as u32 + 1;
                break;
            }
            index += 1;

            let (result, delay_ms) = self.step(index, &key, pacing).await;
            if result.success {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            summary.total += 1;
            summary.steps.push(result);

            if !queue.is_empty() {
                pause(delay_ms).await;
            }
        }

        summary.total_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        summary
    }

    /// Execute one key; returns the result and the delay before the next step
    async fn step(&self, index: u32, key: &MethodKey, pacing: &AutomationConfig) -> (StepResult, u64) {
        let prepared = {
            let ws = self.workspace.read();
            ws.transcript().info(format!("Running: {}", key));
            ws.prepare_request(key)
        };

        let request = match prepared {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Automation step could not be prepared");
                let mut ws = self.workspace.write();
                ws.transcript().error(format!("{}: {}", key, e));
                ws.queue_mut().mark(key, StepStatus::Failure);
                let result = StepResult {
                    index,
                    key: key.to_string(),
                    success: false,
                    status_code: None,
                    latency_ms: 0.0,
                    error: Some(e.to_string()),
                };
                return (result, pacing.error_delay_ms);
            }
        };

        let exchange = self.executor.execute(&request).await;

        let success = exchange.is_success();
        {
            let mut ws = self.workspace.write();
            ws.absorb_exchange(&exchange);
            let status = if success {
                StepStatus::Success
            } else {
                StepStatus::Failure
            };
            ws.queue_mut().mark(key, status);
        }

        let result = StepResult {
            index,
            key: key.to_string(),
            success,
            status_code: exchange.outcome.status(),
            latency_ms: exchange.elapsed_ms,
            error: (!success).then(|| exchange.outcome.to_string()),
        };
        (result, pacing.step_delay_ms)
    }

    /// Send one method outside automation, with the same token handling
    pub async fn send(&self, key: &MethodKey) -> AppResult<Exchange> {
        let request = self.workspace.read().prepare_request(key)?;
        let exchange = self.executor.execute(&request).await;
        self.workspace.write().absorb_exchange(&exchange);
        Ok(exchange)
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Shared sequencer
pub type SharedSequencer = Arc<Sequencer>;

pub fn create_shared_sequencer(
    workspace: SharedWorkspace,
    executor: HttpExecutor,
    config: SharedConfig,
) -> SharedSequencer {
    Arc::new(Sequencer::new(workspace, executor, config))
}
