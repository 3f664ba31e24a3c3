// toolspace-core/src/runtime/task_queue.rs
// ============================================================================
// Module: Async Task Queue
// Description: Per-user-space queue of tool invocations and their status.
// Purpose: Track submitted work through a forward-only state machine.
// Dependencies: crate::{core, interfaces}, tokio, serde, thiserror
// ============================================================================

//! ## Overview
//! Each user-space owns one queue. Submitting snapshots the original call,
//! records a `pending` task, and spawns execution on the tokio runtime.
//! Waiters suspend on a shared [`Notify`] and give up locally on timeout.
//!
//! ## Invariants
//! - Status moves `pending -> running -> {completed, failed}` or
//!   `pending|running -> cancelled`; terminal states never change.
//! - `original_call` is never mutated after submission, including by retry.
//! - Cancellation is non-preemptive: an in-flight tool finishes, but its
//!   outcome is discarded.
//! - A wait timeout never changes task state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::pin::pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;

use crate::core::errors::AccessError;
use crate::core::hashing::token_fingerprint;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::Token;
use crate::core::identifiers::ToolName;
use crate::core::result::ToolResult;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::Tool;
use crate::interfaces::ToolContext;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, not yet started.
    Pending,
    /// Tool is executing.
    Running,
    /// Tool returned a non-error result.
    Completed,
    /// Tool failed or returned an error result.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskStatus {
    /// Returns true for `completed`, `failed`, and `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true when moving to `next` is a legal forward transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Immutable snapshot of a submitted call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginalCall {
    /// Submitting token (omitted from serialized output).
    #[serde(skip)]
    pub token: Token,
    /// Submitting token fingerprint.
    pub token_fingerprint: String,
    /// Requested tool.
    pub tool: ToolName,
    /// Requested arguments.
    pub args: Value,
    /// Submission time.
    pub submitted_at: Timestamp,
    /// Caller-supplied request identifier.
    pub request_id: Option<String>,
    /// Caller-supplied metadata.
    pub metadata: Value,
}

/// Tracked tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncTask {
    /// Task identifier.
    pub id: TaskId,
    /// Owning token (omitted from serialized output).
    #[serde(skip)]
    pub token: Token,
    /// Tool being executed.
    pub tool_name: ToolName,
    /// Arguments passed to the tool.
    pub args: Value,
    /// Current status.
    pub status: TaskStatus,
    /// Submission snapshot.
    pub original_call: OriginalCall,
    /// Tool result for `completed` and `failed` tasks.
    pub result: Option<ToolResult>,
    /// Execution time in milliseconds once finished.
    pub execution_time_ms: Option<u64>,
    /// Task this one retries.
    pub retry_of: Option<TaskId>,
    /// Submission time.
    pub created_at: Timestamp,
    /// Start time.
    pub started_at: Option<Timestamp>,
    /// Terminal transition time.
    pub finished_at: Option<Timestamp>,
}

/// Inputs for submitting a task.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    /// Tool to execute.
    pub tool: ToolName,
    /// Tool arguments.
    pub args: Value,
    /// Caller-supplied request identifier.
    pub request_id: Option<String>,
    /// Caller-supplied metadata.
    pub metadata: Option<Value>,
}

/// Resolved tool and context used to run a task.
#[derive(Clone)]
pub struct TaskExecution {
    /// Tool implementation.
    pub handler: Arc<dyn Tool>,
    /// Context passed to the tool.
    pub context: ToolContext,
    /// Execution time bound.
    pub timeout: Option<Duration>,
}

/// Queue limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueConfig {
    /// Maximum tasks retained per queue.
    pub max_tasks: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_tasks: 1_000,
        }
    }
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// All retained tasks.
    pub total: usize,
    /// Pending tasks.
    pub pending: usize,
    /// Running tasks.
    pub running: usize,
    /// Completed tasks.
    pub completed: usize,
    /// Failed tasks.
    pub failed: usize,
    /// Cancelled tasks.
    pub cancelled: usize,
}

impl TaskStats {
    /// Adds another queue's counts to these.
    pub const fn absorb(&mut self, other: &Self) {
        self.total += other.total;
        self.pending += other.pending;
        self.running += other.running;
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Task queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskQueueError {
    /// Task absent from this queue.
    #[error("task not found: {0}")]
    NotFound(String),
    /// Waiter timed out.
    #[error("task {task} did not finish within {timeout_ms}ms")]
    Timeout {
        /// Task identifier.
        task: String,
        /// Wait timeout in milliseconds.
        timeout_ms: u64,
    },
    /// Requested status change is not a forward transition.
    #[error("task {task} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task identifier.
        task: String,
        /// Current status label.
        from: &'static str,
        /// Requested status label.
        to: &'static str,
    },
    /// Task is still pending or running.
    #[error("task {0} is still active")]
    Active(String),
    /// Only failed or cancelled tasks can be retried.
    #[error("task {0} is not retryable")]
    NotRetryable(String),
    /// Queue is full.
    #[error("task queue holds at most {0} tasks")]
    Capacity(usize),
    /// Queue lock failure.
    #[error("task queue error: {0}")]
    Internal(String),
}

impl From<TaskQueueError> for AccessError {
    fn from(error: TaskQueueError) -> Self {
        match error {
            TaskQueueError::NotFound(id) => Self::not_found("task", id),
            TaskQueueError::Timeout {
                task,
                timeout_ms,
            } => Self::Timeout {
                task,
                timeout_ms,
            },
            error @ (TaskQueueError::InvalidTransition {
                ..
            }
            | TaskQueueError::Active(_)
            | TaskQueueError::NotRetryable(_)) => Self::Conflict(error.to_string()),
            TaskQueueError::Capacity(limit) => {
                Self::LimitExceeded(format!("task queue holds at most {limit} tasks"))
            }
            TaskQueueError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Shared state between the queue handle and spawned executions.
struct QueueInner {
    /// Tasks in submission order.
    tasks: Mutex<Vec<AsyncTask>>,
    /// Wakes waiters on any terminal transition.
    notify: Notify,
    /// Time source.
    clock: Arc<dyn Clock>,
}

/// Async task queue owned by one user-space.
#[derive(Clone)]
pub struct AsyncTaskQueue {
    /// Owning token.
    token: Token,
    /// Shared state.
    inner: Arc<QueueInner>,
    /// Limits.
    config: TaskQueueConfig,
}

impl AsyncTaskQueue {
    /// Creates an empty queue for `token`.
    #[must_use]
    pub fn new(token: Token, config: TaskQueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            token,
            inner: Arc::new(QueueInner {
                tasks: Mutex::new(Vec::new()),
                notify: Notify::new(),
                clock,
            }),
            config,
        }
    }

    /// Submits a task and starts executing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Capacity`] when the queue is full.
    pub fn submit(
        &self,
        submission: TaskSubmission,
        execution: TaskExecution,
    ) -> Result<AsyncTask, TaskQueueError> {
        let original_call = OriginalCall {
            token: self.token.clone(),
            token_fingerprint: token_fingerprint(&self.token),
            tool: submission.tool,
            args: submission.args,
            submitted_at: self.inner.clock.now(),
            request_id: submission.request_id,
            metadata: submission.metadata.unwrap_or_else(|| Value::Object(Map::new())),
        };
        self.enqueue(original_call, None, execution)
    }

    /// Re-submits a failed or cancelled task with its original call.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::NotRetryable`] unless the source task failed
    /// or was cancelled.
    pub fn retry(
        &self,
        task_id: &TaskId,
        execution: TaskExecution,
    ) -> Result<AsyncTask, TaskQueueError> {
        let source = self.get_task(task_id)?;
        if !matches!(source.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return Err(TaskQueueError::NotRetryable(task_id.to_string()));
        }
        self.enqueue(source.original_call, Some(source.id), execution)
    }

    /// Waits until the task is terminal or `timeout` elapses. A zero timeout
    /// checks once without suspending.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Timeout`] when the task is still active at
    /// the deadline; the task itself is untouched.
    pub async fn wait(&self, task_id: &TaskId, timeout: Duration) -> Result<AsyncTask, TaskQueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            let task = self.get_task(task_id)?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            let timed_out = Err(TaskQueueError::Timeout {
                task: task_id.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
            if timeout.is_zero() {
                return timed_out;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return timed_out;
            }
        }
    }

    /// Cancels a pending or running task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::InvalidTransition`] for terminal tasks.
    pub fn cancel(&self, task_id: &TaskId) -> Result<AsyncTask, TaskQueueError> {
        let now = self.inner.clock.now();
        let task = self.inner.transition(task_id, TaskStatus::Cancelled, |task| {
            task.finished_at = Some(now);
        })?;
        self.inner.notify.notify_waiters();
        Ok(task)
    }

    /// Cancels every active task. Returns the number cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Internal`] when the queue lock is poisoned.
    pub fn cancel_active(&self) -> Result<usize, TaskQueueError> {
        let now = self.inner.clock.now();
        let mut tasks = self.inner.lock()?;
        let mut count = 0;
        for task in tasks.iter_mut().filter(|task| !task.status.is_terminal()) {
            task.status = TaskStatus::Cancelled;
            task.finished_at = Some(now);
            count += 1;
        }
        drop(tasks);
        self.inner.notify.notify_waiters();
        Ok(count)
    }

    /// Deletes a terminal task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Active`] for pending or running tasks.
    pub fn delete(&self, task_id: &TaskId) -> Result<AsyncTask, TaskQueueError> {
        let mut tasks = self.inner.lock()?;
        let index = tasks
            .iter()
            .position(|task| &task.id == task_id)
            .ok_or_else(|| TaskQueueError::NotFound(task_id.to_string()))?;
        if !tasks[index].status.is_terminal() {
            return Err(TaskQueueError::Active(task_id.to_string()));
        }
        Ok(tasks.remove(index))
    }

    /// Returns a snapshot of one task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::NotFound`] when the task is absent.
    pub fn get_task(&self, task_id: &TaskId) -> Result<AsyncTask, TaskQueueError> {
        self.inner
            .lock()?
            .iter()
            .find(|task| &task.id == task_id)
            .cloned()
            .ok_or_else(|| TaskQueueError::NotFound(task_id.to_string()))
    }

    /// Returns the original call snapshot of one task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::NotFound`] when the task is absent.
    pub fn get_original_call(&self, task_id: &TaskId) -> Result<OriginalCall, TaskQueueError> {
        self.get_task(task_id).map(|task| task.original_call)
    }

    /// Returns tasks in submission order, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Internal`] when the queue lock is poisoned.
    pub fn get_user_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<AsyncTask>, TaskQueueError> {
        Ok(self
            .inner
            .lock()?
            .iter()
            .filter(|task| status.is_none_or(|status| task.status == status))
            .cloned()
            .collect())
    }

    /// Returns task counts by status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Internal`] when the queue lock is poisoned.
    pub fn get_stats(&self) -> Result<TaskStats, TaskQueueError> {
        let tasks = self.inner.lock()?;
        let mut stats = TaskStats {
            total: tasks.len(),
            ..TaskStats::default()
        };
        for task in tasks.iter() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        drop(tasks);
        Ok(stats)
    }

    /// Records a pending task and spawns its execution.
    fn enqueue(
        &self,
        original_call: OriginalCall,
        retry_of: Option<TaskId>,
        execution: TaskExecution,
    ) -> Result<AsyncTask, TaskQueueError> {
        let task = AsyncTask {
            id: TaskId::generate(),
            token: self.token.clone(),
            tool_name: original_call.tool.clone(),
            args: original_call.args.clone(),
            status: TaskStatus::Pending,
            original_call,
            result: None,
            execution_time_ms: None,
            retry_of,
            created_at: self.inner.clock.now(),
            started_at: None,
            finished_at: None,
        };
        let mut tasks = self.inner.lock()?;
        if tasks.len() >= self.config.max_tasks {
            return Err(TaskQueueError::Capacity(self.config.max_tasks));
        }
        tasks.push(task.clone());
        drop(tasks);
        tokio::spawn(run_task(
            Arc::clone(&self.inner),
            task.id.clone(),
            task.tool_name.clone(),
            task.args.clone(),
            execution,
        ));
        Ok(task)
    }
}

impl QueueInner {
    /// Applies a forward transition and returns the updated snapshot.
    fn transition(
        &self,
        task_id: &TaskId,
        next: TaskStatus,
        apply: impl FnOnce(&mut AsyncTask),
    ) -> Result<AsyncTask, TaskQueueError> {
        let mut tasks = self.lock()?;
        let task = tasks
            .iter_mut()
            .find(|task| &task.id == task_id)
            .ok_or_else(|| TaskQueueError::NotFound(task_id.to_string()))?;
        if !task.status.can_transition_to(next) {
            return Err(TaskQueueError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status.as_str(),
                to: next.as_str(),
            });
        }
        task.status = next;
        apply(task);
        Ok(task.clone())
    }

    /// Locks the task list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AsyncTask>>, TaskQueueError> {
        self.tasks.lock().map_err(|_| TaskQueueError::Internal("task queue mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes one task and records its outcome unless it was cancelled.
async fn run_task(
    inner: Arc<QueueInner>,
    task_id: TaskId,
    tool: ToolName,
    args: Value,
    execution: TaskExecution,
) {
    let started_at = inner.clock.now();
    let started = inner.transition(&task_id, TaskStatus::Running, |task| {
        task.started_at = Some(started_at);
    });
    if started.is_err() {
        return;
    }
    let clock_start = std::time::Instant::now();
    let call = execution.handler.execute(args, &execution.context);
    let outcome = match execution.timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(crate::interfaces::ToolExecutionError::Failed(format!(
                "timed out after {}ms",
                limit.as_millis()
            )))
        }),
        None => call.await,
    };
    let elapsed_ms = u64::try_from(clock_start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (status, result) = match outcome {
        Ok(result) if result.is_error() => (TaskStatus::Failed, result),
        Ok(result) => (TaskStatus::Completed, result),
        Err(error) => (
            TaskStatus::Failed,
            AccessError::ExecutionFailed {
                tool: tool.to_string(),
                message: error.to_string(),
            }
            .to_tool_result(),
        ),
    };
    let finished_at = inner.clock.now();
    // A cancelled task rejects this transition and the outcome is dropped.
    let _ = inner.transition(&task_id, status, |task| {
        task.result = Some(result);
        task.execution_time_ms = Some(elapsed_ms);
        task.finished_at = Some(finished_at);
    });
    inner.notify.notify_waiters();
}
