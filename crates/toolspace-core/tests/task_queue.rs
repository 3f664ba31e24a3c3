// toolspace-core/tests/task_queue.rs
// ============================================================================
// Module: Task Queue Tests
// Description: Task state machine, waiting, cancellation, and retry.
// ============================================================================
//! ## Overview
//! Runs real tools on the tokio runtime and checks the forward-only status
//! transitions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Notify;
use toolspace_core::AsyncTaskQueue;
use toolspace_core::RoleName;
use toolspace_core::SystemClock;
use toolspace_core::TaskExecution;
use toolspace_core::TaskQueueConfig;
use toolspace_core::TaskStatus;
use toolspace_core::TaskSubmission;
use toolspace_core::Token;
use toolspace_core::Tool;
use toolspace_core::ToolContext;
use toolspace_core::ToolExecutionError;
use toolspace_core::ToolName;
use toolspace_core::ToolResult;
use toolspace_core::runtime::TaskQueueError;

struct SleepTool {
    millis: u64,
}

#[async_trait]
impl Tool for SleepTool {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(ToolResult::json(args))
    }
}

/// Signals when it starts and runs until released.
struct GateTool {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Tool for GateTool {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(ToolResult::json(args))
    }
}

struct FailTool;

#[async_trait]
impl Tool for FailTool {
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        Err(ToolExecutionError::Failed("disk on fire".to_string()))
    }
}

fn queue(max_tasks: usize) -> AsyncTaskQueue {
    AsyncTaskQueue::new(Token::new("tok_a"), TaskQueueConfig { max_tasks }, Arc::new(SystemClock))
}

fn execution(tool: Arc<dyn Tool>) -> TaskExecution {
    TaskExecution {
        handler: tool,
        context: ToolContext::direct(Token::new("tok_a"), RoleName::new("user")),
        timeout: None,
    }
}

fn submission(tool: &str) -> TaskSubmission {
    TaskSubmission {
        tool: ToolName::new(tool),
        args: json!({"n": 1}),
        request_id: Some("req-1".to_string()),
        metadata: None,
    }
}

/// Verifies a zero-timeout wait on a slow task times out without touching it.
#[tokio::test]
async fn zero_wait_times_out_without_side_effects() {
    let queue = queue(10);
    let task = queue.submit(submission("sleep"), execution(Arc::new(SleepTool { millis: 100 }))).unwrap();

    let err = queue.wait(&task.id, Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, TaskQueueError::Timeout { timeout_ms: 0, .. }));
    assert!(!queue.get_task(&task.id).unwrap().status.is_terminal());

    let done = queue.wait(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(ToolResult::json(json!({"n": 1}))));
    assert!(done.execution_time_ms.is_some());
}

/// Verifies cancellation discards the in-flight outcome.
#[tokio::test]
async fn cancelled_tasks_stay_cancelled() {
    let queue = queue(10);
    let task = queue.submit(submission("sleep"), execution(Arc::new(SleepTool { millis: 50 }))).unwrap();
    let cancelled = queue.cancel(&task.id).unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(120)).await;
    let after = queue.get_task(&task.id).unwrap();
    assert_eq!(after.status, TaskStatus::Cancelled);
    assert!(after.result.is_none());
    assert!(matches!(queue.cancel(&task.id), Err(TaskQueueError::InvalidTransition { .. })));
}

/// Verifies cancelling a running task discards the result the tool returns
/// afterwards.
#[tokio::test]
async fn running_task_cancel_discards_late_result() {
    let queue = queue(10);
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gate = GateTool {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    };
    let task = queue.submit(submission("gate"), execution(Arc::new(gate))).unwrap();
    tokio::time::timeout(Duration::from_secs(5), started.notified()).await.unwrap();
    assert_eq!(queue.get_task(&task.id).unwrap().status, TaskStatus::Running);

    let cancelled = queue.cancel(&task.id).unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    release.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = queue.get_task(&task.id).unwrap();
    assert_eq!(after.status, TaskStatus::Cancelled);
    assert!(after.result.is_none());
    assert!(after.execution_time_ms.is_none());
    assert_eq!(queue.wait(&task.id, Duration::ZERO).await.unwrap().status, TaskStatus::Cancelled);
}

/// Verifies tool errors become failed tasks and retry copies the original
/// call verbatim.
#[tokio::test]
async fn failed_tasks_can_be_retried() {
    let queue = queue(10);
    let task = queue.submit(submission("fail"), execution(Arc::new(FailTool))).unwrap();
    let failed = queue.wait(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    let message = failed.result.as_ref().and_then(ToolResult::first_text).unwrap();
    assert!(message.contains("disk on fire"));

    let retried = queue.retry(&task.id, execution(Arc::new(SleepTool { millis: 1 }))).unwrap();
    assert_ne!(retried.id, task.id);
    assert_eq!(retried.retry_of, Some(task.id.clone()));
    assert_eq!(retried.original_call, failed.original_call);
    let done = queue.wait(&retried.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(matches!(
        queue.retry(&retried.id, execution(Arc::new(FailTool))),
        Err(TaskQueueError::NotRetryable(_))
    ));
}

/// Verifies live tasks cannot be deleted and capacity is enforced.
#[tokio::test]
async fn delete_and_capacity_rules() {
    let queue = queue(1);
    let task = queue.submit(submission("sleep"), execution(Arc::new(SleepTool { millis: 30 }))).unwrap();
    assert!(matches!(queue.delete(&task.id), Err(TaskQueueError::Active(_))));
    assert!(matches!(
        queue.submit(submission("sleep"), execution(Arc::new(SleepTool { millis: 1 }))),
        Err(TaskQueueError::Capacity(1))
    ));

    queue.wait(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(queue.delete(&task.id).unwrap().id, task.id);
    assert!(matches!(queue.get_task(&task.id), Err(TaskQueueError::NotFound(_))));
}

/// Verifies per-tool timeouts fail the task.
#[tokio::test]
async fn execution_timeout_fails_task() {
    let queue = queue(10);
    let mut run = execution(Arc::new(SleepTool { millis: 500 }));
    run.timeout = Some(Duration::from_millis(10));
    let task = queue.submit(submission("sleep"), run).unwrap();
    let done = queue.wait(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(queue.get_stats().unwrap().failed, 1);
    assert_eq!(queue.get_user_tasks(Some(TaskStatus::Failed)).unwrap().len(), 1);
}
