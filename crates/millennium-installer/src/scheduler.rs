//! Sequential task execution on a background thread.
//!
//! A [`Scheduler`] runs its tasks in insertion order and stops at the first
//! failure, or early when a task returns [`TaskResult::finish`]. The thread
//! that started it polls a [`Snapshot`] of the shared [`SchedulerState`]
//! instead of waiting for callbacks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::error::{InstallError, Result};
use crate::progress::ProgressCell;

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// Whether the task succeeded.
    pub success: bool,
    /// Failure reason, or an optional note on success.
    pub message: String,
    /// Skip the remaining tasks and finish the chain successfully.
    pub stop: bool,
}

impl TaskResult {
    /// A successful result without a message.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
            stop: false,
        }
    }

    /// A successful result that ends the chain without running later tasks.
    #[must_use]
    pub fn finish(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            stop: true,
        }
    }

    /// A failed result carrying `message` verbatim.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stop: false,
        }
    }
}

impl From<Result<()>> for TaskResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Status {
    finished: bool,
    failed: bool,
    failure_reason: Option<String>,
    step: usize,
    step_count: usize,
    label: String,
}

/// State shared between the worker (writer) and the poller (reader).
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    progress: ProgressCell,
    detail: ProgressCell,
    status: Arc<Mutex<Status>>,
}

impl SchedulerState {
    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let status = self.lock();
        Snapshot {
            progress: self.progress.get(),
            detail: self.detail.get(),
            finished: status.finished,
            failed: status.failed,
            failure_reason: status.failure_reason.clone(),
            step: status.step,
            step_count: status.step_count,
            status: status.label.clone(),
        }
    }

    fn fail(&self, reason: String) {
        let mut status = self.lock();
        status.failed = true;
        status.failure_reason = Some(reason);
    }
}

/// A point-in-time copy of [`SchedulerState`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Progress of the running step in `[0, 1]`.
    pub progress: f64,
    /// Secondary progress, e.g. of the archive entry being written.
    pub detail: f64,
    /// The chain completed without failure, possibly ending early.
    pub finished: bool,
    /// A step failed and the chain stopped.
    pub failed: bool,
    /// Reason of the failure. Always set when `failed` is.
    pub failure_reason: Option<String>,
    /// One-based index of the running step; 0 before the first step.
    pub step: usize,
    /// Number of steps in the chain.
    pub step_count: usize,
    /// Status line of the running step.
    pub status: String,
}

impl Snapshot {
    /// Returns true once the run reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.finished || self.failed
    }
}

/// Handle passed to a running task.
#[derive(Debug)]
pub struct TaskContext {
    state: SchedulerState,
}

impl TaskContext {
    /// The main progress cell.
    #[must_use]
    pub fn progress(&self) -> &ProgressCell {
        &self.state.progress
    }

    /// The secondary progress cell.
    #[must_use]
    pub fn detail(&self) -> &ProgressCell {
        &self.state.detail
    }

    /// Replaces the status line shown to the poller.
    pub fn set_status(&self, label: impl Into<String>) {
        self.state.lock().label = label.into();
    }
}

type TaskFn = Box<dyn FnOnce(&TaskContext) -> TaskResult + Send + 'static>;

struct Task {
    label: String,
    run: TaskFn,
}

/// An ordered chain of tasks that stops at the first failure.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
    state: SchedulerState,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.tasks.iter().map(|t| t.label.as_str()).collect();
        f.debug_struct("Scheduler")
            .field("tasks", &labels)
            .field("state", &self.state)
            .finish()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task. `label` becomes the status line while it runs.
    pub fn add_task<F>(&mut self, label: impl Into<String>, task: F) -> &mut Self
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        self.tasks.push(Task {
            label: label.into(),
            run: Box::new(task),
        });
        self
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Another handle to the state this scheduler writes.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state.clone()
    }

    /// Runs every task on the calling thread and returns the final snapshot.
    pub fn run(self) -> Snapshot {
        let Self { tasks, state } = self;
        let count = tasks.len();
        state.lock().step_count = count;

        let context = TaskContext {
            state: state.clone(),
        };

        for (index, task) in tasks.into_iter().enumerate() {
            {
                let mut status = state.lock();
                status.step = index + 1;
                status.label.clone_from(&task.label);
            }
            info!("[{}/{}] {}", index + 1, count, task.label);

            let run = task.run;
            let result = panic::catch_unwind(AssertUnwindSafe(|| run(&context)))
                .unwrap_or_else(|payload| TaskResult::failed(panic_message(payload.as_ref())));

            if !result.success {
                let reason = if result.message.is_empty() {
                    format!("{} failed", task.label.trim_end_matches("..."))
                } else {
                    result.message
                };
                error!("Step {} of {} failed: {}", index + 1, count, reason);
                state.fail(reason);
                return state.snapshot();
            }
            if !result.message.is_empty() {
                debug!("{}", result.message);
            }
            if result.stop {
                info!("Finished early after step {} of {}", index + 1, count);
                state.lock().finished = true;
                return state.snapshot();
            }
        }

        state.lock().finished = true;
        info!("All {} steps completed", count);
        state.snapshot()
    }

    /// Moves the scheduler onto a named background thread.
    pub fn spawn(self) -> Result<SchedulerHandle> {
        let state = self.state();
        let join = thread::Builder::new()
            .name("millennium-pipeline".to_string())
            .spawn(move || {
                self.run();
            })
            .map_err(|e| InstallError::Process(format!("failed to start worker thread: {e}")))?;

        Ok(SchedulerHandle {
            state,
            join: Some(join),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("internal error: {detail}")
}

/// A running (or finished) scheduler thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    state: SchedulerState,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Polls the shared state without blocking.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// Returns true once the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Blocks until the worker exits and returns the final snapshot.
    pub fn wait(&mut self) -> Snapshot {
        self.join_worker();
        self.state.snapshot()
    }

    fn join_worker(&mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            self.state
                .fail("worker thread terminated unexpectedly".to_string());
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.join_worker();
    }
}
