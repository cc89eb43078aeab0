//! # Batch Fan-Out Pool
//!
//! Distributes per-file check jobs across a pool of worker threads while
//! streaming results back in completion order and honouring cooperative
//! cancellation. One pool is created per batch request and discarded when
//! the batch completes or is cancelled.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::ProtocolError;

/// One unit of batch work: a job token (filename) plus the call arguments,
/// `args[0]` being the source text to check.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub filename: String,
    pub args: Vec<Value>,
}

/// Per-file check function shared by the pool workers.
pub type CheckFn = Arc<dyn Fn(&str, &[Value]) -> Value + Send + Sync>;

/// Streams one `(filename, result)` pair back to the controller.
pub type SendResult<'a> = &'a (dyn Fn(&str, &Value) -> Result<(), ProtocolError> + 'a);

/// Polled between work units to detect a cancellation request.
pub type Cancelled<'a> = &'a (dyn Fn() -> bool + 'a);

enum Task {
    Job(BatchJob),
    Stop,
}

/// Pool size: an explicit nonzero cap wins, otherwise CPU count minus one
/// (clamped to at least 1) to leave the dispatch thread some headroom.
pub fn pool_size(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        num_cpus::get().saturating_sub(1).max(1)
    }
}

/// Run `jobs` through a pool of `pool_size(max_workers)` threads.
///
/// Results are forwarded through `send` as they complete, in completion
/// order; callers correlate by filename. The task queue is primed with
/// `pipeline_depth` jobs per worker and refilled one job per delivered
/// result, so workers are never starved while results drain. On a result
/// timeout the `cancelled` predicate is polled; once it reports true no
/// further results are awaited and in-flight jobs are abandoned. Exactly one
/// `Stop` sentinel per worker is enqueued before returning, so every pool
/// thread terminates after draining the queue; the pool is not joined.
pub fn run_batch(
    jobs: Vec<BatchJob>,
    check: CheckFn,
    send: SendResult,
    cancelled: Cancelled,
    max_workers: usize,
    pipeline_depth: usize,
    poll_timeout: Duration,
) -> Result<(), ProtocolError> {
    run_batch_on(
        jobs,
        check,
        send,
        cancelled,
        pool_size(max_workers),
        pipeline_depth,
        poll_timeout,
        unbounded(),
        unbounded(),
    )
}

#[allow(clippy::too_many_arguments)]
fn run_batch_on(
    jobs: Vec<BatchJob>,
    check: CheckFn,
    send: SendResult,
    cancelled: Cancelled,
    workers: usize,
    pipeline_depth: usize,
    poll_timeout: Duration,
    tasks: (Sender<Task>, Receiver<Task>),
    results: (Sender<(String, Value)>, Receiver<(String, Value)>),
) -> Result<(), ProtocolError> {
    let (task_tx, task_rx) = tasks;
    let (result_tx, result_rx) = results;
    let expected = jobs.len();

    let mut pending = jobs.into_iter();
    let prime = pipeline_depth.max(1).saturating_mul(workers);
    for job in pending.by_ref().take(prime) {
        let _ = task_tx.send(Task::Job(job));
    }

    // The pool holds the only result senders once ours is consumed, so a
    // dead pool surfaces as a disconnect instead of an endless timeout loop.
    let _handles = spawn_pool(workers, task_rx, result_tx, check);

    let mut delivered = 0usize;
    let mut outcome = Ok(());
    'drain: for _ in 0..expected {
        loop {
            match result_rx.recv_timeout(poll_timeout) {
                Ok((filename, result)) => {
                    if let Err(err) = send(&filename, &result) {
                        outcome = Err(err);
                        break 'drain;
                    }
                    delivered += 1;
                    if let Some(next) = pending.next() {
                        let _ = task_tx.send(Task::Job(next));
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancelled() {
                        debug!("batch cancelled after {delivered}/{expected} results");
                        break 'drain;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("batch pool exited after {delivered}/{expected} results");
                    break 'drain;
                }
            }
        }
    }

    for _ in 0..workers {
        let _ = task_tx.send(Task::Stop);
    }
    outcome
}

/// Spawn the pool threads. Each loops on the task queue until its `Stop`
/// sentinel (or a closed channel), running the check on each job and pushing
/// `(filename, result)` onto the result queue.
fn spawn_pool(
    workers: usize,
    task_rx: Receiver<Task>,
    result_tx: Sender<(String, Value)>,
    check: CheckFn,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();
    for _ in 0..workers {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let check = Arc::clone(&check);
        handles.push(thread::spawn(move || {
            while let Ok(Task::Job(job)) = task_rx.recv() {
                let result = check(&job.filename, &job.args);
                if result_tx.send((job.filename, result)).is_err() {
                    break;
                }
            }
        }));
    }
    handles
}
