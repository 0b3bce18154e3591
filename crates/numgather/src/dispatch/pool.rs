//! Fixed worker pool over a shared work queue.
//!
//! One producer pushes targets into a queue of capacity one; a fixed set of
//! workers pulls from it until the queue closes or the batch token is
//! cancelled. The queue receiver sits behind a mutex so that each target is
//! delivered to exactly one worker.
//!
//! The supervisor (the task running [`run`]) holds a sender for the output
//! stream until every worker has been joined, so the stream can only close
//! after the last result has been sent.

use super::{Context, ItemResult};
use crate::config::Resolved;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

type WorkQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// Runs a batch on a pool of `min(num_workers, targets.len())` workers and
/// returns once every worker has exited.
///
/// # Arguments
///
/// * `token` - Batch token. Cancelling it stops the producer and lets every
///   idle worker exit; in-flight fetches return early.
/// * `config` - Resolved dispatch configuration shared by all workers.
/// * `targets` - Targets in dispatch order. Must not be empty.
/// * `out` - Sender half of the item stream. Each worker holds a clone, and
///   the last one is dropped after all workers are joined, which closes the
///   stream.
pub(super) async fn run(
    token: CancellationToken,
    config: Resolved,
    targets: Vec<String>,
    out: mpsc::Sender<ItemResult>,
) {
    // Excess workers would only idle until the queue closes.
    let num_workers = config.num_workers.min(targets.len());
    let (work_tx, work_rx) = mpsc::channel::<String>(1);
    let queue: WorkQueue = Arc::new(Mutex::new(work_rx));

    let ctx = Context { token, config, out };

    let mut workers = Vec::with_capacity(num_workers);
    for worker_id in 0..num_workers {
        workers.push(tokio::spawn(worker_loop(
            worker_id,
            Arc::clone(&queue),
            ctx.clone(),
        )));
    }
    drop(queue);

    feed(&ctx.token, targets, work_tx).await;

    for (worker_id, joined) in futures::future::join_all(workers)
        .await
        .into_iter()
        .enumerate()
    {
        if let Err(e) = joined {
            tracing::error!(worker_id, error = %e, "Worker terminated abnormally");
        }
    }

    // Every worker has exited; dropping the last sender closes the stream.
    drop(ctx);
}

/// Pushes targets into the work queue until they run out or the batch is
/// cancelled. Dropping `work_tx` on return closes the queue.
async fn feed(token: &CancellationToken, targets: Vec<String>, work_tx: mpsc::Sender<String>) {
    let total = targets.len();

    for (sent, target) in targets.into_iter().enumerate() {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(
                    dropped = total - sent,
                    "Batch cancelled, remaining targets not dispatched"
                );
                return;
            }
            res = work_tx.send(target) => {
                if res.is_err() {
                    tracing::debug!("All workers exited, stopping producer");
                    return;
                }
            }
        }
    }
}

/// Pulls targets from the shared queue and processes them one at a time.
///
/// The queue lock is held only while waiting for the next target, never
/// during a fetch, so other workers can pull while this one is busy.
///
/// # Arguments
///
/// * `worker_id` - Index of the worker, used in trace events.
/// * `queue` - Shared receiver of the work queue.
/// * `ctx` - Batch context holding the token, the configuration and the
///   output sender.
///
/// # Exit conditions
///
/// - The queue is closed and drained (all targets dispatched).
/// - The batch token is cancelled before the next target is taken.
/// - The consumer has dropped the item stream.
async fn worker_loop(worker_id: usize, queue: WorkQueue, ctx: Context) {
    tracing::trace!("Worker {worker_id} started");

    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                () = ctx.token.cancelled() => None,
                target = rx.recv() => target,
            }
        };

        let Some(target) = next else {
            break;
        };

        if !ctx.process(target).await {
            break;
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
