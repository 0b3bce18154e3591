//! Lazily spawned tasks gated by a semaphore.
//!
//! Instead of a long-lived pool, one task is spawned per target once a permit
//! is available. Permits are capped at the configured worker count, so no
//! more than that many attempts run at once and no task exists for a target
//! that has not been reached yet.

use super::{Context, ItemResult};
use crate::config::Resolved;
use std::sync::Arc;
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

/// Spawns one task per target, at most `num_workers` at a time, and returns
/// once every spawned task has finished.
///
/// Permits are capped at the number of targets, so an oversized worker count
/// never exceeds [`Semaphore::MAX_PERMITS`].
///
/// # Arguments
///
/// * `token` - Batch token. Once cancelled, no further task is spawned and
///   in-flight fetches return early.
/// * `config` - Resolved dispatch configuration. `num_workers` bounds the
///   concurrent tasks, `item_timeout` bounds each attempt.
/// * `targets` - Targets in dispatch order. Must not be empty.
/// * `out` - Sender half of the item stream. It is dropped only after every
///   task has been joined, which closes the stream.
pub(super) async fn run(
    token: CancellationToken,
    config: Resolved,
    targets: Vec<String>,
    out: mpsc::Sender<ItemResult>,
) {
    let permits = config.num_workers.min(targets.len());
    let limiter = Arc::new(Semaphore::new(permits));
    let ctx = Context { token, config, out };
    let mut tasks = JoinSet::new();
    let total = targets.len();

    for (sent, target) in targets.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            () = ctx.token.cancelled() => None,
            permit = Arc::clone(&limiter).acquire_owned() => permit.ok(),
        };

        let Some(permit) = permit else {
            tracing::debug!(
                dropped = total - sent,
                "Batch cancelled, remaining targets not dispatched"
            );
            break;
        };

        if ctx.out.is_closed() {
            tracing::debug!("Item stream dropped by consumer, stopping producer");
            break;
        }

        let ctx = ctx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            ctx.process(target).await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Item task terminated abnormally");
        }
    }

    // All tasks are joined; dropping the last sender closes the stream.
    drop(ctx);
}
