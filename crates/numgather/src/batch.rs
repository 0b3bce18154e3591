use crate::{Aggregate, DispatchConfig, aggregate, deadline, dispatch};
use core::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a front end needs to run one batch.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    /// Targets to fetch. Order and repetition do not affect the output.
    pub targets: Vec<String>,
    /// Global deadline for the whole batch.
    pub response_timeout: Duration,
    pub config: DispatchConfig,
}

/// Runs a batch to completion under its global deadline.
///
/// The deadline is derived from `parent`, so cancelling `parent` (a client
/// disconnect or a server shutdown) ends the batch early as well. Whatever
/// completed in time is returned; there is no error path.
#[tracing::instrument(skip_all, fields(targets = request.targets.len()))]
pub async fn run_batch(parent: &CancellationToken, request: BatchRequest) -> Aggregate {
    let start = std::time::Instant::now();
    let deadline = deadline(parent, request.response_timeout);

    let stream = dispatch(deadline.token().clone(), request.config, request.targets);
    let aggregate = aggregate(stream).await;

    tracing::info!(
        items = aggregate.items,
        absent = aggregate.absent,
        numbers = aggregate.numbers.len(),
        deadline_hit = deadline.is_expired(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch complete"
    );

    aggregate
}
