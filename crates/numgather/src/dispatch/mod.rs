//! Bounded-concurrency fan-out of fetches and fan-in of their results.
//!
//! [`dispatch`] spawns the whole batch in the background and hands back an
//! [`ItemStream`]. Results arrive in completion order, one per attempted
//! target, and the stream closes once every task that could still send has
//! finished.
//!
//! ## Cancellation
//!
//! A single [`CancellationToken`] governs the batch (see [`deadline`] to tie
//! it to a timeout). Cancelling it:
//!
//! - stops new targets from being handed out; those never produce a result,
//! - interrupts in-flight fetches, which then yield an absent result,
//! - lets every task exit, after which the stream closes.
//!
//! ## Failure isolation
//!
//! A failed fetch, a bad status, a malformed payload or a timeout only turns
//! that one target's result into an absent one. Nothing aborts the batch.

mod deadline;
mod pool;
mod spawn;

pub use deadline::{Deadline, deadline};

use crate::{
    DispatchConfig, Strategy,
    config::Resolved,
    extract::extract,
    fetch::Fetch,
};
use core::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Stream of per-target outcomes returned by [`dispatch`].
pub type ItemStream = ReceiverStream<ItemResult>;

/// The outcome of one attempted target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemResult {
    pub target: String,
    /// `None` when the attempt failed, timed out or was cancelled.
    pub numbers: Option<Vec<i64>>,
}

impl ItemResult {
    pub const fn absent(target: String) -> Self {
        Self {
            target,
            numbers: None,
        }
    }

    pub const fn is_absent(&self) -> bool {
        self.numbers.is_none()
    }
}

/// Fetches every target concurrently and streams back one [`ItemResult`] per
/// attempt.
///
/// Returns immediately. Zero values in `config` are replaced by their defaults
/// before anything is spawned. An empty `targets` list yields a stream that is
/// already closed.
///
/// Must be called from within a Tokio runtime.
pub fn dispatch(
    token: CancellationToken,
    config: DispatchConfig,
    targets: Vec<String>,
) -> ItemStream {
    let config = config.resolve();
    let (out_tx, out_rx) = mpsc::channel(config.stream_buffer_size);

    if targets.is_empty() {
        return ReceiverStream::new(out_rx);
    }

    tracing::debug!(
        targets = targets.len(),
        workers = config.num_workers,
        strategy = ?config.strategy,
        "Dispatching batch"
    );

    match config.strategy {
        Strategy::Pool => {
            tokio::spawn(pool::run(token, config, targets, out_tx));
        }
        Strategy::Spawn => {
            tokio::spawn(spawn::run(token, config, targets, out_tx));
        }
    }

    ReceiverStream::new(out_rx)
}

/// Runs one fetch-and-extract attempt, downgrading any failure to an absent
/// result.
async fn attempt(
    fetcher: &dyn Fetch,
    token: &CancellationToken,
    item_timeout: Duration,
    target: String,
) -> ItemResult {
    let fetched = tokio::time::timeout(item_timeout, fetcher.fetch(token, &target)).await;

    let outcome = match fetched {
        Ok(fetched) => fetched.and_then(|payload| extract(&payload)),
        Err(_elapsed) => Err(crate::Error::Timeout {
            target: target.clone(),
        }),
    };

    match outcome {
        Ok(numbers) => {
            tracing::trace!(url = %target, count = numbers.len(), "Item fetched");
            ItemResult {
                target,
                numbers: Some(numbers),
            }
        }
        Err(e) if e.is_cancelled() => {
            tracing::debug!(url = %target, "Item cancelled by batch deadline");
            ItemResult::absent(target)
        }
        Err(e) => {
            tracing::warn!(url = %target, error = %e, "Item failed");
            ItemResult::absent(target)
        }
    }
}

/// Shared per-batch state handed to every task.
#[derive(Clone)]
struct Context {
    token: CancellationToken,
    config: Resolved,
    out: mpsc::Sender<ItemResult>,
}

impl Context {
    /// Attempts `target` and forwards the result.
    ///
    /// Returns `false` once the consumer has dropped the stream.
    async fn process(&self, target: String) -> bool {
        let result = attempt(
            self.config.fetcher.as_ref(),
            &self.token,
            self.config.item_timeout,
            target,
        )
        .await;

        if let Err(_e) = self.out.send(result).await {
            tracing::debug!("Item stream dropped by consumer");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Reply, ScriptedFetcher};
    use futures::StreamExt;
    use std::collections::HashSet;

    const STRATEGIES: [Strategy; 2] = [Strategy::Pool, Strategy::Spawn];

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn config(fetcher: &ScriptedFetcher, item_timeout: Duration, strategy: Strategy) -> DispatchConfig {
        DispatchConfig::new(item_timeout)
            .with_strategy(strategy)
            .with_fetcher(fetcher.clone())
    }

    /// Runs a batch under a global deadline and collects the raw results.
    async fn run(
        config: DispatchConfig,
        targets: Vec<String>,
        response_timeout: Duration,
    ) -> Vec<ItemResult> {
        let parent = CancellationToken::new();
        let deadline = deadline(&parent, response_timeout);
        dispatch(deadline.token().clone(), config, targets)
            .collect()
            .await
    }

    fn absent(results: &[ItemResult]) -> usize {
        results.iter().filter(|r| r.is_absent()).count()
    }

    fn total_numbers(results: &[ItemResult]) -> usize {
        results
            .iter()
            .filter_map(|r| r.numbers.as_ref())
            .map(Vec::len)
            .sum()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_targets_succeed() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("rand10", Reply::numbers(0..10).after(ms(10)))
                .route("rand100", Reply::numbers(10..110).after(ms(40)));

            let results = run(
                config(&fetcher, ms(110), strategy),
                targets(&["rand10", "rand100"]),
                ms(500),
            )
            .await;

            assert_eq!(results.len(), 2, "{strategy:?}");
            assert_eq!(absent(&results), 0, "{strategy:?}");
            assert_eq!(total_numbers(&results), 110, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn item_timeout_yields_absent_result() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("fast", Reply::numbers(0..10).after(ms(10)))
                .route("slow", Reply::numbers(0..100).after(ms(100)));

            let results = run(
                config(&fetcher, ms(50), strategy),
                targets(&["fast", "slow"]),
                ms(500),
            )
            .await;

            assert_eq!(results.len(), 2, "{strategy:?}");
            assert_eq!(absent(&results), 1, "{strategy:?}");
            assert_eq!(total_numbers(&results), 10, "{strategy:?}");
            let slow = results.iter().find(|r| r.target == "slow").unwrap();
            assert!(slow.is_absent());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn global_deadline_cancels_in_flight_fetch() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("fast", Reply::numbers(0..10).after(ms(10)))
                .route("slow", Reply::numbers(0..100).after(ms(300)));

            let start = std::time::Instant::now();
            let results = run(
                config(&fetcher, ms(1_000), strategy),
                targets(&["fast", "slow"]),
                ms(50),
            )
            .await;

            assert_eq!(results.len(), 2, "{strategy:?}");
            assert_eq!(absent(&results), 1, "{strategy:?}");
            assert_eq!(total_numbers(&results), 10, "{strategy:?}");
            assert!(start.elapsed() < ms(250), "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mixed_failures_do_not_abort_batch() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("http://fail.10", Reply::unavailable().after(ms(10)))
                .route("http://rand10.10", Reply::numbers(0..10).after(ms(10)));

            let results = run(
                config(&fetcher, ms(50), strategy),
                targets(&["http://fail.10", "://fail.10", "http://rand10.10"]),
                ms(50),
            )
            .await;

            assert_eq!(results.len(), 3, "{strategy:?}");
            assert_eq!(absent(&results), 2, "{strategy:?}");
            assert_eq!(total_numbers(&results), 10, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_target_failing_still_closes_stream() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("http://fail.10", Reply::unavailable())
                .route("http://rand10.100", Reply::numbers(0..10).after(ms(100)))
                .route("http://garbage", Reply::body("a response that will not be parsed"));

            let results = run(
                config(&fetcher, ms(50), strategy),
                targets(&[
                    "http://fail.10",
                    "http://rand10.100",
                    "http://garbage",
                    "http://unavailableurl.com",
                ]),
                ms(500),
            )
            .await;

            assert_eq!(results.len(), 4, "{strategy:?}");
            assert_eq!(absent(&results), 4, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn deadline_leaves_targets_unresolved() {
        for strategy in STRATEGIES {
            let names: Vec<String> = (0..20).map(|i| format!("http://rand10.{i}")).collect();
            let mut fetcher = ScriptedFetcher::new();
            for (i, name) in (0_i64..).zip(&names) {
                fetcher = fetcher.route(name.clone(), Reply::numbers(i * 10..i * 10 + 10).after(ms(10)));
            }

            let results = run(
                config(&fetcher, ms(500), strategy).with_num_workers(2),
                names,
                ms(70),
            )
            .await;

            let present = results.len() - absent(&results);
            assert!(results.len() <= 20, "{strategy:?}");
            assert!(present < 20, "{strategy:?}: every target resolved");
            assert!(total_numbers(&results) < 200, "{strategy:?}");
            assert!(fetcher.call_count() < 20, "{strategy:?}");
            assert!(fetcher.max_in_flight() <= 2, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn small_pool_attempts_every_target() {
        for strategy in STRATEGIES {
            let names: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
            let mut fetcher = ScriptedFetcher::new();
            for name in &names {
                fetcher = fetcher.route(name.clone(), Reply::numbers([1, 2]).after(ms(5)));
            }

            let results = run(
                config(&fetcher, ms(500), strategy).with_num_workers(2),
                names.clone(),
                ms(2_000),
            )
            .await;

            assert_eq!(results.len(), 10, "{strategy:?}");
            assert_eq!(absent(&results), 0, "{strategy:?}");
            assert!(fetcher.max_in_flight() <= 2, "{strategy:?}");

            // Each target handed out exactly once.
            let mut calls = fetcher.calls();
            calls.sort();
            let mut expected = names;
            expected.sort();
            assert_eq!(calls, expected, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn zero_workers_falls_back_to_default() {
        for strategy in STRATEGIES {
            let names: Vec<String> = (0..30).map(|i| format!("t{i}")).collect();
            let mut fetcher = ScriptedFetcher::new();
            for name in &names {
                fetcher = fetcher.route(name.clone(), Reply::numbers([7]).after(ms(20)));
            }

            let results = run(
                config(&fetcher, ms(500), strategy).with_num_workers(0),
                names,
                ms(2_000),
            )
            .await;

            assert_eq!(results.len(), 30, "{strategy:?}");
            assert!(fetcher.max_in_flight() <= crate::DEFAULT_NUM_WORKERS);
            assert!(fetcher.max_in_flight() > 1, "{strategy:?}: ran sequentially");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn more_workers_than_targets() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new().route("only", Reply::numbers([1]));

            let results = run(
                config(&fetcher, ms(100), strategy).with_num_workers(64),
                targets(&["only"]),
                ms(500),
            )
            .await;

            assert_eq!(results, vec![ItemResult {
                target: "only".to_owned(),
                numbers: Some(vec![1]),
            }]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn oversized_worker_count_is_capped() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("a", Reply::numbers([1]))
                .route("b", Reply::numbers([2]));

            let results = run(
                config(&fetcher, ms(100), strategy).with_num_workers(usize::MAX),
                targets(&["a", "b"]),
                ms(500),
            )
            .await;

            assert_eq!(results.len(), 2, "{strategy:?}");
            assert_eq!(fetcher.call_count(), 2, "{strategy:?}");
        }
    }

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new();
            let mut stream = dispatch(
                CancellationToken::new(),
                config(&fetcher, ms(100), strategy),
                Vec::new(),
            );

            assert!(stream.next().await.is_none());
            assert_eq!(fetcher.call_count(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_targets_are_each_attempted_once() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new().route("dup", Reply::numbers([3, 3, 1]));

            let results = run(
                config(&fetcher, ms(100), strategy),
                targets(&["dup", "dup", "dup"]),
                ms(500),
            )
            .await;

            assert_eq!(results.len(), 3, "{strategy:?}");
            assert_eq!(fetcher.call_count(), 3, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_token_attempts_nothing() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new().route("a", Reply::numbers([1]));
            let token = CancellationToken::new();
            token.cancel();

            let results: Vec<_> = dispatch(
                token,
                config(&fetcher, ms(100), strategy),
                targets(&["a", "a", "a"]),
            )
            .collect()
            .await;

            assert!(results.is_empty(), "{strategy:?}");
            assert_eq!(fetcher.call_count(), 0, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropping_the_stream_stops_the_batch() {
        for strategy in STRATEGIES {
            let names: Vec<String> = (0..50).map(|i| format!("t{i}")).collect();
            let mut fetcher = ScriptedFetcher::new();
            for name in &names {
                fetcher = fetcher.route(name.clone(), Reply::numbers([1]).after(ms(5)));
            }

            let mut stream = dispatch(
                CancellationToken::new(),
                config(&fetcher, ms(100), strategy)
                    .with_num_workers(2)
                    .with_stream_buffer_size(1),
                names,
            );
            assert!(stream.next().await.is_some());
            drop(stream);

            tokio::time::sleep(ms(100)).await;
            assert_eq!(fetcher.in_flight_count(), 0, "{strategy:?}");
            assert!(fetcher.call_count() < 50, "{strategy:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_arrive_in_completion_order() {
        for strategy in STRATEGIES {
            let fetcher = ScriptedFetcher::new()
                .route("late", Reply::numbers([1]).after(ms(80)))
                .route("early", Reply::numbers([2]).after(ms(5)));

            let results = run(
                config(&fetcher, ms(500), strategy),
                targets(&["late", "early"]),
                ms(1_000),
            )
            .await;

            let order: Vec<&str> = results.iter().map(|r| r.target.as_str()).collect();
            assert_eq!(order, vec!["early", "late"], "{strategy:?}");
            let distinct: HashSet<_> = order.into_iter().collect();
            assert_eq!(distinct.len(), 2);
        }
    }
}
