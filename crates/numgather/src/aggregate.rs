//! Merging of item results into one ascending, duplicate-free sequence.

use crate::ItemResult;
use futures::{Stream, StreamExt};
use std::collections::HashSet;

/// Final result of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    /// Distinct values across every present item result, ascending.
    pub numbers: Vec<i64>,
    /// Item results observed on the stream.
    pub items: usize,
    /// How many of those were absent.
    pub absent: usize,
}

/// Accumulates item results. Owned by a single consumer, so no locking.
#[derive(Debug, Default)]
pub struct Aggregator {
    seen: HashSet<i64>,
    items: usize,
    absent: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: &ItemResult) {
        self.items += 1;
        match &item.numbers {
            Some(numbers) => self.seen.extend(numbers.iter().copied()),
            None => self.absent += 1,
        }
    }

    pub fn finish(self) -> Aggregate {
        let mut numbers: Vec<i64> = self.seen.into_iter().collect();
        numbers.sort_unstable();

        Aggregate {
            numbers,
            items: self.items,
            absent: self.absent,
        }
    }
}

/// Drains `stream` to its end and merges everything it yielded.
///
/// There is no early exit: the engine behind the stream enforces the batch
/// deadline, so waiting for closure is bounded by it.
pub async fn aggregate<S>(stream: S) -> Aggregate
where
    S: Stream<Item = ItemResult>,
{
    let mut aggregator = Aggregator::new();
    let mut stream = core::pin::pin!(stream);

    while let Some(item) = stream.next().await {
        aggregator.push(&item);
    }

    aggregator.finish()
}
