use crate::fetch::{Fetch, HttpFetcher};
use core::fmt;
use core::time::Duration;
use std::sync::Arc;

/// Worker count used when a configuration asks for zero workers.
pub const DEFAULT_NUM_WORKERS: usize = 20;

/// Capacity of the item result channel when none is configured.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 16;

/// Per-item timeout used when a configuration carries a zero timeout.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_millis(450);

/// How the dispatch engine bounds concurrency.
///
/// Both strategies honour the same contract; they only differ in how tasks
/// are laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// A fixed pool of long-lived workers pulling from a shared queue.
    #[default]
    Pool,
    /// One short-lived task per target, gated by a semaphore.
    Spawn,
}

/// Configuration of one dispatch call.
///
/// Nothing here is validated on construction. [`dispatch`](crate::dispatch)
/// resolves zero values and a missing fetcher to their defaults at entry.
#[derive(Clone, Default)]
pub struct DispatchConfig {
    /// Upper bound on a single fetch attempt.
    pub item_timeout: Duration,
    /// Concurrency budget. Zero means [`DEFAULT_NUM_WORKERS`].
    pub num_workers: usize,
    /// Capacity of the item result channel. Zero means
    /// [`DEFAULT_STREAM_BUFFER_SIZE`].
    pub stream_buffer_size: usize,
    pub strategy: Strategy,
    /// Fetch capability override. `None` means an [`HttpFetcher`] bound to
    /// `item_timeout`.
    pub fetcher: Option<Arc<dyn Fetch>>,
}

impl DispatchConfig {
    pub fn new(item_timeout: Duration) -> Self {
        Self {
            item_timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    #[must_use]
    pub fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Applies defaults, producing the values the engine actually runs with.
    pub(crate) fn resolve(self) -> Resolved {
        let item_timeout = if self.item_timeout.is_zero() {
            DEFAULT_ITEM_TIMEOUT
        } else {
            self.item_timeout
        };
        let num_workers = if self.num_workers == 0 {
            DEFAULT_NUM_WORKERS
        } else {
            self.num_workers
        };
        let stream_buffer_size = if self.stream_buffer_size == 0 {
            DEFAULT_STREAM_BUFFER_SIZE
        } else {
            self.stream_buffer_size
        };
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(item_timeout)));

        Resolved {
            item_timeout,
            num_workers,
            stream_buffer_size,
            strategy: self.strategy,
            fetcher,
        }
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("item_timeout", &self.item_timeout)
            .field("num_workers", &self.num_workers)
            .field("stream_buffer_size", &self.stream_buffer_size)
            .field("strategy", &self.strategy)
            .field(
                "fetcher_timeout",
                &self.fetcher.as_ref().map(|fetcher| fetcher.timeout()),
            )
            .finish()
    }
}

/// A [`DispatchConfig`] with every default applied.
#[derive(Clone)]
pub(crate) struct Resolved {
    pub item_timeout: Duration,
    pub num_workers: usize,
    pub stream_buffer_size: usize,
    pub strategy: Strategy,
    pub fetcher: Arc<dyn Fetch>,
}
