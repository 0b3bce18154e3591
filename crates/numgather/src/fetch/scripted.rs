use super::Fetch;
use crate::{Error, Result};
use bytes::Bytes;
use core::time::Duration;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// What a [`ScriptedFetcher`] answers for one target.
#[derive(Clone, Debug)]
pub struct Reply {
    latency: Duration,
    outcome: Outcome,
}

#[derive(Clone, Debug)]
enum Outcome {
    Body(Bytes),
    Unavailable,
}

impl Reply {
    /// A well-formed `{"numbers": [...]}` record.
    pub fn numbers(numbers: impl IntoIterator<Item = i64>) -> Self {
        let numbers: Vec<i64> = numbers.into_iter().collect();
        Self::body(serde_json::json!({ "numbers": numbers }).to_string())
    }

    /// An arbitrary payload, well-formed or not.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Outcome::Body(body.into()),
        }
    }

    /// A server-side failure, reported as a `503`.
    pub const fn unavailable() -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Outcome::Unavailable,
        }
    }

    /// Delays the reply by `latency`.
    #[must_use]
    pub fn after(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// In-memory [`Fetch`] implementation with scripted latency and outcomes.
///
/// Targets without a reply fail with a transport error, as an unreachable
/// host would. Latency races the batch token, so a cancelled batch returns
/// [`Error::Cancelled`] promptly. Every attempt is recorded.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    replies: Arc<HashMap<String, Reply>>,
    timeout: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `reply` for `target`, replacing any previous one.
    ///
    /// Must be called before the fetcher is cloned or shared.
    #[must_use]
    pub fn route(mut self, target: impl Into<String>, reply: Reply) -> Self {
        Arc::make_mut(&mut self.replies).insert(target.into(), reply);
        self
    }

    /// Fails any attempt whose latency exceeds `timeout` with
    /// [`Error::Timeout`], as a transport-level timeout would.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Targets attempted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Attempts currently executing.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of attempts that were ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn reply(&self, token: &CancellationToken, target: &str) -> Result<Bytes> {
        let Some(reply) = self.replies.get(target) else {
            return Err(Error::Transport {
                target: target.to_owned(),
                context: "no such host".to_owned(),
            });
        };

        let latency = match self.timeout {
            Some(timeout) if timeout < reply.latency => timeout,
            _ => reply.latency,
        };

        tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(Error::Cancelled { target: target.to_owned() });
            }
            () = tokio::time::sleep(latency) => {}
        }

        if latency < reply.latency {
            return Err(Error::Timeout {
                target: target.to_owned(),
            });
        }

        match &reply.outcome {
            Outcome::Body(body) => Ok(body.clone()),
            Outcome::Unavailable => Err(Error::Status {
                target: target.to_owned(),
                status: 503,
            }),
        }
    }
}

impl Fetch for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        token: &'a CancellationToken,
        target: &'a str,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            self.calls.lock().push(target.to_owned());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
            };

            self.reply(token, target).await
        })
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Decrements the in-flight counter even if the attempt future is dropped.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
