//! Pluggable retrieval of raw payloads.
//!
//! The dispatch engine never talks to the network directly. It holds an
//! `Arc<dyn Fetch>` and asks it for the bytes behind each target. The default
//! implementation is [`HttpFetcher`]; [`ScriptedFetcher`] replaces it in tests
//! and benchmarks.
//!
//! ## Contract
//!
//! - An implementation must return promptly once the supplied
//!   [`CancellationToken`] is cancelled. Ignoring the token breaks the global
//!   deadline of the batch.
//! - Any failure is returned as an [`Error`](crate::Error); the engine decides
//!   what to do with it (it downgrades it to an absent result).

mod http;
mod scripted;

pub use http::HttpFetcher;
pub use scripted::{Reply, ScriptedFetcher};

use crate::Result;
use bytes::Bytes;
use core::time::Duration;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Retrieves the raw payload behind a target identifier.
///
/// The method returns a boxed future so that the trait stays object safe and
/// can be swapped at configuration time behind an `Arc<dyn Fetch>`.
pub trait Fetch: Send + Sync {
    /// Fetches `target`, giving up as soon as `token` is cancelled.
    fn fetch<'a>(
        &'a self,
        token: &'a CancellationToken,
        target: &'a str,
    ) -> BoxFuture<'a, Result<Bytes>>;

    /// The transport-level timeout this implementation applies on its own,
    /// if any.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}
