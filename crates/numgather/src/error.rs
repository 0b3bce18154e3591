//! Error types for a single fetch-and-extract attempt.
//!
//! Every variant here is *soft* at the batch level: the dispatch engine turns
//! any of them into an absent [`ItemResult`](crate::ItemResult) and keeps
//! going. They exist so that fetch implementations, the extractor and the logs
//! can say what went wrong for one target.
//!
//! ## Error Cases
//! - `Transport`: the request could not be built or sent, or the body could not
//!   be read.
//! - `Status`: the remote answered with something other than `200 OK`.
//! - `Decode`: the payload is not a `{"numbers": [...]}` record.
//! - `Timeout`: the per-item timeout elapsed before a response arrived.
//! - `Cancelled`: the batch token was cancelled while the attempt was in flight.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for fetch and extraction failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connection, request construction or body read failure.
    #[error("transport error for {target}: {context}")]
    Transport { target: String, context: String },

    /// The remote answered with a non-success status code.
    #[error("{target} answered with status {status}")]
    Status { target: String, status: u16 },

    /// The payload could not be decoded into a record.
    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),

    /// The per-item timeout elapsed.
    #[error("request to {target} timed out")]
    Timeout { target: String },

    /// The batch was cancelled or its deadline expired mid-flight.
    #[error("request to {target} cancelled")]
    Cancelled { target: String },
}

impl Error {
    /// Returns `true` if the attempt ended because of the batch token rather
    /// than a failure of the target itself.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
