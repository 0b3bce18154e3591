#![doc = include_str!("../README.md")]

mod aggregate;
mod batch;
mod config;
mod dispatch;
mod error;
mod extract;
pub mod fetch;

pub use crate::aggregate::*;
pub use crate::batch::*;
pub use crate::config::{
    DEFAULT_ITEM_TIMEOUT, DEFAULT_NUM_WORKERS, DEFAULT_STREAM_BUFFER_SIZE, DispatchConfig,
    Strategy,
};
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::extract::*;
// Re-exported for callers without a direct `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
