use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use numgather::{DispatchConfig, Strategy, fetch::Fetch};
use std::sync::Arc;

/// Runtime configuration for the `numgather-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single service
/// answering within half a second.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "numgather-server",
    version,
    about = "Fetches many number sources concurrently and answers with their sorted union"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Global deadline for one request, in milliseconds.
    ///
    /// Sources that have not answered by then are dropped from the response;
    /// sources not yet contacted are never contacted.
    ///
    /// Environment variable: `RESPONSE_TIMEOUT_MS`
    #[arg(long, env = "RESPONSE_TIMEOUT_MS", default_value_t = 480)]
    pub response_timeout_ms: u64,

    /// Timeout for a single source, in milliseconds.
    ///
    /// Environment variable: `GET_TIMEOUT_MS`
    #[arg(long, env = "GET_TIMEOUT_MS", default_value_t = 450)]
    pub get_timeout_ms: u64,

    /// Maximum number of sources fetched concurrently per request.
    ///
    /// Zero or a negative value selects the library default.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(
        long,
        env = "NUM_WORKERS",
        allow_negative_numbers = true,
        default_value_t = numgather::DEFAULT_NUM_WORKERS as i64
    )]
    pub num_workers: i64,

    /// Capacity of the channel between fetch workers and the response
    /// aggregator.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = numgather::DEFAULT_STREAM_BUFFER_SIZE)]
    pub stream_buffer_size: usize,

    /// How fetches are scheduled.
    ///
    /// Environment variable: `DISPATCH_STRATEGY`
    #[arg(long, env = "DISPATCH_STRATEGY", value_enum, default_value_t = StrategyArg::Pool)]
    pub strategy: StrategyArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Fixed pool of workers sharing one queue.
    Pool,
    /// One task per source, bounded by a semaphore.
    Spawn,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Pool => Self::Pool,
            StrategyArg::Spawn => Self::Spawn,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub response_timeout: Duration,
    pub get_timeout: Duration,
    pub num_workers: usize,
    pub stream_buffer_size: usize,
    pub strategy: Strategy,
}

impl ServerConfig {
    /// Builds the per-request dispatch configuration around a shared fetcher.
    pub fn dispatch_config(&self, fetcher: Arc<dyn Fetch>) -> DispatchConfig {
        DispatchConfig {
            item_timeout: self.get_timeout,
            num_workers: self.num_workers,
            stream_buffer_size: self.stream_buffer_size,
            strategy: self.strategy,
            fetcher: Some(fetcher),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.response_timeout_ms == 0 {
            bail!("RESPONSE_TIMEOUT_MS must be greater than 0");
        }

        if args.get_timeout_ms == 0 {
            bail!("GET_TIMEOUT_MS must be greater than 0");
        }

        if args.get_timeout_ms > args.response_timeout_ms {
            tracing::warn!(
                get_timeout_ms = args.get_timeout_ms,
                response_timeout_ms = args.response_timeout_ms,
                "GET_TIMEOUT_MS exceeds RESPONSE_TIMEOUT_MS, the response timeout will cut fetches short"
            );
        }

        Ok(Self {
            server_addr: args.server_addr,
            response_timeout: Duration::from_millis(args.response_timeout_ms),
            get_timeout: Duration::from_millis(args.get_timeout_ms),
            // Non-positive counts become 0, which the engine resolves to its default.
            num_workers: usize::try_from(args.num_workers).unwrap_or(0),
            stream_buffer_size: args.stream_buffer_size,
            strategy: args.strategy.into(),
        })
    }
}
