//! HTTP entry point for batch requests.
//!
//! `GET /numbers?u=<url>&u=<url>...` runs one batch over the given targets and
//! always answers `200 OK` with whatever completed before the response
//! deadline. `GET /health` answers `200 ok`.

use crate::server::{
    config::ServerConfig,
    telemetry::{
        increment_batches, increment_items, increment_items_absent, record_batch_duration,
        record_numbers_per_response,
    },
};
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use numgather::{BatchRequest, CancellationToken, fetch::Fetch, run_batch};
use serde::Serialize;
use std::sync::Arc;

/// Query parameter carrying one target. Repeatable.
const TARGET_PARAM: &str = "u";

/// State shared by every request.
///
/// The fetcher is built once so all batches share one connection pool.
/// Cancelling `shutdown` ends every in-flight batch early.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    fetcher: Arc<dyn Fetch>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, fetcher: Arc<dyn Fetch>, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            shutdown,
        }
    }
}

/// Response body, `{"Numbers": [...]}`.
#[derive(Serialize, Debug)]
pub struct NumbersResponse {
    #[serde(rename = "Numbers")]
    pub numbers: Vec<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/numbers", get(numbers))
        .route("/health", get(health))
        .with_state(state)
}

async fn numbers(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<NumbersResponse> {
    let start = std::time::Instant::now();
    increment_batches();

    let targets: Vec<String> = params
        .into_iter()
        .filter_map(|(key, value)| (key == TARGET_PARAM).then_some(value))
        .collect();

    let request = BatchRequest {
        targets,
        response_timeout: state.config.response_timeout,
        config: state.config.dispatch_config(Arc::clone(&state.fetcher)),
    };

    let aggregate = run_batch(&state.shutdown, request).await;

    increment_items((aggregate.items - aggregate.absent) as u64);
    increment_items_absent(aggregate.absent as u64);
    record_numbers_per_response(aggregate.numbers.len() as f64);
    record_batch_duration(start.elapsed().as_secs_f64() * 1000.0);

    Json(NumbersResponse {
        numbers: aggregate.numbers,
    })
}

async fn health() -> &'static str {
    "ok"
}
