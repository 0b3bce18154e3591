use super::Fetch;
use crate::{Error, Result};
use bytes::Bytes;
use core::time::Duration;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

/// Default [`Fetch`] implementation: a plain HTTP `GET`.
///
/// Only `200 OK` counts as success. Every request carries the configured
/// timeout and races the batch token, whichever fires first wins.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Builds a fetcher whose client and requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client, falling back to defaults");
                reqwest::Client::new()
            });

        Self::with_client(client, timeout)
    }

    /// Wraps an existing client. The timeout is still applied per request.
    pub const fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The underlying HTTP client.
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get(&self, target: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(target)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(target, &e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Status {
                target: target.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(target, &e))?;

        tracing::trace!(url = %target, len = body.len(), "Fetched payload");
        Ok(body)
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        token: &'a CancellationToken,
        target: &'a str,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled { target: target.to_owned() }),
                res = self.get(target) => res,
            }
        })
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}

fn transport_error(target: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            target: target.to_owned(),
        }
    } else {
        Error::Transport {
            target: target.to_owned(),
            context: err.to_string(),
        }
    }
}
