//! Typed client for a remote log endpoint.

use std::str::FromStr;
use std::time::Duration;

use outpost_core::{Descriptor, Event, LogId, LowestId, SortedRangeSet};
use outpost_store::LogFilter;

use crate::error::{Result, SyncError};
use crate::messages::{params, parse_lines, paths, status, to_lines, Request, Response};
use crate::transport::Transport;

/// Default bound on a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote log store reached through a [`Transport`].
///
/// Every call is bounded by the request timeout; expiry surfaces as
/// [`SyncError::Timeout`].
pub struct RemoteLog<T: Transport> {
    transport: T,
    endpoint: String,
    timeout: Duration,
}

impl<T: Transport> RemoteLog<T> {
    /// Client for `endpoint` over `transport`.
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let path = request.path.clone();
        tokio::time::timeout(self.timeout, self.transport.call(&self.endpoint, request))
            .await
            .map_err(|_| {
                SyncError::Timeout(format!(
                    "{}/{} after {}ms",
                    self.endpoint,
                    path,
                    self.timeout.as_millis()
                ))
            })?
    }

    /// Descriptors of the remote logs passing `filter`.
    pub async fn query(&self, filter: &LogFilter) -> Result<Vec<Descriptor>> {
        let request = with_filter(Request::get(paths::QUERY), filter);
        let response = self.call(request).await?.error_for_status()?;
        records(&response, "descriptor")
    }

    /// Send events. Returns `false` if the remote skipped malformed records.
    pub async fn send(&self, events: &[Event]) -> Result<bool> {
        let response = self.call(Request::post(paths::SEND, to_lines(events))).await?;
        batch_accepted(response)
    }

    /// Events of `log`, restricted to `range` if given.
    pub async fn receive(&self, log: &LogId, range: Option<&SortedRangeSet>) -> Result<Vec<Event>> {
        let request = Request::get(paths::RECEIVE)
            .with_param(params::TARGET_ID, &log.target_id)
            .with_param(params::LOG_ID, log.store_id)
            .with_opt_param(params::RANGE, range);
        let response = self.call(request).await?.error_for_status()?;
        records(&response, "event")
    }

    /// Send compaction floors. Returns `false` if the remote skipped malformed records.
    pub async fn send_ids(&self, ids: &[LowestId]) -> Result<bool> {
        let response = self.call(Request::post(paths::SEND_IDS, to_lines(ids))).await?;
        batch_accepted(response)
    }

    /// Remote compaction floors for `filter`.
    pub async fn receive_ids(&self, filter: &LogFilter) -> Result<Vec<LowestId>> {
        let request = with_filter(Request::get(paths::RECEIVE_IDS), filter);
        let response = self.call(request).await?.error_for_status()?;
        records(&response, "lowest id")
    }
}

fn with_filter(request: Request, filter: &LogFilter) -> Request {
    request
        .with_opt_param(params::TARGET_ID, filter.target_id.as_ref())
        .with_opt_param(params::LOG_ID, filter.store_id)
}

fn records<R: FromStr>(response: &Response, kind: &str) -> Result<Vec<R>> {
    let (records, rejected) = parse_lines(response.text()?);
    for line in rejected {
        tracing::warn!(record = %line, "skipping malformed {} from remote", kind);
    }
    Ok(records)
}

fn batch_accepted(response: Response) -> Result<bool> {
    match response.status {
        status::OK => Ok(true),
        status::BAD_REQUEST => Ok(false),
        _ => response.error_for_status().map(|_| true),
    }
}
