//! Server side of log synchronization.
//!
//! [`LogServer`] exposes a [`LogStore`] as the five log endpoints:
//!
//! | path | method | answers |
//! |---|---|---|
//! | `query` | GET | descriptor lines for `tid?`/`logid?`; 400 for a `filter` without either |
//! | `send` | POST | stores event lines from the body |
//! | `receive` | GET | event lines for `tid?`/`logid?`/`range?` |
//! | `sendids` | POST | applies lowest-id lines from the body |
//! | `receiveids` | GET | lowest-id lines for `tid?`/`logid?` |
//!
//! Batch posts store every record that parses and answer 400 if any line
//! was malformed, so the sender learns the batch was only partly accepted.

use async_trait::async_trait;

use outpost_core::{Event, LowestId, SortedRangeSet};
use outpost_store::{LogFilter, LogStore, PutReport};

use crate::messages::{params, parse_body_lines, paths, to_lines, Method, Request, Response};
use crate::transport::Service;

/// Request handler for the log endpoints.
pub struct LogServer<S: LogStore> {
    store: S,
}

impl<S: LogStore> LogServer<S> {
    /// Serve `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn query(&self, request: &Request) -> Response {
        let keyed = request.param(params::TARGET_ID).is_some() || request.param(params::LOG_ID).is_some();
        if request.param(params::FILTER).is_some() && !keyed {
            return Response::bad_request("filter parameter is not supported");
        }
        let filter = match log_filter(request) {
            Ok(filter) => filter,
            Err(response) => return response,
        };
        match self.store.descriptors(&filter).await {
            Ok(descriptors) => Response::ok(to_lines(&descriptors)),
            Err(e) => Response::internal_error(e.to_string()),
        }
    }

    async fn send(&self, request: &Request) -> Response {
        let (events, rejected) = parse_body_lines::<Event>(&request.body);
        for line in &rejected {
            tracing::warn!(record = %line, "skipping malformed event");
        }

        let report: PutReport = match self.store.put(&events).await {
            Ok(report) => report,
            Err(e) => return Response::internal_error(e.to_string()),
        };
        tracing::debug!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            below_floor = report.below_floor,
            out_of_range = report.out_of_range,
            rejected = rejected.len(),
            "stored events"
        );

        batch_status(rejected.len() + report.out_of_range)
    }

    async fn receive(&self, request: &Request) -> Response {
        let filter = match log_filter(request) {
            Ok(filter) => filter,
            Err(response) => return response,
        };
        let range = match request.parse_param::<SortedRangeSet>(params::RANGE) {
            Ok(range) => range.unwrap_or_else(SortedRangeSet::full),
            Err(message) => return Response::bad_request(message),
        };

        let descriptors = match self.store.descriptors(&filter).await {
            Ok(descriptors) => descriptors,
            Err(e) => return Response::internal_error(e.to_string()),
        };
        let mut events = Vec::new();
        for descriptor in descriptors {
            match self.store.get(&descriptor.log_id(), &range).await {
                Ok(found) => events.extend(found),
                Err(e) => return Response::internal_error(e.to_string()),
            }
        }
        Response::ok(to_lines(&events))
    }

    async fn send_ids(&self, request: &Request) -> Response {
        let (ids, rejected) = parse_body_lines::<LowestId>(&request.body);
        for line in &rejected {
            tracing::warn!(record = %line, "skipping malformed lowest id");
        }

        for id in &ids {
            match self.store.set_lowest_id(&id.log_id(), id.lowest_id).await {
                Ok(true) => tracing::debug!(log = %id.log_id(), lowest_id = id.lowest_id, "floor raised"),
                Ok(false) => {}
                Err(e) => return Response::internal_error(e.to_string()),
            }
        }

        batch_status(rejected.len())
    }

    async fn receive_ids(&self, request: &Request) -> Response {
        let filter = match log_filter(request) {
            Ok(filter) => filter,
            Err(response) => return response,
        };
        match self.store.lowest_ids(&filter).await {
            Ok(ids) => Response::ok(to_lines(&ids)),
            Err(e) => Response::internal_error(e.to_string()),
        }
    }
}

#[async_trait]
impl<S: LogStore> Service for LogServer<S> {
    async fn handle(&self, request: Request) -> Response {
        let expected = match request.route() {
            paths::QUERY | paths::RECEIVE | paths::RECEIVE_IDS => Method::Get,
            paths::SEND | paths::SEND_IDS => Method::Post,
            other => return Response::not_found(format!("unknown path: {}", other)),
        };
        if request.method != expected {
            return Response::method_not_allowed(request.method);
        }

        match request.route() {
            paths::QUERY => self.query(&request).await,
            paths::SEND => self.send(&request).await,
            paths::RECEIVE => self.receive(&request).await,
            paths::SEND_IDS => self.send_ids(&request).await,
            _ => self.receive_ids(&request).await,
        }
    }
}

/// Build a filter from `tid` / `logid`, or a 400 response.
fn log_filter(request: &Request) -> Result<LogFilter, Response> {
    let store_id = request
        .parse_param::<u64>(params::LOG_ID)
        .map_err(Response::bad_request)?;
    Ok(LogFilter {
        target_id: request.param(params::TARGET_ID).map(str::to_string),
        store_id,
    })
}

fn batch_status(rejected: usize) -> Response {
    if rejected == 0 {
        Response::ok_empty()
    } else {
        Response::bad_request(format!("{} malformed records skipped", rejected))
    }
}
