// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking HTTP client for the oar service.
//!
//! Every operation returns a `Result<_, ReportFailure>` and logs failures through the client's
//! [`LogSink`]. Nothing here panics on a bad response or an unreachable service, so reporting can
//! never fail the run it reports on.
//!
//! Requests that fail with a 500, 502, 503 or 504 status or at the connection level are retried
//! according to the client's [`RetryPolicy`]. Creating a record is the exception: it is only
//! retried if the connection was never established, so a record is never created twice.

use crate::{
    config::OarConfig,
    errors::{DisplayErrorChain, ReportFailure},
    log_sink::LogSink,
    retry::RetryPolicy,
};
use debug_ignore::DebugIgnore;
use oar_metadata::{Query, QueryError, QueryResult, QueryToken, Record};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{fmt, io, thread, time::Duration};
use tracing::{debug, error};
use ureq::{Agent, Body, RequestBuilder, http::Response};

/// Statuses that indicate a transient problem on the service side.
pub const RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Default page size for [`Client::list`].
pub const DEFAULT_LIST_LIMIT: u32 = 250;

/// Largest page size the service accepts.
pub const MAX_LIST_LIMIT: u32 = 1000;

const NOT_MODIFIED: u16 = 304;

/// Builder for a [`Client`].
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    base_url: String,
    retry_policy: RetryPolicy,
    timeout: Duration,
    log_sink: Option<LogSink>,
}

impl ClientBuilder {
    /// Creates a builder for a client talking to the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = OarConfig::default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry_policy: defaults.retries,
            timeout: defaults.timeout,
            log_sink: None,
        }
    }

    /// Creates a builder with the host, retry policy and timeout of `config`.
    pub fn from_config(config: &OarConfig) -> Self {
        Self::new(config.base_url())
            .retry_policy(config.retries)
            .timeout(config.timeout)
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the timeout for a single attempt of a request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the sink the client logs to. Defaults to [`LogSink::current`] at build time.
    pub fn log_sink(mut self, log_sink: LogSink) -> Self {
        self.log_sink = Some(log_sink);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Client {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Client {
            agent: DebugIgnore(agent),
            base_url: self.base_url,
            retry_policy: self.retry_policy,
            sink: self.log_sink.unwrap_or_else(LogSink::current),
        }
    }
}

/// The result of a successful delete.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeleteOutcome {
    /// At least one record was deleted.
    Applied,

    /// No record matched, so nothing was deleted.
    NothingMatched,
}

impl DeleteOutcome {
    /// Returns the status code the service uses for this outcome: 200 or 304.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Applied => 200,
            Self::NothingMatched => NOT_MODIFIED,
        }
    }
}

/// A client for the oar service.
///
/// The client owns a connection pool that is reused across calls.
#[derive(Clone, Debug)]
pub struct Client {
    agent: DebugIgnore<Agent>,
    base_url: String,
    retry_policy: RetryPolicy,
    sink: LogSink,
}

impl Client {
    /// Creates a client with default settings for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientBuilder::new(base_url).build()
    }

    /// Returns the base URL of the service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a new record and returns the id the service assigned to it.
    ///
    /// The record must have a non-blank summary, an outcome, and an analysis consistent with the
    /// outcome. Otherwise nothing is sent.
    pub fn add(&self, record: &Record) -> Result<u64, ReportFailure> {
        let url = self.url("/test");
        self.log_failure(Method::Post, &url, || {
            record.check_verdict().map_err(ReportFailure::Validation)?;
            let request = Request::new(Method::Post, url.clone(), RetryClass::CreateOnce)
                .body(Value::Object(record.as_request_body()));
            let response = self.send(&request)?;
            decode_json(&request, response)
        })
    }

    /// Updates the record with the id of `record`, setting every field `record` carries.
    pub fn enrich(&self, record: &Record) -> Result<(), ReportFailure> {
        let url = self.url("/test");
        self.log_failure(Method::Patch, &url, || {
            let request = Request::new(Method::Patch, url.clone(), RetryClass::Idempotent)
                .body(Value::Object(record.as_request_body()));
            self.send(&request).map(drop)
        })
    }

    /// Updates every record matching `query`, setting every field `record` carries.
    pub fn enrich_by_query(&self, record: &Record, query: &Query) -> Result<(), ReportFailure> {
        let url = self.url("/tests");
        self.log_failure(Method::Patch, &url, || {
            let request = Request::new(Method::Patch, url.clone(), RetryClass::Idempotent)
                .query("query", encode_locally(query)?.as_str())
                .body(Value::Object(record.as_request_body()));
            self.send(&request).map(drop)
        })
    }

    /// Deletes the records with the given ids.
    ///
    /// Ids that do not exist are ignored. An empty list is answered with
    /// [`DeleteOutcome::NothingMatched`] without contacting the service.
    pub fn delete_by_ids(&self, ids: &[u64]) -> Result<DeleteOutcome, ReportFailure> {
        if ids.is_empty() {
            return Ok(DeleteOutcome::NothingMatched);
        }
        let url = self.url("/tests");
        self.log_failure(Method::Delete, &url, || {
            let body = ids.iter().map(|id| json!({ "ID": id })).collect();
            let request = Request::new(Method::Delete, url.clone(), RetryClass::Idempotent)
                .body(Value::Array(body))
                .accept_not_modified();
            self.send(&request).map(|response| delete_outcome(&response))
        })
    }

    /// Deletes every record matching `query`.
    pub fn delete_by_query(&self, query: &Query) -> Result<DeleteOutcome, ReportFailure> {
        let url = self.url("/tests");
        self.log_failure(Method::Delete, &url, || {
            let request = Request::new(Method::Delete, url.clone(), RetryClass::Idempotent)
                .query("query", encode_locally(query)?.as_str())
                .accept_not_modified();
            self.send(&request).map(|response| delete_outcome(&response))
        })
    }

    /// Returns one page of the records matching `query`.
    ///
    /// `limit` defaults to [`DEFAULT_LIST_LIMIT`]; the service rejects anything above
    /// [`MAX_LIST_LIMIT`]. An empty query matches every record.
    pub fn list(
        &self,
        query: &Query,
        offset: u64,
        limit: Option<u32>,
    ) -> Result<QueryResult, ReportFailure> {
        let url = self.url("/tests");
        self.log_failure(Method::Get, &url, || {
            let mut request = Request::new(Method::Get, url.clone(), RetryClass::Idempotent)
                .query("offset", offset.to_string())
                .query("limit", limit.unwrap_or(DEFAULT_LIST_LIMIT).to_string());
            if !query.is_empty() {
                request = request.query("query", encode_locally(query)?.as_str());
            }
            let response = self.send(&request)?;
            decode_json(&request, response)
        })
    }

    /// Asks the service to encode `query`.
    ///
    /// The result is the same token [`Query::to_token`] produces locally.
    pub fn encode_query(&self, query: &Query) -> Result<QueryToken, ReportFailure> {
        let url = self.url("/query");
        self.log_failure(Method::Post, &url, || {
            let body = serde_json::to_value(query)
                .map_err(|error| ReportFailure::Query(QueryError::Serialize(error)))?;
            let request =
                Request::new(Method::Post, url.clone(), RetryClass::Idempotent).body(body);
            let response = self.send(&request)?;
            decode_json(&request, response)
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn log_failure<T>(
        &self,
        method: Method,
        url: &str,
        f: impl FnOnce() -> Result<T, ReportFailure>,
    ) -> Result<T, ReportFailure> {
        f().inspect_err(|failure| {
            self.sink.in_scope(|| {
                error!(
                    "oar {method} {url} failed: {}",
                    DisplayErrorChain::new(failure),
                )
            })
        })
    }

    /// Sends a request, retrying according to its retry class.
    ///
    /// Returns the response if its status was successful or otherwise accepted by the request.
    fn send(&self, request: &Request) -> Result<Response<Body>, ReportFailure> {
        let mut backoff = self.retry_policy.backoff();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let retry = match request.call(&self.agent) {
                Ok(response) if request.accepts(response.status().as_u16()) => {
                    return Ok(response);
                }
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let retryable = request.retry_class.retries_status(status);
                    match backoff.next().filter(|_| retryable) {
                        Some(delay) => Retry {
                            delay,
                            reason: format!("status {status}"),
                        },
                        None => {
                            return Err(ReportFailure::Rejected {
                                method: request.method.as_str(),
                                url: request.url.clone(),
                                status,
                                message: error_message(&mut response),
                                retries_exhausted: retryable,
                            });
                        }
                    }
                }
                Err(error) => {
                    let retryable = request.retry_class.retries_error(&error);
                    match backoff.next().filter(|_| retryable) {
                        Some(delay) => Retry {
                            delay,
                            reason: error.to_string(),
                        },
                        None => {
                            return Err(ReportFailure::Transport {
                                method: request.method.as_str(),
                                url: request.url.clone(),
                                attempts,
                                error,
                            });
                        }
                    }
                }
            };

            self.sink.in_scope(|| {
                debug!(
                    "{} {} attempt {attempts} failed ({}), retrying in {:?}",
                    request.method, request.url, retry.reason, retry.delay,
                )
            });
            thread::sleep(retry.delay);
        }
    }
}

struct Retry {
    delay: Duration,
    reason: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which failures a request may be retried on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RetryClass {
    /// Repeating the request has the same effect as sending it once.
    Idempotent,

    /// Repeating the request after the service has seen it could create a duplicate.
    CreateOnce,
}

impl RetryClass {
    fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Idempotent => RETRY_STATUSES.contains(&status),
            Self::CreateOnce => false,
        }
    }

    fn retries_error(self, error: &ureq::Error) -> bool {
        match self {
            Self::Idempotent => never_connected(error) || is_transient(error),
            Self::CreateOnce => never_connected(error),
        }
    }
}

/// Returns true if the request never reached the service.
fn never_connected(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => true,
        ureq::Error::Timeout(ureq::Timeout::Resolve | ureq::Timeout::Connect) => true,
        ureq::Error::Io(error) => matches!(
            error.kind(),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable
        ),
        _ => false,
    }
}

fn is_transient(error: &ureq::Error) -> bool {
    matches!(error, ureq::Error::Io(_) | ureq::Error::Timeout(_))
}

#[derive(Clone, Debug)]
struct Request {
    method: Method,
    url: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    retry_class: RetryClass,
    accept_not_modified: bool,
}

impl Request {
    fn new(method: Method, url: String, retry_class: RetryClass) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: None,
            retry_class,
            accept_not_modified: false,
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn accept_not_modified(mut self) -> Self {
        self.accept_not_modified = true;
        self
    }

    fn accepts(&self, status: u16) -> bool {
        (200..300).contains(&status) || (self.accept_not_modified && status == NOT_MODIFIED)
    }

    fn call(&self, agent: &Agent) -> Result<Response<Body>, ureq::Error> {
        match (self.method, &self.body) {
            (Method::Get, _) => self.with_query(agent.get(&self.url)).call(),
            (Method::Delete, None) => self.with_query(agent.delete(&self.url)).call(),
            (Method::Delete, Some(body)) => self
                .with_query(agent.delete(&self.url))
                .force_send_body()
                .send_json(body),
            (Method::Post, body) => self
                .with_query(agent.post(&self.url))
                .send_json(body.as_ref().unwrap_or(&Value::Null)),
            (Method::Patch, body) => self
                .with_query(agent.patch(&self.url))
                .send_json(body.as_ref().unwrap_or(&Value::Null)),
        }
    }

    fn with_query<B>(&self, mut builder: RequestBuilder<B>) -> RequestBuilder<B> {
        for (key, value) in &self.query {
            builder = builder.query(*key, value);
        }
        builder
    }
}

fn encode_locally(query: &Query) -> Result<QueryToken, ReportFailure> {
    query.to_token().map_err(ReportFailure::Query)
}

fn decode_json<T: DeserializeOwned>(
    request: &Request,
    mut response: Response<Body>,
) -> Result<T, ReportFailure> {
    response
        .body_mut()
        .read_json()
        .map_err(|error| ReportFailure::Decode {
            method: request.method.as_str(),
            url: request.url.clone(),
            error,
        })
}

fn delete_outcome(response: &Response<Body>) -> DeleteOutcome {
    if response.status().as_u16() == NOT_MODIFIED {
        DeleteOutcome::NothingMatched
    } else {
        DeleteOutcome::Applied
    }
}

/// Extracts the error message from a rejected response.
///
/// The service reports errors as `{"error": "..."}`. Any other non-empty body is returned as is.
fn error_message(response: &mut Response<Body>) -> Option<String> {
    let text = response.body_mut().read_to_string().ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => match map.remove("error") {
            Some(Value::String(message)) => Some(message),
            _ => Some(text.to_owned()),
        },
        _ => Some(text.to_owned()),
    }
}
