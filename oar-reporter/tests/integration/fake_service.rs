// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory stand-in for the oar service.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query as QueryParams, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{patch, post},
};
use oar_metadata::{Query, Record};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::runtime::Runtime;

#[derive(Debug, Default)]
struct ServiceState {
    next_id: u64,
    records: BTreeMap<u64, Record>,
    injected: VecDeque<StatusCode>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<ServiceState>>;

/// A running fake service. The service stops when this is dropped.
pub struct FakeService {
    _runtime: Runtime,
    state: Shared,
    addr: SocketAddr,
}

impl FakeService {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let state = Shared::default();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(state.clone());
        runtime.spawn(async move { axum::serve(listener, app).await });
        Self {
            _runtime: runtime,
            state,
            addr,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Makes the next requests fail with the given statuses, in order.
    pub fn inject_failures(&self, statuses: impl IntoIterator<Item = u16>) {
        let mut state = self.state.lock().unwrap();
        state.injected.extend(
            statuses
                .into_iter()
                .map(|status| StatusCode::from_u16(status).unwrap()),
        );
    }

    /// Returns `METHOD /path?query` for every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn record(&self, id: u64) -> Option<Record> {
        self.state.lock().unwrap().records.get(&id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

/// Returns the base URL of a port nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn app(state: Shared) -> Router {
    Router::new()
        .route("/test", post(create).patch(enrich))
        .route("/tests", patch(enrich_by_query).get(list).delete(delete))
        .route("/query", post(encode_query))
        .layer(middleware::from_fn_with_state(state.clone(), inject))
        .with_state(state)
}

async fn inject(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let injected = {
        let mut state = state.lock().unwrap();
        state
            .requests
            .push(format!("{} {}", request.method(), request.uri()));
        state.injected.pop_front()
    };
    match injected {
        Some(status) => error(status, "injected failure"),
        None => next.run(request).await,
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
struct QueryParam {
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    query: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: Option<usize>,
}

fn parse_query(token: Option<&str>) -> Result<Query, Response> {
    match token {
        Some(token) => Query::from_token(token)
            .map_err(|_| error(StatusCode::BAD_REQUEST, "invalid query token")),
        None => Ok(Query::new()),
    }
}

/// Matches on ids, summaries (exact) and outcomes, which is all the tests need.
fn matches(query: &Query, record: &Record) -> bool {
    query.ids.as_ref().is_none_or(|ids| ids.contains(&record.id))
        && query.summaries.as_ref().is_none_or(|summaries| {
            record
                .summary
                .as_ref()
                .is_some_and(|summary| summaries.contains(summary))
        })
        && query.outcomes.as_ref().is_none_or(|outcomes| {
            record
                .outcome
                .is_some_and(|outcome| outcomes.contains(&outcome))
        })
}

fn merge(target: &mut Record, update: Record) {
    let mut body = target.as_request_body();
    for (key, value) in update.as_request_body() {
        if key != "id" {
            body.insert(key, value);
        }
    }
    if let Ok(merged) = Record::from_map(body) {
        *target = merged;
    }
}

async fn create(State(state): State<Shared>, body: Bytes) -> Response {
    let mut record: Record = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(_) => return error(StatusCode::BAD_REQUEST, "invalid record"),
    };
    if let Err(e) = record.check_verdict() {
        return error(StatusCode::BAD_REQUEST, &e.to_string());
    }

    let mut state = state.lock().unwrap();
    state.next_id += 1;
    let id = state.next_id;
    record.set_id(id);
    state.records.insert(id, record);
    (StatusCode::CREATED, Json(id)).into_response()
}

async fn enrich(State(state): State<Shared>, body: Bytes) -> Response {
    let update: Record = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(_) => return error(StatusCode::BAD_REQUEST, "invalid record"),
    };
    let mut state = state.lock().unwrap();
    match state.records.get_mut(&update.id) {
        Some(record) => {
            merge(record, update);
            StatusCode::OK.into_response()
        }
        None => error(StatusCode::NOT_FOUND, "no such record"),
    }
}

async fn enrich_by_query(
    State(state): State<Shared>,
    QueryParams(params): QueryParams<QueryParam>,
    body: Bytes,
) -> Response {
    let query = match parse_query(params.query.as_deref()) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let update: Record = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(_) => return error(StatusCode::BAD_REQUEST, "invalid record"),
    };
    let mut state = state.lock().unwrap();
    for record in state.records.values_mut() {
        if matches(&query, record) {
            merge(record, update.clone());
        }
    }
    StatusCode::OK.into_response()
}

async fn list(
    State(state): State<Shared>,
    QueryParams(params): QueryParams<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(250);
    if limit > 1000 {
        return error(StatusCode::BAD_REQUEST, "limit must be at most 1000");
    }
    let query = match parse_query(params.query.as_deref()) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let state = state.lock().unwrap();
    let matching: Vec<&Record> = state
        .records
        .values()
        .filter(|record| matches(&query, record))
        .collect();
    let tests: Vec<&Record> = matching
        .iter()
        .copied()
        .skip(params.offset)
        .take(limit)
        .collect();
    Json(json!({ "count": matching.len(), "tests": tests })).into_response()
}

async fn delete(
    State(state): State<Shared>,
    QueryParams(params): QueryParams<QueryParam>,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    let before = state.records.len();
    if params.query.is_some() {
        let query = match parse_query(params.query.as_deref()) {
            Ok(query) => query,
            Err(response) => return response,
        };
        state.records.retain(|_, record| !matches(&query, record));
    } else {
        let ids: Vec<Value> = match serde_json::from_slice(&body) {
            Ok(ids) => ids,
            Err(_) => return error(StatusCode::BAD_REQUEST, "invalid id list"),
        };
        for id in ids.iter().filter_map(|entry| entry.get("ID")?.as_u64()) {
            state.records.remove(&id);
        }
    }

    if state.records.len() < before {
        StatusCode::OK.into_response()
    } else {
        StatusCode::NOT_MODIFIED.into_response()
    }
}

async fn encode_query(body: Bytes) -> Response {
    match serde_json::from_slice::<Query>(&body) {
        Ok(query) => match query.to_token() {
            Ok(token) => Json(token).into_response(),
            Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        },
        Err(_) => error(StatusCode::BAD_REQUEST, "invalid query"),
    }
}
