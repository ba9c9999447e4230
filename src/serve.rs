//! Purpose: Provide the loopback HTTP dev server hosting an in-memory store.
//! Exports: `ServeConfig`, `SeedFile`, `serve`.
//! Role: Axum-based stand-in for a hosted executor, so clients can be
//!       exercised end-to-end without a live tenant.
//! Invariants: One RPC endpoint (`/v0/exec`) speaking the wire protocol;
//!             GET carries query params, POST a JSON body.
//! Invariants: Each request is one host invocation: the usage allowance is
//!             restored before dispatch.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use caravel::api::{Error, ErrorKind, FieldMap, MemoryStore, SearchCriteria};
use caravel::core::wire::{
    status_for_kind, AccessMethod, ErrorEnvelope, WireRequest,
};
use caravel::host::dispatch;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub token: Option<String>,
    pub allow_non_loopback: bool,
    pub page_cap: usize,
    pub budget: Option<u64>,
    pub seed: Option<PathBuf>,
}

struct AppState {
    store: Mutex<MemoryStore>,
    token: Option<String>,
}

/// Seed file layout: records per type, saved searches, mandatory fields.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub records: BTreeMap<String, Vec<FieldMap>>,
    #[serde(default)]
    pub saved_searches: BTreeMap<String, SearchCriteria>,
    #[serde(default)]
    pub mandatory_fields: BTreeMap<String, Vec<String>>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let mut store = MemoryStore::new().with_page_cap(config.page_cap);
    if let Some(budget) = config.budget {
        store = store.with_budget(budget);
    }
    if let Some(path) = &config.seed {
        apply_seed(&mut store, path)?;
    }

    let state = Arc::new(AppState {
        store: Mutex::new(store),
        token: config.token,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/exec", get(exec_get).post(exec_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "dev server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("server failed")
                .with_source(err)
        })
}

fn apply_seed(store: &mut MemoryStore, path: &PathBuf) -> Result<(), Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read seed file")
            .with_source(err)
    })?;
    let seed: SeedFile = serde_json::from_str(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid seed file json")
            .with_source(err)
    })?;
    for (record_type, rows) in seed.records {
        for fields in rows {
            store.seed(&record_type, fields);
        }
    }
    for (search_id, criteria) in seed.saved_searches {
        store.register_saved_search(search_id, criteria);
    }
    for (record_type, fields) in seed.mandatory_fields {
        let names: Vec<&str> = fields.iter().map(String::as_str).collect();
        store.require_fields(&record_type, &names);
    }
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }
    if config.page_cap == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--page-cap must be greater than zero")
            .with_hint("Use a positive value like 1000."));
    }
    if config.budget == Some(0) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--budget must be greater than zero")
            .with_hint("Omit the flag for an unmetered store."));
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(Error::new(ErrorKind::Permission).with_message("missing bearer token"));
    };
    let value = value.to_str().unwrap_or_default();
    let expected = format!("Bearer {token}");
    if value != expected {
        return Err(Error::new(ErrorKind::Permission).with_message("invalid bearer token"));
    }
    Ok(())
}

fn lock_store(state: &AppState) -> MutexGuard<'_, MemoryStore> {
    state
        .store
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn exec_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let request = match WireRequest::from_query_pairs(
        params.iter().map(|(key, value)| (key.as_str(), value.as_str())),
    ) {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };
    run_invocation(&state, AccessMethod::Get, &request)
}

async fn exec_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let request: WireRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                Error::new(ErrorKind::Usage)
                    .with_message("invalid request json")
                    .with_source(err),
            );
        }
    };
    run_invocation(&state, AccessMethod::Post, &request)
}

fn run_invocation(state: &AppState, method: AccessMethod, request: &WireRequest) -> Response {
    let mut store = lock_store(state);
    // One request == one host invocation: fresh usage allowance.
    store.reset_usage();
    match dispatch::dispatch(&mut *store, method, request) {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(value) => Json(value).into_response(),
            Err(err) => error_response(
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode response json")
                    .with_source(err),
            ),
        },
        Err(err) => error_response(err),
    }
}

fn error_response(err: Error) -> Response {
    let status = StatusCode::from_u16(status_for_kind(err.kind()))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorEnvelope::from_error(&err);
    (status, Json(body)).into_response()
}
