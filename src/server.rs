//! HTTP server: IP-phone directory and JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/directory` | Root menu (`CiscoIPPhoneMenu`) |
//! | `GET`  | `/directory/groups/{key}` | Contacts in one keypad group |
//! | `GET`  | `/directory/contacts/{id}` | Numbers of one contact (`CiscoIPPhoneDirectory`) |
//! | `GET`  | `/api/search?q=&limit=` | Ranked contact search |
//! | `POST` | `/api/sync` | Run a sync (`{"mode": "auto" \| "full" \| "incremental"}`) |
//! | `GET`  | `/api/sync/status` | Sync phase, last error, contact totals |
//! | `GET`  | `/api/contacts/{id}` | Full contact with phones and emails |
//!
//! # Error Contract
//!
//! JSON endpoints answer errors with:
//!
//! ```json
//! { "error": { "code": "invalid_query", "message": "invalid query: query must be at least 2 characters" } }
//! ```
//!
//! Codes: `bad_request` / `invalid_query` (400), `not_found` (404),
//! `sync_in_progress` (409), `auth` / `retries_exhausted` /
//! `malformed_response` / `token_expired` (502), `store` / `internal` (500).
//!
//! Directory endpoints always answer with phone XML: store failures degrade
//! to an empty menu, and unknown contacts or groups get a 404
//! `CiscoIPPhoneText` screen.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use contact_mirror_core::error::{QueryError, SyncError};
use contact_mirror_core::keypad::GroupKey;
use contact_mirror_core::models::SyncMode;
use contact_mirror_core::store::ContactStore;

use crate::config::Config;
use crate::db;
use crate::directory::{self, ContactXml};
use crate::get::{get_contact, ContactResponse};
use crate::migrate;
use crate::search::{search_contacts, SearchResponse};
use crate::sqlite_store::SqliteStore;
use crate::status::{load_status, StatusResponse};
use crate::sync::{build_engine, spawn_polling, SyncEngine, SyncReport};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    engine: Arc<SyncEngine>,
    /// Public base URL for directory links.
    base_url: Arc<str>,
}

impl AppState {
    fn store(&self) -> &dyn ContactStore {
        self.engine.store().as_ref()
    }
}

/// Start the server with the SQLite store and the People-API source.
///
/// Runs migrations, recovers an interrupted sync, starts polling when
/// `sync.interval_secs` is set, then serves until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let engine = build_engine(config, Arc::new(SqliteStore::new(pool)))?;
    run_server_with_engine(config, Arc::new(engine)).await
}

/// Start the server around an already-wired engine. Tests use this with
/// in-memory collaborators.
pub async fn run_server_with_engine(config: &Config, engine: Arc<SyncEngine>) -> anyhow::Result<()> {
    engine.recover_interrupted().await?;

    if let Some(secs) = config.sync.interval_secs {
        info!(interval_secs = secs, "background polling enabled");
        spawn_polling(engine.clone(), Duration::from_secs(secs));
    }

    let bind_addr = config.server.bind.clone();
    let app = build_router(config, engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "contact mirror listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Router with every endpoint and permissive CORS.
pub fn build_router(config: &Config, engine: Arc<SyncEngine>) -> Router {
    let state = AppState {
        base_url: Arc::from(config.server.base_url()),
        config: Arc::new(config.clone()),
        engine,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/directory", get(handle_directory_root))
        .route("/directory/groups/{key}", get(handle_directory_group))
        .route("/directory/contacts/{id}", get(handle_directory_contact))
        .route("/api/search", get(handle_search))
        .route("/api/sync", post(handle_sync))
        .route("/api/sync/status", get(handle_sync_status))
        .route("/api/contacts/{id}", get(handle_get_contact))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "query failed");
        }
        AppError::new(status, err.code(), err.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let status = match err {
            SyncError::InProgress => StatusCode::CONFLICT,
            SyncError::Auth(_)
            | SyncError::RetriesExhausted { .. }
            | SyncError::Malformed(_)
            | SyncError::TokenExpired => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.code(), err.to_string())
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
}

fn xml_response(status: StatusCode, xml: String) -> Response {
    (status, [(header::CONTENT_TYPE, directory::CONTENT_TYPE)], xml).into_response()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Directory ============

async fn handle_directory_root(State(state): State<AppState>) -> Result<Response, AppError> {
    let xml = directory::root_xml(&state.config.directory.options(), &state.base_url)
        .map_err(internal)?;
    Ok(xml_response(StatusCode::OK, xml))
}

async fn handle_directory_group(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let key: GroupKey = match key.parse() {
        Ok(k) => k,
        Err(_) => {
            let xml = directory::render_text("Not found", &format!("Unknown group: {}", key))
                .map_err(internal)?;
            return Ok(xml_response(StatusCode::NOT_FOUND, xml));
        }
    };
    let xml = directory::group_xml(
        state.store(),
        key,
        &state.config.directory.options(),
        &state.base_url,
    )
    .await
    .map_err(internal)?;
    Ok(xml_response(StatusCode::OK, xml))
}

async fn handle_directory_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match directory::contact_xml(state.store(), &id, &state.base_url)
        .await
        .map_err(internal)?
    {
        ContactXml::Found(xml) => Ok(xml_response(StatusCode::OK, xml)),
        ContactXml::NotFound(xml) => Ok(xml_response(StatusCode::NOT_FOUND, xml)),
    }
}

// ============ GET /api/search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let response =
        search_contacts(state.store(), &state.config.search, &params.q, params.limit).await?;
    Ok(Json(response))
}

// ============ POST /api/sync ============

#[derive(Deserialize, Default)]
struct SyncRequest {
    #[serde(default)]
    mode: SyncMode,
}

/// Runs the sync inline and answers with its report. An empty body means
/// `auto`.
async fn handle_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncReport>, AppError> {
    let request: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError::new(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("invalid sync request: {}", e),
            )
        })?
    };

    let report = state.engine.run_sync(request.mode).await?;
    Ok(Json(report))
}

// ============ GET /api/sync/status ============

async fn handle_sync_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = load_status(state.store()).await.map_err(internal)?;
    Ok(Json(status))
}

// ============ GET /api/contacts/{id} ============

async fn handle_get_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContactResponse>, AppError> {
    let contact = get_contact(state.store(), &id).await?;
    Ok(Json(contact))
}
