//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path/body parameters via axum extractors,
//! interacts with AppState services, and returns JSON responses. Pipeline
//! failures (translation, execution) are NOT HTTP errors; they come back
//! as chat turns with a failed outcome.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tabletalk_core::error::TabletalkError;
use tabletalk_core::types::{HistoryEntry, Schema, SessionSummary};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter and request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Original filename; the extension selects the ingestion path.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Return only the newest N entries.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub name: String,
    pub schema: Schema,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - liveness and basic stats.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.store.len(),
    })
}

/// GET /ui - the embedded chat page.
pub async fn ui() -> impl IntoResponse {
    Html(tabletalk_ui::CHAT_HTML)
}

/// POST /sessions?name=file.csv - upload a data file and start a session.
///
/// The raw request body is the file content. Responds 201 with the session
/// id and the initial schema.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest("Parameter 'name' is required for upload".to_string())
        })?;

    let limit = state.config.limits.max_upload_bytes;
    if body.len() > limit {
        return Err(TabletalkError::PayloadTooLarge {
            size: body.len(),
            limit,
        }
        .into());
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Upload body is empty".to_string()));
    }

    let session = state.store.start(&name, &body)?;
    let schema = session.schema()?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            session_id: session.id,
            name: session.name.clone(),
            schema,
        }),
    ))
}

/// GET /sessions - summaries of live sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.store.list(),
    })
}

/// DELETE /sessions/{id} - drop a session and delete its data file.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.store.remove(id)?;
    Ok(Json(DeletedResponse { success: true }))
}

/// POST /sessions/{id}/messages - run one chat turn.
///
/// Returns the recorded history entry: the generated SQL plus a table,
/// an affected-row count, or a failure message.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<HistoryEntry>, ApiError> {
    let entry = state.orchestrator.handle_message(id, &request.text).await?;
    Ok(Json(entry))
}

/// GET /sessions/{id}/schema - current schema for the sidebar.
pub async fn get_schema(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Schema>, ApiError> {
    let session = state.store.get(id)?;
    Ok(Json(session.schema()?))
}

/// GET /sessions/{id}/history - ordered operation history.
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = state.store.get(id)?;
    let (_, mut entries) = session.snapshot()?;
    let total = entries.len();
    if let Some(limit) = params.limit {
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
    }
    Ok(Json(HistoryResponse { entries, total }))
}

/// GET /sessions/{id}/download - current database bytes as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.get(id)?;
    let bytes = session.db().serialize()?;

    let stem = std::path::Path::new(&session.name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database");
    let filename = format!(
        "tabletalk-{}.db",
        tabletalk_store::ingest::sanitize_identifier(stem)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-sqlite3".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}
