use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::middleware::SecurityConfig;
use crate::codec::Format;
use crate::store::{storage_key, DocumentInfo, LocalStorage, PayloadKind, SqliteStore, StorageError};

type HandlerError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Log a storage error and return a sanitized response to the client.
/// Invalid ids are the caller's fault and are reported as such.
fn storage_error(e: StorageError) -> HandlerError {
    if let StorageError::InvalidId(id) = &e {
        tracing::warn!("Rejected storage id {:?}", id);
        return (StatusCode::BAD_REQUEST, e.to_string());
    }

    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    format: Option<String>,
}

impl FormatQuery {
    fn format(&self) -> Result<Format, HandlerError> {
        match &self.format {
            Some(name) => name.parse().map_err(|e| (StatusCode::BAD_REQUEST, e)),
            None => Ok(Format::default()),
        }
    }
}

fn payload_kind(kind: &str) -> Result<PayloadKind, HandlerError> {
    kind.parse().map_err(|e| (StatusCode::NOT_FOUND, e))
}

// ============================================================
// Health & Login
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(security): State<SecurityConfig>,
    Json(input): Json<LoginInput>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    match security.login(&input.username, &input.password) {
        Some(token) => {
            tracing::info!("Issued token for {}", input.username);
            Ok(Json(serde_json::json!({ "token": token })))
        }
        None => {
            tracing::warn!("Rejected login for {}", input.username);
            Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))
        }
    }
}

// ============================================================
// Model payloads
// ============================================================

pub async fn list_documents(
    State(store): State<SqliteStore>,
) -> Result<Json<Vec<DocumentInfo>>, HandlerError> {
    store.list("").map(Json).map_err(storage_error)
}

pub async fn list_model_documents(
    State(store): State<SqliteStore>,
    Path(purpose): Path<String>,
) -> Result<Json<Vec<DocumentInfo>>, HandlerError> {
    store
        .list(&format!("{}.", purpose))
        .map(Json)
        .map_err(storage_error)
}

pub async fn get_payload(
    State(store): State<SqliteStore>,
    Path((purpose, kind)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, HandlerError> {
    let kind = payload_kind(&kind)?;
    let format = query.format()?;

    store
        .load(&storage_key(&purpose, kind, format))
        .map_err(storage_error)?
        .map(|payload| ([(header::CONTENT_TYPE, format.content_type())], payload).into_response())
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("No {} {} payload for {}", format, kind.as_str(), purpose),
        ))
}

/// Store a payload after checking that it parses in the declared format.
pub async fn put_payload(
    State(store): State<SqliteStore>,
    Path((purpose, kind)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
    body: Bytes,
) -> Result<StatusCode, HandlerError> {
    let kind = payload_kind(&kind)?;
    let format = query.format()?;

    let codec = format.codec();
    let parsed = match kind {
        PayloadKind::Structure => codec.read_structure(&body).map(|records| records.len()),
        PayloadKind::Data => codec.read_data(&body).map(|records| records.len()),
    };
    let records = parsed.map_err(|e| {
        tracing::warn!("Rejected {} payload for {}: {}", format, purpose, e);
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid {} payload: {}", format, e),
        )
    })?;

    store
        .save(&storage_key(&purpose, kind, format), &body)
        .map_err(storage_error)?;
    tracing::debug!("Stored {} {} records for {}", records, kind.as_str(), purpose);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_payload(
    State(store): State<SqliteStore>,
    Path((purpose, kind)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
) -> Result<StatusCode, HandlerError> {
    let kind = payload_kind(&kind)?;
    let format = query.format()?;

    if store
        .delete(&storage_key(&purpose, kind, format))
        .map_err(storage_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("No {} {} payload for {}", format, kind.as_str(), purpose),
        ))
    }
}
