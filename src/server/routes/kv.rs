//! Key-value operation handlers.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, instrument};

use crate::error::KvError;
use crate::value::{Value, canonicalize};

use super::super::{error::ApiError, state::AppState};

/// Body of `POST /kv`.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub key: String,
    pub value: Value,
}

/// Body of `PUT /kv/{id}`. A `key` field, if sent, is ignored.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub value: Value,
}

/// Body of a successful `GET /kv/{id}`.
#[derive(Debug, Serialize)]
pub struct ValueResponse {
    pub value: Value,
}

/// Decode a fully buffered JSON body.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, KvError> {
    serde_json::from_slice(body).map_err(|e| KvError::MalformedRequest(e.to_string()))
}

/// Add a new record.
#[instrument(skip(state, body), fields(body_len = body.len()))]
pub async fn add_value(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let AddRequest { key, value } = parse_body(&body)?;
    debug!(key = %key, "adding value");

    state.repository().add(&key, value).await?;

    info!(key = %key, "value added");
    Ok(StatusCode::CREATED)
}

/// Get a value.
#[instrument(skip(state), fields(key = %key))]
pub async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ValueResponse>, ApiError> {
    debug!("getting value");

    let raw = state.repository().get(&key).await?;
    let value = canonicalize(raw).map_err(KvError::from)?;

    info!("retrieved value");
    Ok(Json(ValueResponse { value }))
}

/// Replace the value of an existing record.
#[instrument(skip(state, body), fields(key = %key, body_len = body.len()))]
pub async fn update_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let UpdateRequest { value } = parse_body(&body)?;
    debug!("updating value");

    state.repository().update(&key, value).await?;

    info!("value updated");
    Ok(StatusCode::OK)
}

/// Delete a record.
#[instrument(skip(state), fields(key = %key))]
pub async fn delete_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    debug!("deleting value");

    state.repository().delete(&key).await?;

    info!("value deleted");
    Ok(StatusCode::NO_CONTENT)
}
