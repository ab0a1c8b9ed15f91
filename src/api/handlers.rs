//! Axum handlers speaking the ComfyUI protocol subset the host frontend uses.
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::routes::AppState;
use crate::error::{AppError, AppResult};
use crate::jobs::JobState;
use crate::prompt::extractor::{extract_positive_prompt, ExtractError};
use crate::storage::LATEST_IMAGE_FILENAME;

pub const LIVENESS_MESSAGE: &str = "ComfyUI cloud proxy is running.";

/// `POST /prompt`: accept a workflow, answer with its id, generate in the background.
pub async fn submit_prompt(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body)?;
    let workflow = payload.get("prompt").ok_or(ExtractError::NoPrompt)?;
    let prompt = extract_positive_prompt(workflow)?;

    let prompt_id = payload
        .get("prompt_id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::info!("Intercepted /prompt, id: {}, prompt: {}", prompt_id, prompt);
    let record = state.runner.submit(prompt_id, prompt).await;

    Ok(Json(json!({
        "prompt_id": record.id,
        "number": record.number,
        "node_errors": {}
    })))
}

/// `GET /history/{id}`: `{id: record}`, with `{}` while the job is unknown or running.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(prompt_id): Path<String>,
) -> Json<Value> {
    let entry = state
        .runner
        .jobs()
        .get(&prompt_id)
        .await
        .map(|rec| rec.history_entry())
        .unwrap_or_else(|| json!({}));
    let mut body = Map::new();
    body.insert(prompt_id, entry);
    Json(Value::Object(body))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub max_items: Option<usize>,
}

/// `GET /history`: every finished job, newest last; `max_items` keeps the newest N.
pub async fn history_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Value> {
    let finished: Vec<_> = state
        .runner
        .jobs()
        .list()
        .await
        .into_iter()
        .filter(|rec| rec.state.is_terminal())
        .collect();
    let skip = params
        .max_items
        .map(|max| finished.len().saturating_sub(max))
        .unwrap_or(0);

    let mut body = Map::new();
    for rec in finished.into_iter().skip(skip) {
        body.insert(rec.id.clone(), rec.history_entry());
    }
    Json(Value::Object(body))
}

/// `GET /queue`: pending jobs in ComfyUI's `[number, prompt_id, prompt, extra, outputs]` shape.
pub async fn queue(State(state): State<Arc<AppState>>) -> Json<Value> {
    let running: Vec<Value> = state
        .runner
        .jobs()
        .list()
        .await
        .into_iter()
        .filter(|rec| rec.state == JobState::Pending)
        .map(|rec| json!([rec.number, rec.id, {}, {}, []]))
        .collect();
    Json(json!({ "queue_running": running, "queue_pending": [] }))
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    pub filename: Option<String>,
}

/// `GET /view`: PNG bytes of a stored image, the latest one by default.
pub async fn view_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse, AppError> {
    let filename = params
        .filename
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| LATEST_IMAGE_FILENAME.to_string());
    let bytes = state.runner.generator().store().read(&filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    ))
}

/// `/ws`: acknowledge the frontend's socket probe without opening a socket.
pub async fn ws_probe() -> StatusCode {
    StatusCode::SWITCHING_PROTOCOLS
}

pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok", "message": LIVENESS_MESSAGE }))
}
