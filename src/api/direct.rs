//! Synchronous generate-and-link endpoint for hosts that register it in
//! their own router instead of polling a ComfyUI-shaped API.
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::handlers;
use crate::api::routes::AppState;
use crate::error::AppResult;
use crate::prompt::extractor::ExtractError;

pub const DEFAULT_DIRECT_PATH: &str = "/api/modelscope/generate";

#[derive(Debug, Deserialize)]
pub struct DirectRequest {
    #[serde(default)]
    pub prompt: String,
}

/// Router holding only the direct endpoint, ready to be merged into a host app.
pub fn direct_routes(path: &str) -> Router<Arc<AppState>> {
    Router::new().route(path, post(generate_direct).fallback(handlers::liveness))
}

/// `POST {prompt}` → `{imageUrl}` once the image is on disk.
pub async fn generate_direct(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let request: DirectRequest = serde_json::from_slice(&body)?;
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ExtractError::NoPrompt.into());
    }

    tracing::info!("Direct generation request: {}", prompt);
    let filename = state.runner.run_now(prompt).await?;
    Ok(Json(json!({ "imageUrl": image_url(&state.public_base_url, &filename) })))
}

/// Link to `/view` with a timestamp so browsers never show a cached image.
pub fn image_url(base: &str, filename: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}/view?filename={}&t={}", base.trim_end_matches('/'), filename, millis)
}
