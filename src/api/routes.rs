//! Shared application state and router assembly.
use axum::routing::{any, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::{direct, handlers};
use crate::cloud::{CloudImageClient, ImageGenerator};
use crate::config::Config;
use crate::error::AppResult;
use crate::jobs::{InMemoryJobStore, JobRunner, JobStore};
use crate::pipeline::Generator;
use crate::storage::ImageStore;

pub struct AppState {
    pub runner: JobRunner,
    /// Origin used when handing out image links, e.g. `http://127.0.0.1:18188`.
    pub public_base_url: String,
}

impl AppState {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = CloudImageClient::new(config)?;
        Ok(Self::with_generator(Arc::new(client), config))
    }

    /// Wire the pipeline around any image source.
    pub fn with_generator(images: Arc<dyn ImageGenerator>, config: &Config) -> Self {
        let store = ImageStore::new(config.output_dir.clone());
        let generator = Arc::new(Generator::new(images, store, config.output_mode));
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(config.job_capacity, config.job_ttl));
        AppState {
            runner: JobRunner::new(generator, jobs, config.generation_permits()),
            public_base_url: config.public_base_url.clone(),
        }
    }
}

/// Routes imitating a ComfyUI backend. A known path hit with another method
/// gets the liveness reply, like an unknown path would.
pub fn comfy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prompt", post(handlers::submit_prompt).fallback(handlers::liveness))
        .route("/history", get(handlers::history_all).fallback(handlers::liveness))
        .route("/history/:prompt_id", get(handlers::history).fallback(handlers::liveness))
        .route("/queue", get(handlers::queue).fallback(handlers::liveness))
        .route("/view", get(handlers::view_image).fallback(handlers::liveness))
        .route("/ws", any(handlers::ws_probe))
}

/// The full proxy: ComfyUI routes, the direct endpoint, and the liveness fallback.
pub fn app(state: Arc<AppState>) -> Router {
    comfy_routes()
        .merge(direct::direct_routes(direct::DEFAULT_DIRECT_PATH))
        .fallback(handlers::liveness)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
