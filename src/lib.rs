//! ComfyUI cloud proxy library
//!
//! Impersonates a local ComfyUI backend and fulfils its jobs with a cloud
//! image-generation API.
//!
//! Modules:
//! - `api`: Axum handlers and router (ComfyUI routes plus the direct endpoint).
//! - `cloud`: Client for the remote image-generation API.
//! - `comfyui`: Client for ComfyUI-protocol servers, used by `proxyctl`.
//! - `jobs`: Job records, the job store and the background runner.
//! - `pipeline`: Prompt to image-on-disk generation.
//! - `prompt`: Workflow graph prompt extraction and editing.
//! - `storage`: Atomic on-disk image storage.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `AppState`,
//! `CloudImageClient`, `ComfyUIClient` and `JobRunner`.
pub mod api;
pub mod cloud;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod prompt;
pub mod storage;

pub use api::AppState;
pub use cloud::CloudImageClient;
pub use comfyui::client::ComfyUIClient;
pub use config::Config;
pub use jobs::JobRunner;
