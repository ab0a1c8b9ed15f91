#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use comfyui_cloud_proxy::cloud::ImageGenerator;
use comfyui_cloud_proxy::error::{AppError, AppResult};
use comfyui_cloud_proxy::Config;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;

pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

/// Image source returning fixed bytes, or failing, after an optional delay.
pub struct StubImages {
    pub result: Result<Vec<u8>, String>,
    pub delay: Duration,
}

impl StubImages {
    pub fn ok(bytes: &[u8]) -> Self {
        StubImages { result: Ok(bytes.to_vec()), delay: Duration::ZERO }
    }

    pub fn failing(message: &str) -> Self {
        StubImages { result: Err(message.to_string()), delay: Duration::ZERO }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ImageGenerator for StubImages {
    async fn generate(&self, _prompt: &str) -> AppResult<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        match &self.result {
            Ok(bytes) => Ok(bytes.clone()),
            Err(msg) => Err(AppError::Upstream { status: 500, body: msg.clone() }),
        }
    }
}

pub fn test_config(output_dir: &Path, extra: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert("OUTPUT_DIR".into(), output_dir.to_string_lossy().into_owned());
    map.insert("CLOUD_API_KEY".into(), "test-key".into());
    for (k, v) in extra {
        map.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|k| map.get(k).cloned()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, bytes.to_vec())
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn post_raw(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    let value = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, value)
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_raw(app, uri, &body.to_string()).await
}

/// Poll `/history/<id>` until it carries a status, as the host frontend does.
pub async fn poll_history(app: &Router, id: &str) -> Value {
    for _ in 0..300 {
        let (status, body) = get_json(app, &format!("/history/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        let entry = body[id].clone();
        if entry.get("status").is_some() {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", id);
}
