//! Thin HTTP client for ComfyUI-protocol servers (this proxy included).
//!
//! - `queue_prompt` posts a `{"prompt": graph}` body to `/prompt`.
//! - `get_history` fetches `/history` or `/history/<id>` as JSON.
//! - `get_image` downloads `/view`, optionally for a given filename.
//! - `wait_for_history` polls until a job reports a terminal status.
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client: Client::new(), base_url: base }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a prompt.
    ///
    /// Expects a JSON document compatible with ComfyUI's `/prompt` endpoint.
    /// Returns the server's JSON reply (carrying `prompt_id`) on success.
    pub async fn queue_prompt(&self, body: Value) -> AppResult<Value> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to {}", url);
        tracing::debug!("Prompt payload: {:?}", body);

        let response = self.client.post(&url).json(&body).send().await?;
        expect_json(response, "queue prompt").await
    }

    /// Whole history, or the `{id: record}` map for one job.
    pub async fn get_history(&self, prompt_id: Option<&str>) -> AppResult<Value> {
        let url = match prompt_id {
            Some(id) => format!("{}/history/{}", self.base_url, id),
            None => format!("{}/history", self.base_url),
        };
        let response = self.client.get(&url).send().await?;
        expect_json(response, "get history").await
    }

    /// Fetch image bytes via `/view`; `None` asks for the server's default image.
    pub async fn get_image(&self, filename: Option<&str>) -> AppResult<Vec<u8>> {
        let url = format!("{}/view", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(name) = filename {
            request = request.query(&[("filename", name), ("type", "output")]);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.bytes().await?.to_vec())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::Upstream { status: status.as_u16(), body })
        }
    }

    /// Call the direct endpoint and return the image link it hands out.
    pub async fn generate_direct(&self, path: &str, prompt: &str) -> AppResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(&json!({ "prompt": prompt })).send().await?;
        let body = expect_json(response, "generate").await?;
        body.get("imageUrl")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| AppError::MalformedUpstream(format!("no imageUrl in {}", body)))
    }

    /// Poll `/history/<id>` until the entry has a terminal status, then return it.
    pub async fn wait_for_history(&self, prompt_id: &str, interval: Duration, timeout: Duration) -> AppResult<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let history = self.get_history(Some(prompt_id)).await?;
            let entry = history.get(prompt_id).cloned().unwrap_or_else(|| json!({}));
            if entry.get("status").and_then(|s| s.get("status_str")).is_some() {
                return Ok(entry);
            }
            if tokio::time::Instant::now() + interval > deadline {
                return Err(AppError::Timeout(format!(
                    "prompt {} did not finish within {:?}",
                    prompt_id, timeout
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

async fn expect_json(response: reqwest::Response, what: &str) -> AppResult<Value> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        let body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
        tracing::error!("Failed to {}. Status: {}, Body: {}", what, status, body);
        Err(AppError::Upstream { status: status.as_u16(), body })
    }
}

/// Output filenames listed in a single `/history` entry.
pub fn output_filenames(entry: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(outputs) = entry.get("outputs").and_then(|o| o.as_object()) {
        for node in outputs.values() {
            if let Some(images) = node.get("images").and_then(|i| i.as_array()) {
                out.extend(
                    images
                        .iter()
                        .filter_map(|img| img.get("filename").and_then(|f| f.as_str()))
                        .map(String::from),
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_filenames_reads_all_nodes() {
        let entry = json!({
            "status": {"status_str": "success", "completed": true},
            "outputs": {
                "9": {"images": [{"filename": "a.png"}, {"filename": "b.png"}]},
                "12": {"images": [{"filename": "c.png"}]}
            }
        });
        let mut names = output_filenames(&entry);
        names.sort();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
        assert!(output_filenames(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn wait_for_history_times_out_on_pending_entry() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"slow": {}})))
            .mount(&server)
            .await;

        let client = ComfyUIClient::new(server.uri());
        let err = client
            .wait_for_history("slow", Duration::from_millis(10), Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            AppError::Timeout(message) => assert!(message.contains("slow"), "{}", message),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
