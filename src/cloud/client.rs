//! Thin HTTP client for the cloud image-generation API.
//!
//! - `generate` posts `{model, prompt}` to the configured endpoint, reads the
//!   first `images[].url` from the reply and downloads those bytes.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Anything that can turn a prompt into image bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<Vec<u8>>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

#[derive(Clone)]
pub struct CloudImageClient {
    client: Client,
    api_url: String,
    api_key: String,
    model_id: String,
}

impl CloudImageClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(AppError::HttpClient)?;
        Ok(CloudImageClient {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
        })
    }

    fn authorization(&self) -> String {
        let key = match self.api_key.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => &self.api_key[7..],
            _ => self.api_key.as_str(),
        };
        format!("Bearer {}", key.trim_start())
    }

    /// Submit the prompt and return the URL of the first generated image.
    pub async fn request_image_url(&self, prompt: &str) -> AppResult<String> {
        let preview: String = prompt.chars().take(80).collect();
        tracing::info!("Sending cloud generation request to {} for prompt: \"{}\"", self.api_url, preview);

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&GenerationRequest { model: &self.model_id, prompt })
            .send()
            .await
            .map_err(AppError::HttpClient)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Cloud API request failed. Status: {}, Body: {}", status, body);
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }

        let body = response.text().await.map_err(AppError::HttpClient)?;
        let parsed: GenerationResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedUpstream(format!("{} in body {}", e, body)))?;
        parsed
            .images
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AppError::MalformedUpstream(format!("no image url in body {}", body)))
    }

    /// Download the bytes behind an image URL returned by the API.
    pub async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(AppError::HttpClient)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Failed to download image from {}. Status: {}", url, status);
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }
        let bytes = response.bytes().await.map_err(AppError::HttpClient)?;
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageGenerator for CloudImageClient {
    async fn generate(&self, prompt: &str) -> AppResult<Vec<u8>> {
        let url = self.request_image_url(prompt).await?;
        self.download(&url).await
    }
}
