//! Remote asynchronous art-generation API client.
//!
//! The API is asynchronous end to end: a generation request returns an
//! operation id immediately, and the image becomes available on a later
//! `GET /operations/{id}` once `done` flips. The provider carries its own
//! rate gate (stamped only for non-direct calls) and optional sleep
//! windows, both feeding [`ImageProvider::is_ready`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::traits::{ImageProvider, ProviderCaps};
use crate::gate::RateGate;
use crate::prompts::PromptLibrary;
use crate::window::TimeWindow;
use crate::{ArtgateError, Result};

/// Provider code used as a metrics dimension.
pub const ART_API_CODE: &str = "art-api";

/// Default production endpoint.
const DEFAULT_BASE_URL: &str = "https://llm.api.cloud.yandex.net";

/// Configuration for the remote art API provider.
#[derive(Debug, Clone)]
pub struct ArtApiConfig {
    pub api_key: String,
    pub folder_id: String,
    /// Target aspect ratio, taken from the configured image geometry.
    pub width: u32,
    pub height: u32,
    /// Minimum interval between non-direct generations.
    pub generate_threshold: Duration,
    /// Time-of-day ranges during which the provider reports not-ready.
    pub sleep_windows: Vec<TimeWindow>,
}

/// Client for the asynchronous art-generation API.
pub struct ArtApiProvider {
    http: Client,
    base_url: String,
    config: ArtApiConfig,
    prompts: std::sync::Arc<PromptLibrary>,
    gate: Mutex<RateGate>,
}

impl ArtApiProvider {
    /// Create a provider against the production endpoint.
    pub fn new(config: ArtApiConfig, prompts: std::sync::Arc<PromptLibrary>) -> Self {
        Self::with_base_url(config, prompts, DEFAULT_BASE_URL)
    }

    /// Create a provider with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        config: ArtApiConfig,
        prompts: std::sync::Arc<PromptLibrary>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");

        let gate = Mutex::new(RateGate::new(config.generate_threshold));
        Self {
            http,
            base_url: base_url.into(),
            config,
            prompts,
            gate,
        }
    }

    /// Compose the effective prompt: library draw when the caller gave
    /// none, negative appended as an ignore clause.
    fn resolve_prompt(&self, prompt: Option<&str>) -> Result<String> {
        match prompt {
            Some(p) if !p.trim().is_empty() => Ok(p.trim().to_string()),
            Some(_) => Err(ArtgateError::InvalidInput("prompt is empty".into())),
            None => {
                let value = self.prompts.random_prompt()?;
                Ok(compose_prompt(&value.prompt, value.negative.as_deref()))
            }
        }
    }

    fn stamp_gate(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        gate.record_call(Instant::now());
    }
}

/// Append the negative prompt as an ignore clause.
pub fn compose_prompt(prompt: &str, negative: Option<&str>) -> String {
    match negative {
        Some(neg) if !neg.trim().is_empty() => {
            format!("{prompt}. Ignore the following: {}", neg.trim())
        }
        _ => prompt.to_string(),
    }
}

#[async_trait]
impl ImageProvider for ArtApiProvider {
    fn name(&self) -> &str {
        "art-api"
    }

    fn code(&self) -> &str {
        ART_API_CODE
    }

    async fn start(&self) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(ArtgateError::Configuration(
                "art API key is not configured".into(),
            ));
        }
        if self.config.folder_id.is_empty() {
            return Err(ArtgateError::Configuration(
                "art API folder id is not configured".into(),
            ));
        }
        for window in &self.config.sleep_windows {
            window.validate()?;
        }
        Ok(())
    }

    async fn generate(&self, prompt: Option<&str>, direct: bool) -> Result<String> {
        let prompt = self.resolve_prompt(prompt)?;
        debug!(prompt = %prompt, direct, "generate request");

        let request = GenerateRequest {
            model_uri: format!("art://{}/yandex-art/latest", self.config.folder_id),
            messages: vec![PromptMessage {
                text: prompt,
                weight: 1,
            }],
            generation_options: GenerationOptions {
                mime_type: "image/jpeg".into(),
                aspect_ratio: AspectRatio {
                    width_ratio: self.config.width.to_string(),
                    height_ratio: self.config.height.to_string(),
                },
            },
        };

        let url = format!("{}/foundationModels/v1/imageGenerationAsync", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Api-Key {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ArtgateError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "generate rejected");
            return Err(ArtgateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: OperationResponse = response
            .json()
            .await
            .map_err(|e| ArtgateError::Http(e.to_string()))?;

        if !direct {
            self.stamp_gate();
        }

        if let Some(err) = body.error_message() {
            error!(error = %err, "generate returned error");
            return Err(ArtgateError::Provider(err));
        }
        if body.id.is_empty() {
            return Err(ArtgateError::Provider("empty operation id".into()));
        }

        debug!(external_id = %body.id, "generation started");
        Ok(body.id)
    }

    async fn poll(&self, external_id: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/operations/{}", self.base_url, external_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Api-Key {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| ArtgateError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ArtgateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: OperationResponse = response
            .json()
            .await
            .map_err(|e| ArtgateError::Http(e.to_string()))?;

        if !body.done {
            return Ok(None);
        }

        if let Some(err) = body.error_message() {
            error!(external_id, error = %err, "generation failed upstream");
            return Err(ArtgateError::Provider(err));
        }

        let image = body.response.ok_or_else(|| {
            ArtgateError::Provider("done operation carries no image".into())
        })?;
        if image.image.is_empty() {
            return Err(ArtgateError::Provider("image field is empty".into()));
        }

        let bytes = BASE64
            .decode(image.image.as_bytes())
            .map_err(|e| ArtgateError::Provider(format!("invalid image base64: {e}")))?;
        debug!(external_id, size = bytes.len(), "image received");
        Ok(Some(bytes))
    }

    fn is_ready(&self) -> bool {
        {
            let gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            if !gate.threshold_out(Instant::now()) {
                return false;
            }
        }

        let now = Local::now().time();
        for window in &self.config.sleep_windows {
            match window.contains(now) {
                Ok(true) => return false,
                Ok(false) => {}
                Err(err) => warn!(error = %err, "sleep window check failed"),
            }
        }
        true
    }

    fn caps(&self) -> ProviderCaps {
        ProviderCaps {
            prompt_capable: true,
            persist_raw: true,
        }
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model_uri: String,
    messages: Vec<PromptMessage>,
    generation_options: GenerationOptions,
}

#[derive(Debug, Serialize)]
struct PromptMessage {
    text: String,
    weight: u32,
}

#[derive(Debug, Serialize)]
struct GenerationOptions {
    mime_type: String,
    #[serde(rename = "aspectRatio")]
    aspect_ratio: AspectRatio,
}

#[derive(Debug, Serialize)]
struct AspectRatio {
    #[serde(rename = "widthRatio")]
    width_ratio: String,
    #[serde(rename = "heightRatio")]
    height_ratio: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    response: Option<ImagePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    #[serde(default)]
    image: String,
}

impl OperationResponse {
    fn error_message(&self) -> Option<String> {
        if self.error.is_empty() {
            return None;
        }
        if self.code.is_empty() && self.message.is_empty() {
            Some(self.error.clone())
        } else {
            Some(format!("{} {}", self.code, self.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_prompt_appends_negative() {
        assert_eq!(
            compose_prompt("a fox", Some("blurry")),
            "a fox. Ignore the following: blurry"
        );
        assert_eq!(compose_prompt("a fox", Some("  ")), "a fox");
        assert_eq!(compose_prompt("a fox", None), "a fox");
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        let resp = OperationResponse {
            id: String::new(),
            done: true,
            error: "failed".into(),
            code: "E42".into(),
            message: "quota exceeded".into(),
            response: None,
        };
        assert_eq!(resp.error_message().unwrap(), "E42 quota exceeded");

        let bare = OperationResponse {
            id: String::new(),
            done: true,
            error: "failed".into(),
            code: String::new(),
            message: String::new(),
            response: None,
        };
        assert_eq!(bare.error_message().unwrap(), "failed");
    }
}
