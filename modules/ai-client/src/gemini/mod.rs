mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};
use base64::Engine;

use client::GeminiClient;
use types::*;

/// Raw media handed to the model alongside the prompt.
#[derive(Debug, Clone)]
pub struct InlineMedia {
    pub mime_type: String,
    pub data: Vec<u8>,
}

// =============================================================================
// Gemini Agent
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    // =========================================================================
    // Convenience methods
    // =========================================================================

    /// Single-turn text generation.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_media(prompt, &[], false).await
    }

    /// Single-turn generation that asks the model for a JSON document.
    pub async fn generate_json(&self, prompt: &str, media: &[InlineMedia]) -> Result<String> {
        self.generate_with_media(prompt, media, true).await
    }

    /// Single-turn generation over inline media. Media parts precede the
    /// prompt so the instructions read last.
    pub async fn generate_with_media(
        &self,
        prompt: &str,
        media: &[InlineMedia],
        json: bool,
    ) -> Result<String> {
        let engine = base64::engine::general_purpose::STANDARD;

        let mut parts: Vec<Part> = media
            .iter()
            .map(|m| Part::inline(&m.mime_type, engine.encode(&m.data)))
            .collect();
        parts.push(Part::text(prompt));

        let mut request = GenerateRequest::new()
            .content(Content::user(parts))
            .temperature(0.0);
        if json {
            request = request.json_response();
        }

        let response = self.client().generate(&self.model, &request).await?;

        response.text().ok_or_else(|| {
            let reason = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .or_else(|| response.prompt_feedback.as_ref().map(|f| f.to_string()))
                .unwrap_or_else(|| "no candidates".to_string());
            anyhow!("No text response from Gemini ({reason})")
        })
    }
}
