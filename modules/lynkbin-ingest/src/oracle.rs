// The classification oracle: prompt (plus optional media) in, free text out.

use ai_client::{Gemini, InlineMedia};
use async_trait::async_trait;
use tracing::debug;

use crate::classify::MediaPayload;

/// One request to the oracle. Media parts are sent ahead of the prompt.
#[derive(Debug, Clone, Default)]
pub struct OracleRequest {
    pub prompt: String,
    pub media: Vec<MediaPayload>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String>;
}

pub struct GeminiOracle {
    gemini: Gemini,
}

impl GeminiOracle {
    pub fn new(gemini: Gemini) -> Self {
        Self { gemini }
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String> {
        let media: Vec<InlineMedia> = request
            .media
            .iter()
            .map(|m| InlineMedia {
                mime_type: m.mime_type.clone(),
                data: m.bytes.clone(),
            })
            .collect();

        debug!(
            model = self.gemini.model(),
            prompt_chars = request.prompt.len(),
            media = media.len(),
            "Calling Gemini"
        );
        self.gemini.generate_json(&request.prompt, &media).await
    }
}
