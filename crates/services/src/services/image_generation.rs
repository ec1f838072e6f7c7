//! Text-to-image generation for assistant-created content.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{config::AiConfig, image::ImageUpload};

const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";

#[derive(Debug, Error)]
pub enum ImageGenerationError {
    #[error("image generation is not configured: OPENAI_API_KEY is not set")]
    NotConfigured,
    #[error("image api request failed: {0}")]
    Transport(String),
    #[error("image api returned http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("image api returned no image data")]
    EmptyResponse,
    #[error("invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates a PNG for `prompt`. The caller validates it like any upload.
    async fn generate(&self, prompt: &str) -> Result<ImageUpload, ImageGenerationError>;
}

pub type SharedImageGenerator = Arc<dyn ImageGenerator>;

pub struct OpenAiImageGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
}

impl OpenAiImageGenerator {
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, ImageGenerationError> {
        config
            .openai_api_key
            .clone()
            .map(|key| Self::new(key, config.image_model.clone()))
            .transpose()
    }

    pub fn new(api_key: SecretString, model: String) -> Result<Self, ImageGenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ImageGenerationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<ImageUpload, ImageGenerationError> {
        let response = self
            .client
            .post(OPENAI_IMAGES_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&GenerationRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: "1024x1024",
            })
            .send()
            .await
            .map_err(|e| ImageGenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageGenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageGenerationError::Transport(e.to_string()))?;
        let encoded = body
            .data
            .into_iter()
            .find_map(|image| image.b64_json)
            .ok_or(ImageGenerationError::EmptyResponse)?;

        let bytes = decode_image(&encoded)?;
        info!(model = %self.model, size = bytes.len(), "Generated image");
        Ok(ImageUpload::new("generated.png", Some("image/png".to_string()), bytes))
    }
}

fn decode_image(encoded: &str) -> Result<Bytes, ImageGenerationError> {
    Ok(Bytes::from(STANDARD.decode(encoded.trim())?))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;
    use crate::services::image::fixtures::png;

    #[derive(Default)]
    pub struct FakeImageGenerator {
        pub prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageGenerator for FakeImageGenerator {
        async fn generate(&self, prompt: &str) -> Result<ImageUpload, ImageGenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(png(256))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_b64_png() {
        let png = b"\x89PNG\r\n\x1a\nrest";
        let encoded = STANDARD.encode(png);
        let bytes = decode_image(&format!("{encoded}\n")).unwrap();
        let upload = ImageUpload::new("generated.png", Some("image/png".into()), bytes);
        assert_eq!(upload.validate().unwrap().content_type, "image/png");
        assert!(decode_image("not base64!").is_err());
    }
}
