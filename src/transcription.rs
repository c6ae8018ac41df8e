use crate::models::WhisperConfig;
use reqwest::{multipart, Client};
use serde::Deserialize;
use thiserror::Error;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Please configure your OpenAI API key in Settings")]
    MissingApiKey,

    #[error("Transcription error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transcription error: {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize, Debug)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Client for the OpenAI audio transcription endpoint.
#[derive(Debug, Clone)]
pub struct WhisperClient {
    client: Client,
    base_url: String,
}

impl Default for WhisperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WhisperClient {
    pub fn new() -> Self {
        Self::with_base_url(OPENAI_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Uploads recorded audio and returns the transcribed text.
    ///
    /// Without an API key nothing is sent.
    pub async fn transcribe(
        &self,
        api_key: Option<&str>,
        audio: Vec<u8>,
        config: &WhisperConfig,
    ) -> Result<String, TranscriptionError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(TranscriptionError::MissingApiKey)?;

        let file = multipart::Part::bytes(audio)
            .file_name("recording.wav")
            .mime_str("audio/wav")?;
        let mut form = multipart::Form::new()
            .part("file", file)
            .text("model", config.model.clone());
        if let Some(language) = config.language.as_deref().filter(|l| !l.is_empty()) {
            form = form.text("language", language.to_string());
        }

        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        log::info!("Sending audio to {} (model: {})", url, config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| "transcription failed".to_string());
            log::error!("Transcription request failed with status {}: {}", status, message);
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let result: TranscriptionResponse = response.json().await?;
        log::debug!("Transcribed {} characters", result.text.len());
        Ok(result.text)
    }
}
