//! The transport client for the three voice endpoints.
//!
//! No retries, no caching, no timeouts beyond reqwest defaults; every call
//! is a single request/response and the caller decides what a failure
//! means.

use async_trait::async_trait;

use crate::error::{ClientError, RequestFailure};
use crate::types::{GenerateRequest, GenerateResponse, TranscribeResponse, Turn};

/// Documented local fallback when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// The three remote operations the orchestrator sequences for a turn.
///
/// A trait seam so tests can stand in for the network; [`ApiClient`] is the
/// only production implementation.
#[async_trait]
pub trait VoiceApi: Send + Sync {
    /// Transcribe a WAV-encoded utterance.
    async fn transcribe(&self, audio_wav: Vec<u8>) -> Result<String, ClientError>;

    /// Generate the assistant's reply to `message`, given the prior
    /// conversation (not including `message` itself).
    async fn generate_reply(&self, message: &str, history: &[Turn])
        -> Result<String, ClientError>;

    /// Synthesize speech for a reply; returns MP3 bytes.
    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ClientError>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Startup probe; never fatal, only logged.
    pub async fn health(&self) -> bool {
        match self.http.get(self.url("/api/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health probe failed: {}", e);
                false
            }
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RequestFailure> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl VoiceApi for ApiClient {
    async fn transcribe(&self, audio_wav: Vec<u8>) -> Result<String, ClientError> {
        tracing::debug!(audio_bytes = audio_wav.len(), "Sending utterance for transcription");

        let part = reqwest::multipart::Part::bytes(audio_wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ClientError::Transcription(e.into()))?;
        let form = reqwest::multipart::Form::new().part("audio_file", part);

        let response = self
            .http
            .post(self.url("/api/speech-to-text"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transcription(e.into()))?;
        let response = Self::check_status(response)
            .await
            .map_err(ClientError::Transcription)?;

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Transcription(e.into()))?;
        let text = body.into_text().ok_or_else(|| {
            ClientError::Transcription(RequestFailure::Body(
                "neither `response` nor `text` present".to_string(),
            ))
        })?;

        tracing::debug!(transcript = %text, "Transcription complete");
        Ok(text)
    }

    async fn generate_reply(
        &self,
        message: &str,
        history: &[Turn],
    ) -> Result<String, ClientError> {
        tracing::debug!(history_len = history.len(), "Requesting reply");

        let response = self
            .http
            .post(self.url("/api/generate-text"))
            .json(&GenerateRequest {
                message,
                conversation_history: history,
            })
            .send()
            .await
            .map_err(|e| ClientError::Generation(e.into()))?;
        let response = Self::check_status(response)
            .await
            .map_err(ClientError::Generation)?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Generation(e.into()))?;
        Ok(body.response)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        tracing::debug!(chars = text.len(), "Requesting speech synthesis");

        let response = self
            .http
            .post(self.url("/api/text-to-speech"))
            .form(&[("text", text)])
            .send()
            .await
            .map_err(|e| ClientError::Synthesis(e.into()))?;
        let response = Self::check_status(response)
            .await
            .map_err(ClientError::Synthesis)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Synthesis(e.into()))?;
        tracing::debug!(audio_bytes = bytes.len(), "Synthesis complete");
        Ok(bytes.to_vec())
    }
}
