//! Backend HTTP client.
//!
//! One-shot calls (`/chat`, `/stt`, `/tts`) carry the configured request
//! timeout. The event stream only has the connect timeout, since an answer
//! may legitimately stream for longer than any one-shot call.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};

use super::ChatBackend;
use super::sse::ChatStream;
use super::types::{ApiError, ChatReply, ChatRequest, SpeechRequest, Transcript};
use crate::audio::AudioClip;
use crate::config::Config;

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

const CHAT: &str = "/chat";
const CHAT_STREAM: &str = "/chat/stream";
const STT: &str = "/stt";
const TTS: &str = "/tts";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    /// Build a client from typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_base.clone(), request_timeout: config.timeouts.request })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::request(endpoint, &e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { endpoint, status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatBackend for ApiClient {
    async fn chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatReply, ApiError> {
        let request = self
            .http
            .post(self.url(CHAT))
            .timeout(self.request_timeout)
            .json(&ChatRequest { question, session_id });
        let response = self.send(CHAT, request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::request(CHAT, &e))?;
        serde_json::from_str(&text).map_err(|e| ApiError::parse(CHAT, e))
    }

    async fn stream_chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatStream, ApiError> {
        let mut query = vec![("question", question)];
        if let Some(session_id) = session_id {
            query.push(("session_id", session_id));
        }
        let request = self
            .http
            .get(self.url(CHAT_STREAM))
            .header(ACCEPT, "text/event-stream")
            .query(&query);
        let response = self.send(CHAT_STREAM, request).await?;
        tracing::debug!(%question, "api: chat stream opened");
        Ok(ChatStream::from_bytes(response.bytes_stream()))
    }

    async fn transcribe(&self, clip: AudioClip) -> Result<Option<String>, ApiError> {
        let part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime)
            .map_err(|e| ApiError::request(STT, &e))?;
        let request = self
            .http
            .post(self.url(STT))
            .timeout(self.request_timeout)
            .multipart(Form::new().part("audio", part));
        let response = self.send(STT, request).await?;
        let transcript: Transcript = response
            .json()
            .await
            .map_err(|e| ApiError::parse(STT, e))?;
        Ok(transcript.text().map(str::to_owned))
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let request = self
            .http
            .post(self.url(TTS))
            .timeout(self.request_timeout)
            .json(&SpeechRequest { text });
        let response = self.send(TTS, request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::request(TTS, &e))?;
        Ok(body.to_vec())
    }
}
