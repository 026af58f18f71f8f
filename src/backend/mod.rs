pub mod auth;
pub mod functions;
pub mod sse;

use async_trait::async_trait;
use futures::Stream;
use reqwest::StatusCode;
use std::pin::Pin;
use thiserror::Error;

use crate::models::chat::ChatMessage;

pub use auth::{ AuthClient, AuthSession };
pub use functions::FunctionsClient;
pub use sse::SseDecoder;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Failures surfaced by the backend endpoints, categorized by HTTP status so
/// the front-end can show the right transient notification. No retry logic
/// exists anywhere in this layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid backend configuration: {0}")]
    Config(String),
    #[error("too many requests, the backend is rate limiting this client")]
    RateLimited,
    #[error("backend credits are exhausted, payment required")]
    PaymentRequired,
    #[error("backend returned status {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            429 => ApiError::RateLimited,
            402 => ApiError::PaymentRequired,
            code => {
                let message = if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body.trim().to_string()
                };
                ApiError::Upstream { status: code, message }
            }
        }
    }
}

#[async_trait]
pub trait TranslateClient: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str
    ) -> Result<String, ApiError>;
}

#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Speech-to-text over the raw recorded audio bytes.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, ApiError>;

    /// Text-to-speech; returns the synthesized mp3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError>;
}

#[async_trait]
pub trait StreamingChat: Send + Sync {
    /// Open a streaming chat completion for the given transcript and return
    /// the incremental assistant tokens.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, ApiError>;
}
