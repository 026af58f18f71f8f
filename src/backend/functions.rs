use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt;
use log::debug;
use reqwest::{
    Client as HttpClient,
    header::{ HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE },
};
use serde::{ Deserialize, Serialize, de::DeserializeOwned };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use super::{ ApiError, SpeechClient, StreamingChat, TokenStream, TranslateClient };
use crate::backend::sse::SseDecoder;
use crate::models::chat::ChatMessage;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Serialize)]
struct SpeechToTextRequest {
    audio: String,
}

#[derive(Deserialize)]
struct SpeechToTextResponse {
    text: String,
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextToSpeechResponse {
    audio_content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

/// Client for the managed backend's function endpoints. All calls are POSTs
/// with a JSON body, the project `apikey` header, and a bearer token (the
/// signed-in user's access token, or the anon key before sign-in).
pub struct FunctionsClient {
    http: HttpClient,
    base_url: String,
}

impl FunctionsClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        access_token: Option<&str>,
        connect_timeout: Duration
    ) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url).map_err(|e|
            ApiError::Config(format!("invalid backend URL '{}': {}", base_url, e))
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !anon_key.is_empty() {
            headers.insert(
                HeaderName::from_static("apikey"),
                HeaderValue::from_str(anon_key).map_err(|e|
                    ApiError::Config(format!("invalid anon key: {}", e))
                )?
            );
        }
        let bearer = access_token.unwrap_or(anon_key);
        if !bearer.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(|e|
                    ApiError::Config(format!("invalid bearer token: {}", e))
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        function: &str,
        body: &B
    ) -> Result<R, ApiError> {
        let url = self.function_url(function);
        debug!("POST {}", url);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, text));
        }
        resp.json::<R>().await.map_err(ApiError::from)
    }
}

#[async_trait]
impl TranslateClient for FunctionsClient {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str
    ) -> Result<String, ApiError> {
        let resp: TranslateResponse = self.post_json("translate-text", &TranslateRequest {
            text,
            source_lang,
            target_lang,
        }).await?;
        Ok(resp.translated_text)
    }
}

#[async_trait]
impl SpeechClient for FunctionsClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, ApiError> {
        let resp: SpeechToTextResponse = self.post_json("speech-to-text", &SpeechToTextRequest {
            audio: BASE64.encode(audio),
        }).await?;
        Ok(resp.text)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let resp: TextToSpeechResponse = self.post_json("text-to-speech", &TextToSpeechRequest {
            text,
        }).await?;
        BASE64.decode(resp.audio_content.as_bytes()).map_err(|e|
            ApiError::Decode(format!("audio content is not valid base64: {}", e))
        )
    }
}

#[async_trait]
impl StreamingChat for FunctionsClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, ApiError> {
        let url = self.function_url("pirate-chat");
        debug!("POST {} (streaming)", url);
        let resp = self.http
            .post(&url)
            .json(&(ChatRequest { messages }))
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, text));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut bytes = resp.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        for token in decoder.feed(&buf) {
                            if tx.send(Ok(token)).await.is_err() {
                                return;
                            }
                        }
                        if decoder.is_done() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::Stream(e.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_urls_are_rooted_at_the_functions_gateway() {
        let client = FunctionsClient::new(
            "https://project.supabase.co/",
            "anon-key",
            None,
            Duration::from_secs(10)
        ).unwrap();
        assert_eq!(
            client.function_url("translate-text"),
            "https://project.supabase.co/functions/v1/translate-text"
        );
    }

    #[test]
    fn invalid_base_urls_are_rejected_up_front() {
        let result = FunctionsClient::new("not a url", "k", None, Duration::from_secs(1));
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn wire_types_use_the_backend_field_names() {
        let body = serde_json::to_value(&TranslateRequest {
            text: "Hello",
            source_lang: "en",
            target_lang: "es",
        }).unwrap();
        assert_eq!(body["sourceLang"], "en");
        assert_eq!(body["targetLang"], "es");

        let resp: TextToSpeechResponse = serde_json
            ::from_str("{\"audioContent\":\"bXAz\"}")
            .unwrap();
        assert_eq!(BASE64.decode(resp.audio_content).unwrap(), b"mp3");
    }
}
