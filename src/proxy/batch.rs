//! One-shot forwarding to upstream providers.
//!
//! Every method makes exactly one upstream call and never retries: provider
//! failures, error statuses and timeouts are surfaced as
//! [`GatewayError::Upstream`].

use axum::http::header;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};
use crate::stream::SessionParams;

/// Longest upstream error body quoted in an error message.
const ERROR_SNIPPET_LEN: usize = 512;

/// Summary of a voice transcription result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSummary {
    /// Transcript text
    pub transcription: String,
    /// Provider confidence (0.0-1.0)
    pub confidence: f64,
    /// Detected or requested language
    pub language: Option<String>,
    /// Word-level timings as returned by the provider
    pub words: Value,
}

impl TranscriptSummary {
    /// Extract the first alternative of the first channel.
    ///
    /// An empty transcript means no speech was detected and is `BadInput`.
    pub fn from_provider(result: &Value, params: &SessionParams) -> Result<Self> {
        let channel = result.pointer("/results/channels/0");
        let alternative = channel.and_then(|c| c.pointer("/alternatives/0"));

        let transcription = alternative
            .and_then(|a| a.get("transcript"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if transcription.is_empty() {
            return Err(GatewayError::BadInput(
                "no speech detected in the audio".to_string(),
            ));
        }

        Ok(Self {
            transcription: transcription.to_string(),
            confidence: alternative
                .and_then(|a| a.get("confidence"))
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            language: channel
                .and_then(|c| c.get("detected_language"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| params.languages.first().cloned()),
            words: alternative
                .and_then(|a| a.get("words"))
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        })
    }
}

/// Forwards batch requests to the configured providers.
#[derive(Debug, Clone)]
pub struct BatchProxy {
    client: Client,
    config: UpstreamConfig,
}

impl BatchProxy {
    /// Create a proxy sharing `client`
    pub fn new(client: Client, config: UpstreamConfig) -> Self {
        Self { client, config }
    }

    /// Forward a validated chat completion request.
    pub async fn chat_completions(&self, payload: &Value) -> Result<Value> {
        let request = self.client.post(&self.config.chat_url).json(payload);
        send_json(self.with_chat_key(request)).await
    }

    /// Fetch the model catalog.
    pub async fn list_models(&self) -> Result<Value> {
        let request = self.client.get(&self.config.models_url);
        send_json(self.with_chat_key(request)).await
    }

    /// Transcribe an audio file and return the provider result unchanged.
    pub async fn transcribe(
        &self,
        audio: Bytes,
        content_type: Option<&str>,
        params: &SessionParams,
    ) -> Result<Value> {
        let mut request = self
            .client
            .post(&self.config.transcription_url)
            .query(&params.query_pairs())
            .header(
                header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(audio);
        if let Some(key) = &self.config.stt_api_key {
            request = request.header(header::AUTHORIZATION, format!("Token {key}"));
        }
        send_json(request).await
    }

    /// Transcribe a short voice clip and summarise the result.
    pub async fn transcribe_voice(
        &self,
        audio: Bytes,
        content_type: Option<&str>,
        params: &SessionParams,
    ) -> Result<TranscriptSummary> {
        let result = self.transcribe(audio, content_type, params).await?;
        TranscriptSummary::from_provider(&result, params)
    }

    fn with_chat_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.chat_api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

async fn send_json(request: RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_SNIPPET_LEN).collect();
        return Err(GatewayError::Upstream(format!(
            "provider returned {status}: {snippet}"
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| GatewayError::Upstream(format!("invalid JSON from provider: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_summary_from_provider() {
        let result = json!({
            "results": {"channels": [{
                "detected_language": "fr",
                "alternatives": [{"transcript": " bonjour ", "confidence": 0.93, "words": [{"word": "bonjour"}]}]
            }]}
        });
        let summary = TranscriptSummary::from_provider(&result, &SessionParams::default()).unwrap();
        assert_eq!(summary.transcription, "bonjour");
        assert!((summary.confidence - 0.93).abs() < f64::EPSILON);
        assert_eq!(summary.language.as_deref(), Some("fr"));
        assert_eq!(summary.words[0]["word"], "bonjour");
    }

    #[test]
    fn test_summary_without_speech_is_bad_input() {
        let result = json!({"results": {"channels": [{"alternatives": [{"transcript": ""}]}]}});
        let err = TranscriptSummary::from_provider(&result, &SessionParams::default()).unwrap_err();
        assert_eq!(err.reason(), "bad_input");

        let err = TranscriptSummary::from_provider(&json!({}), &SessionParams::default()).unwrap_err();
        assert_eq!(err.reason(), "bad_input");
    }

    async fn models(
        State(hits): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        hits.fetch_add(1, Ordering::SeqCst);
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer chat-key") => (StatusCode::OK, Json(json!({"data": [{"id": "gpt-4o"}]}))),
            _ => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "down"}))),
        }
    }

    async fn spawn_upstream() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/models", get(models))
            .with_state(Arc::clone(&hits));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn test_list_models_forwards_key() {
        let (base, hits) = spawn_upstream().await;
        let proxy = BatchProxy::new(
            Client::new(),
            UpstreamConfig {
                models_url: format!("{base}/models"),
                chat_api_key: Some("chat-key".to_string()),
                ..Default::default()
            },
        );

        let models = proxy.list_models().await.unwrap();
        assert_eq!(models["data"][0]["id"], "gpt-4o");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_not_retried() {
        let (base, hits) = spawn_upstream().await;
        let proxy = BatchProxy::new(
            Client::new(),
            UpstreamConfig {
                models_url: format!("{base}/models"),
                ..Default::default()
            },
        );

        let err = proxy.list_models().await.unwrap_err();
        assert_eq!(err.reason(), "upstream_failure");
        assert!(err.to_string().contains("503"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
