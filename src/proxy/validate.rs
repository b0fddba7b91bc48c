//! Input validation for batch handlers.
//!
//! Runs before any upstream call; a rejected request never reaches a provider.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{GatewayError, Result};

/// Parse and check a chat completion request body.
///
/// The body must be a JSON object with a non-empty `messages` array. Streamed
/// completions are refused because every result is returned in one envelope.
pub fn chat_request(body: &[u8]) -> Result<Value> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadInput(format!("request body is not valid JSON: {e}")))?;

    let Some(object) = payload.as_object() else {
        return Err(GatewayError::BadInput(
            "request body must be a JSON object".to_string(),
        ));
    };

    match object.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => {},
        _ => {
            return Err(GatewayError::BadInput(
                "`messages` must be a non-empty array".to_string(),
            ))
        },
    }

    if object.get("stream").and_then(Value::as_bool) == Some(true) {
        return Err(GatewayError::BadInput(
            "streamed chat completions are not supported".to_string(),
        ));
    }

    Ok(payload)
}

/// Check an audio upload.
pub fn audio_upload(content_type: Option<&str>, body: Bytes) -> Result<Bytes> {
    if body.is_empty() {
        return Err(GatewayError::BadInput("audio body is empty".to_string()));
    }

    if let Some(content_type) = content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let accepted = essence.starts_with("audio/")
            || essence.starts_with("video/")
            || essence == "application/octet-stream";
        if !accepted {
            return Err(GatewayError::BadInput(format!(
                "unsupported content type for audio: {content_type}"
            )));
        }
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_accepts_messages() {
        let payload =
            chat_request(br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#)
                .unwrap();
        assert_eq!(payload["model"], "gpt-4o");
    }

    #[test]
    fn test_chat_request_rejections() {
        for body in [
            &b"not json"[..],
            br#"[1,2]"#,
            br#"{"model":"gpt-4o"}"#,
            br#"{"messages":[]}"#,
            br#"{"messages":[{"role":"user","content":"hi"}],"stream":true}"#,
        ] {
            let err = chat_request(body).unwrap_err();
            assert_eq!(err.reason(), "bad_input", "body: {}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn test_audio_upload() {
        let audio = Bytes::from_static(b"RIFF....WAVE");
        assert!(audio_upload(Some("audio/wav"), audio.clone()).is_ok());
        assert!(audio_upload(Some("Audio/Webm; codecs=opus"), audio.clone()).is_ok());
        assert!(audio_upload(Some("application/octet-stream"), audio.clone()).is_ok());
        assert!(audio_upload(None, audio.clone()).is_ok());

        assert!(audio_upload(Some("application/json"), audio).is_err());
        assert!(audio_upload(Some("audio/wav"), Bytes::new()).is_err());
    }
}
