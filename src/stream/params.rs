//! Transcription parameters negotiated from request headers.

use serde::Serialize;

use crate::error::{GatewayError, Result};
use crate::transport::RequestDescriptor;

/// Header listing languages to detect, comma separated.
pub const LANGUAGE_HEADER: &str = "detect_language";
/// Header carrying the audio sample rate in Hz.
pub const SAMPLE_RATE_HEADER: &str = "sample_rate";
/// Header selecting the transcription model.
pub const MODEL_HEADER: &str = "transcription_model";
/// Header enabling speaker diarization.
pub const DIARIZE_HEADER: &str = "diarize";
/// Header toggling smart formatting.
pub const SMART_FORMAT_HEADER: &str = "smart_format";

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_MODEL: &str = "nova-3";

/// Parameters fixed for the lifetime of a transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionParams {
    /// Languages to transcribe
    pub languages: Vec<String>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Provider model id
    pub model: String,
    /// Speaker diarization
    pub diarize: bool,
    /// Punctuation and number formatting
    pub smart_format: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            sample_rate: DEFAULT_SAMPLE_RATE,
            model: DEFAULT_MODEL.to_string(),
            diarize: false,
            smart_format: true,
        }
    }
}

impl SessionParams {
    /// Read parameters from request headers, falling back to defaults.
    pub fn from_request(request: &RequestDescriptor) -> Result<Self> {
        let mut params = Self::default();

        if let Some(raw) = request.header(LANGUAGE_HEADER) {
            let languages: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if !languages.is_empty() {
                params.languages = languages;
            }
        }

        if let Some(raw) = request.header(SAMPLE_RATE_HEADER) {
            params.sample_rate = raw
                .trim()
                .parse()
                .ok()
                .filter(|rate| *rate > 0)
                .ok_or_else(|| GatewayError::BadInput(format!("invalid sample_rate: {raw}")))?;
        }

        if let Some(model) = request.header(MODEL_HEADER).map(str::trim) {
            if !model.is_empty() {
                params.model = model.to_string();
            }
        }

        if let Some(raw) = request.header(DIARIZE_HEADER) {
            params.diarize = parse_flag(raw, DIARIZE_HEADER)?;
        }
        if let Some(raw) = request.header(SMART_FORMAT_HEADER) {
            params.smart_format = parse_flag(raw, SMART_FORMAT_HEADER)?;
        }

        Ok(params)
    }

    /// Query parameters for the provider call.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("model", self.model.clone()),
            ("sample_rate", self.sample_rate.to_string()),
            ("diarize", self.diarize.to_string()),
            ("smart_format", self.smart_format.to_string()),
        ];
        pairs.extend(self.languages.iter().map(|l| ("language", l.clone())));
        pairs
    }
}

fn parse_flag(raw: &str, name: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(GatewayError::BadInput(format!("invalid {name}: {raw}"))),
    }
}
