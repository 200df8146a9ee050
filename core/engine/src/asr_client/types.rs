// core/engine/src/asr_client/types.rs
// Types for the ASR sidecar HTTP client

use serde::{Deserialize, Serialize};

/// Request to the ASR service
#[derive(Debug, Clone, Serialize)]
pub struct AsrHttpRequest {
    /// Base64 encoded audio (WAV container, 16kHz mono)
    pub audio_b64: String,
    /// Language code (e.g., "en", "zh"), None for auto-detect
    pub language: Option<String>,
    /// Task type: "transcribe" or "translate"
    pub task: String,
    /// Beam size for decoding
    pub beam_size: i32,
}

impl Default for AsrHttpRequest {
    fn default() -> Self {
        Self {
            audio_b64: String::new(),
            language: None,
            task: "transcribe".to_string(),
            beam_size: 5,
        }
    }
}

/// Response from the ASR service
#[derive(Debug, Clone, Deserialize)]
pub struct AsrHttpResponse {
    /// Full transcribed text
    pub text: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Detected language
    pub language: Option<String>,
    /// Audio duration in seconds
    pub duration: Option<f32>,
}
