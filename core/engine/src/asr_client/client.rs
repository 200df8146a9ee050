// core/engine/src/asr_client/client.rs
// HTTP client implementation for the ASR sidecar service

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;

use super::types::{AsrHttpRequest, AsrHttpResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::transcriber::Transcriber;
use crate::types::Transcript;

/// HTTP client for the ASR service
pub struct AsrHttpClient {
    client: Client,
    service_url: String,
    default_language: Option<String>,
}

impl AsrHttpClient {
    /// Create a new ASR HTTP client
    ///
    /// # Arguments
    /// * `service_url` - Base URL of the ASR service (e.g., "http://127.0.0.1:6006")
    /// * `timeout_secs` - Request timeout in seconds
    pub fn new(service_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            service_url,
            default_language: None,
        }
    }

    /// Set a default language hint used when a call does not carry one
    pub fn with_default_language(mut self, language: Option<String>) -> Self {
        self.default_language = language;
        self
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Wrap raw PCM16 mono samples in an in-memory WAV container; the sidecar
    /// only accepts container formats it can probe.
    pub fn package_wav(pcm: &[u8], sample_rate: u32) -> ServiceResult<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| ServiceError::new(format!("Failed to create WAV writer: {}", e)))?;
            for pair in pcm.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                writer
                    .write_sample(sample)
                    .map_err(|e| ServiceError::new(format!("Failed to write WAV sample: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| ServiceError::new(format!("Failed to finalize WAV: {}", e)))?;
        }

        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl Transcriber for AsrHttpClient {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        sample_rate: u32,
        language: Option<String>,
    ) -> ServiceResult<Transcript> {
        let wav = Self::package_wav(&audio, sample_rate)?;
        let request = AsrHttpRequest {
            audio_b64: BASE64.encode(&wav),
            language: language.or_else(|| self.default_language.clone()),
            ..Default::default()
        };

        let url = format!("{}/asr", self.service_url);
        eprintln!(
            "[ASR] Sending request to ASR service: {} (audio: {} bytes)",
            url,
            audio.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::new(format!("ASR HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("[ASR] Service returned error {}: {}", status, error_text);
            return Err(ServiceError::new(format!(
                "ASR service returned error {}: {}",
                status, error_text
            )));
        }

        let asr_response: AsrHttpResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::new(format!("Failed to parse ASR response: {}", e)))?;

        eprintln!(
            "[ASR] Received response: {} chars, confidence {:.2}, language: {:?}",
            asr_response.text.len(),
            asr_response.confidence,
            asr_response.language
        );

        Ok(Transcript {
            text: asr_response.text,
            confidence: asr_response.confidence.clamp(0.0, 1.0),
        })
    }
}
