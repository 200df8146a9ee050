//! Runtime configuration loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ServiceError, ServiceResult};
use crate::types::pcm16_bytes_for_ms;

/// Top-level runtime configuration for the service binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub service: ServiceConfig,
    pub asr: AsrConfig,
    pub vad: VadConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Base URL of the ASR sidecar service.
    pub url: String,
    /// Request timeout in seconds (recognition of a few seconds of audio can
    /// itself take seconds on CPU).
    pub timeout_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6006".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub enabled: bool,
    /// RMS threshold on normalized samples; a 512-sample window above it
    /// counts as speech.
    pub energy_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            energy_threshold: 0.01,
        }
    }
}

/// Tuning parameters of one streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sample_rate: u32,
    /// Seconds of buffered audio that trigger a size-threshold flush.
    pub chunk_interval_secs: f32,
    /// Quiet interval after the last accepted chunk that trips the silence
    /// timer.
    pub silence_timeout_ms: u64,
    /// Floor below which a flush discards the buffer without recognition.
    pub min_speech_duration_ms: u64,
    /// Grace period applied to a cutoff flush when the client omits one.
    pub default_grace_period_ms: u64,
    /// Language hint forwarded to the ASR service; `None` = auto-detect.
    pub language: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_interval_secs: 3.0,
            silence_timeout_ms: 2000,
            min_speech_duration_ms: 250,
            default_grace_period_ms: 500,
            language: None,
        }
    }
}

impl SessionConfig {
    /// Size-threshold in bytes: `sample_rate * 2 bytes * chunk_interval_secs`.
    pub fn min_chunk_bytes(&self) -> usize {
        (self.sample_rate as f32 * 2.0 * self.chunk_interval_secs) as usize
    }

    /// Minimum flushable buffer size in bytes (the 250ms-class floor).
    pub fn min_flush_bytes(&self) -> usize {
        pcm16_bytes_for_ms(self.sample_rate, self.min_speech_duration_ms)
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> ServiceResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::new(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ServiceError::new(format!("Failed to parse config file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_arithmetic() {
        let config = SessionConfig {
            chunk_interval_secs: 1.5,
            ..Default::default()
        };
        // 1.5s at 16kHz/16-bit = 48000 bytes
        assert_eq!(config.min_chunk_bytes(), 48000);
        assert_eq!(config.min_flush_bytes(), 8000);
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.min_chunk_bytes(), 96000);
        assert_eq!(config.default_grace_period_ms, 500);
        assert!(config.language.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [service]
            port = 9100

            [session]
            chunk_interval_secs = 1.5
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.service.port, 9100);
        assert_eq!(config.service.host, "0.0.0.0");
        assert_eq!(config.session.min_chunk_bytes(), 48000);
        assert!(config.vad.enabled);
    }
}
