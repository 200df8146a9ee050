//! Speech/silence gating in front of the ASR capability.
//!
//! The gate wraps an optional voice-activity detector. When no detector is
//! configured it degrades to "everything is speech" and sufficiency becomes a
//! pure byte-length check, so the rest of the session logic never branches on
//! whether VAD is available.

mod energy;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceResult;
use crate::types::pcm16_bytes_for_ms;

pub use energy::EnergyVad;

/// Voice-activity capability: classify one chunk as speech or silence.
#[async_trait]
pub trait VoiceActivityDetector: Send + Sync {
    async fn is_speech(&self, chunk: &[u8], sample_rate: u32) -> ServiceResult<bool>;
}

/// Two-variant gate over the VAD capability.
#[derive(Clone)]
pub enum SpeechGate {
    Enabled(Arc<dyn VoiceActivityDetector>),
    Disabled,
}

impl SpeechGate {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SpeechGate::Enabled(_))
    }

    /// Classify a chunk. Detector faults are treated as speech: dropping real
    /// speech is worse than transcribing a little noise.
    pub async fn is_speech(&self, chunk: &[u8], sample_rate: u32) -> bool {
        match self {
            SpeechGate::Disabled => true,
            SpeechGate::Enabled(detector) => {
                match detector.is_speech(chunk, sample_rate).await {
                    Ok(speech) => speech,
                    Err(e) => {
                        eprintln!("[Gate] VAD fault, assuming speech: {}", e);
                        true
                    }
                }
            }
        }
    }

    /// Whether an accumulated buffer carries enough speech to be worth a
    /// recognition call.
    ///
    /// Disabled: a byte-length comparison against
    /// `sample_rate * 2 * min_duration_ms / 1000`. Enabled: sample up to
    /// three slices at distinct offsets and require at least half of them to
    /// classify as speech.
    pub async fn has_sufficient_speech(
        &self,
        buffer: &[u8],
        sample_rate: u32,
        min_duration_ms: u64,
    ) -> bool {
        let min_bytes = pcm16_bytes_for_ms(sample_rate, min_duration_ms);

        match self {
            SpeechGate::Disabled => buffer.len() >= min_bytes,
            SpeechGate::Enabled(_) => {
                if buffer.len() < min_bytes || min_bytes == 0 {
                    return false;
                }

                let num_slices = (buffer.len() / min_bytes).min(3).max(1);
                let mut detections = 0;
                for i in 0..num_slices {
                    let start = i * (buffer.len() / (num_slices + 1));
                    let end = (start + min_bytes).min(buffer.len());
                    if self.is_speech(&buffer[start..end], sample_rate).await {
                        detections += 1;
                    }
                }

                detections * 2 >= num_slices
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    struct AlwaysSpeech;

    #[async_trait]
    impl VoiceActivityDetector for AlwaysSpeech {
        async fn is_speech(&self, _chunk: &[u8], _sample_rate: u32) -> ServiceResult<bool> {
            Ok(true)
        }
    }

    struct NeverSpeech;

    #[async_trait]
    impl VoiceActivityDetector for NeverSpeech {
        async fn is_speech(&self, _chunk: &[u8], _sample_rate: u32) -> ServiceResult<bool> {
            Ok(false)
        }
    }

    struct FaultyVad;

    #[async_trait]
    impl VoiceActivityDetector for FaultyVad {
        async fn is_speech(&self, _chunk: &[u8], _sample_rate: u32) -> ServiceResult<bool> {
            Err(ServiceError::new("model crashed"))
        }
    }

    #[tokio::test]
    async fn test_disabled_gate_passes_everything() {
        let gate = SpeechGate::Disabled;
        assert!(gate.is_speech(&[0u8; 64], 16000).await);
    }

    #[tokio::test]
    async fn test_disabled_sufficiency_is_byte_length_check() {
        let gate = SpeechGate::Disabled;
        // 250ms at 16kHz/16-bit = exactly 8000 bytes
        assert!(!gate.has_sufficient_speech(&[0u8; 7999], 16000, 250).await);
        assert!(gate.has_sufficient_speech(&[0u8; 8000], 16000, 250).await);
        assert!(gate.has_sufficient_speech(&[0u8; 8001], 16000, 250).await);
    }

    #[tokio::test]
    async fn test_enabled_sufficiency_requires_minimum_bytes() {
        let gate = SpeechGate::Enabled(Arc::new(AlwaysSpeech));
        assert!(!gate.has_sufficient_speech(&[0u8; 7999], 16000, 250).await);
        assert!(gate.has_sufficient_speech(&[0u8; 8000], 16000, 250).await);
    }

    #[tokio::test]
    async fn test_enabled_sufficiency_rejects_silence() {
        let gate = SpeechGate::Enabled(Arc::new(NeverSpeech));
        assert!(!gate.has_sufficient_speech(&[0u8; 32000], 16000, 250).await);
    }

    #[tokio::test]
    async fn test_gate_fails_open_on_detector_fault() {
        let gate = SpeechGate::Enabled(Arc::new(FaultyVad));
        assert!(gate.is_speech(&[0u8; 64], 16000).await);
        assert!(gate.has_sufficient_speech(&[0u8; 32000], 16000, 250).await);
    }
}
