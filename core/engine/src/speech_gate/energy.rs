//! Energy-based voice-activity detection.
//!
//! A lightweight stand-in for a model-backed detector: windows the chunk the
//! same way a frame-based model would (512 samples, 50% overlap) and scores
//! each window by RMS energy instead of a network forward pass.

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::speech_gate::VoiceActivityDetector;

/// Analysis window in samples (32ms at 16kHz).
const WINDOW_SAMPLES: usize = 512;

/// Fraction of windows that must exceed the threshold for the chunk to count
/// as speech.
const SPEECH_WINDOW_RATIO: f32 = 0.3;

pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    /// `threshold` is an RMS level on samples normalized to [-1.0, 1.0];
    /// typical speech sits well above 0.01, line noise below it.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn rms(window: &[f32]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = window.iter().map(|s| s * s).sum();
        (sum_squares / window.len() as f32).sqrt()
    }
}

#[async_trait]
impl VoiceActivityDetector for EnergyVad {
    async fn is_speech(&self, chunk: &[u8], _sample_rate: u32) -> ServiceResult<bool> {
        let mut samples: Vec<f32> = chunk
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        // Pad short chunks to one full window.
        if samples.len() < WINDOW_SAMPLES {
            samples.resize(WINDOW_SAMPLES, 0.0);
        }

        let step = WINDOW_SAMPLES / 2;
        let mut speech_windows = 0usize;
        let mut total_windows = 0usize;

        let mut start = 0;
        while start + WINDOW_SAMPLES <= samples.len() {
            let window = &samples[start..start + WINDOW_SAMPLES];
            total_windows += 1;
            if Self::rms(window) >= self.threshold {
                speech_windows += 1;
            }
            start += step;
        }

        if total_windows == 0 {
            // Cannot happen after padding; classify as speech rather than
            // silently dropping audio.
            return Ok(true);
        }

        Ok(speech_windows as f32 / total_windows as f32 >= SPEECH_WINDOW_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn test_silence_is_not_speech() {
        let vad = EnergyVad::new(0.01);
        let chunk = pcm16(&[0i16; 4096]);
        assert!(!vad.is_speech(&chunk, 16000).await.unwrap());
    }

    #[tokio::test]
    async fn test_loud_signal_is_speech() {
        let vad = EnergyVad::new(0.01);
        // Square wave at half amplitude, RMS ~0.5
        let samples: Vec<i16> = (0..4096)
            .map(|i| if i % 2 == 0 { 16000 } else { -16000 })
            .collect();
        let chunk = pcm16(&samples);
        assert!(vad.is_speech(&chunk, 16000).await.unwrap());
    }

    #[tokio::test]
    async fn test_short_chunk_is_padded_not_rejected() {
        let vad = EnergyVad::new(0.01);
        // 100 samples of silence, shorter than one window
        let chunk = pcm16(&[0i16; 100]);
        assert!(!vad.is_speech(&chunk, 16000).await.unwrap());
    }

    #[tokio::test]
    async fn test_mostly_silent_chunk_is_silence() {
        let vad = EnergyVad::new(0.01);
        // One loud window inside ~4 seconds of silence stays below the 30%
        // window ratio.
        let mut samples = vec![0i16; 65536];
        for (i, sample) in samples.iter_mut().take(512).enumerate() {
            *sample = if i % 2 == 0 { 16000 } else { -16000 };
        }
        let chunk = pcm16(&samples);
        assert!(!vad.is_speech(&chunk, 16000).await.unwrap());
    }
}
