use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One window of PCM16 mono audio as delivered by a client.
///
/// The byte buffer holds little-endian 16-bit samples; `timestamp_ms` is the
/// client-supplied capture time (or the server arrival time when the client
/// omitted it, injected at the protocol boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioWindow {
    pub sample_rate: u32,
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
}

/// Result of one recognition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Byte length of `duration_ms` of PCM16 mono audio at `sample_rate`.
pub fn pcm16_bytes_for_ms(sample_rate: u32, duration_ms: u64) -> usize {
    (sample_rate as u64 * 2 * duration_ms / 1000) as usize
}
