//! Wire protocol of the streaming endpoint.
//!
//! JSON payloads over a persistent bidirectional connection, tagged by a
//! snake_case `type` field with camelCase payload fields. Decoding, base64
//! audio unpacking and the wall-clock fallback for omitted chunk timestamps
//! all happen here, at the boundary; session logic never consults the clock
//! to compare timestamps.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};
use crate::session::SessionHandle;
use crate::types::{now_ms, AudioWindow};

/// WebSocket close codes used by the service.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Messages received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Connect {
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AudioChunk {
        /// Base64 encoded PCM16 mono audio
        chunk: String,
        /// Capture timestamp in milliseconds; server arrival time when omitted
        #[serde(default)]
        timestamp: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    FlushBuffer {
        #[serde(default)]
        cutoff_timestamp: Option<u64>,
        #[serde(default)]
        grace_period_ms: Option<u64>,
    },
    EndStream,
}

/// Messages sent to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { session_id: String },
    #[serde(rename_all = "camelCase")]
    Transcription {
        session_id: String,
        text: String,
        confidence: f32,
        timestamp: u64,
        #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
        is_final: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Error { session_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    BufferFlushed { session_id: String },
    #[serde(rename_all = "camelCase")]
    StreamEnded { session_id: String },
}

/// What the connection's writer task should do next.
#[derive(Debug)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

/// Decodes inbound frames and routes them to the owning session.
pub struct ProtocolDispatcher {
    sample_rate: u32,
    default_grace_period_ms: u64,
}

impl ProtocolDispatcher {
    pub fn new(sample_rate: u32, default_grace_period_ms: u64) -> Self {
        Self {
            sample_rate,
            default_grace_period_ms,
        }
    }

    pub fn decode(&self, raw: &str) -> Result<ClientMessage, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Unpack an audio payload into a window, stamping it with the server
    /// arrival time when the client sent no timestamp.
    pub fn audio_window(
        &self,
        chunk_b64: &str,
        timestamp: Option<u64>,
    ) -> ServiceResult<AudioWindow> {
        let data = BASE64
            .decode(chunk_b64)
            .map_err(|e| ServiceError::new(format!("Invalid base64 audio payload: {}", e)))?;
        Ok(AudioWindow {
            sample_rate: self.sample_rate,
            data,
            timestamp_ms: timestamp.unwrap_or_else(now_ms),
        })
    }

    /// Route one decoded message to the session. Protocol-level faults are
    /// logged and swallowed; they never tear the connection down.
    pub fn dispatch(&self, message: ClientMessage, session: &SessionHandle) {
        match message {
            ClientMessage::Connect { .. } => {
                // Only valid as the first message; the transport handles that.
                eprintln!(
                    "[WS] {}: ignoring connect on an established stream",
                    session.id()
                );
            }
            ClientMessage::AudioChunk { chunk, timestamp } => {
                match self.audio_window(&chunk, timestamp) {
                    Ok(window) => {
                        if !window.data.is_empty() {
                            session.chunk(window);
                        }
                    }
                    Err(e) => {
                        eprintln!("[WS] {}: {}", session.id(), e);
                    }
                }
            }
            ClientMessage::FlushBuffer {
                cutoff_timestamp,
                grace_period_ms,
            } => {
                session.flush(
                    cutoff_timestamp,
                    grace_period_ms.unwrap_or(self.default_grace_period_ms),
                );
            }
            ClientMessage::EndStream => {
                session.end_stream();
            }
        }
    }
}
