//! Per-connection streaming session.
//!
//! All state of one session is owned by one tokio task consuming a
//! `SessionCommand` queue; protocol messages, silence-timer fires and
//! grace-period continuations all arrive through that queue, so buffers and
//! counters are mutated on a single logical sequence and need no locks.

mod silence_timer;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::protocol::{close_code, Outbound, ServerMessage};
use crate::speech_gate::SpeechGate;
use crate::transcriber::Transcriber;
use crate::types::{now_ms, AudioWindow};

pub use silence_timer::SilenceTimer;

/// Inputs of the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// One decoded audio window from the client.
    Chunk(AudioWindow),
    /// Explicit flush request; with a cutoff this starts a grace period.
    Flush {
        cutoff_ms: Option<u64>,
        grace_period_ms: u64,
    },
    /// Grace period of a cutoff flush elapsed.
    CutoffElapsed { generation: u64 },
    /// Silence timer fired.
    SilenceElapsed { generation: u64 },
    /// Client requested a clean end of stream.
    EndStream,
    /// Transport is gone; final best-effort flush.
    Teardown,
}

/// Cheap clonable address of a spawned session task.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chunk(&self, window: AudioWindow) {
        let _ = self.commands.send(SessionCommand::Chunk(window));
    }

    pub fn flush(&self, cutoff_ms: Option<u64>, grace_period_ms: u64) {
        let _ = self.commands.send(SessionCommand::Flush {
            cutoff_ms,
            grace_period_ms,
        });
    }

    pub fn end_stream(&self) {
        let _ = self.commands.send(SessionCommand::EndStream);
    }

    pub fn teardown(&self) {
        let _ = self.commands.send(SessionCommand::Teardown);
    }
}

/// Spawn the task owning one session and return its handle.
pub fn spawn_session(
    id: String,
    config: SessionConfig,
    gate: SpeechGate,
    transcriber: Arc<dyn Transcriber>,
    outbound: mpsc::UnboundedSender<Outbound>,
) -> SessionHandle {
    let (commands, mut rx) = mpsc::unbounded_channel();
    let handle = SessionHandle {
        id: id.clone(),
        commands: commands.clone(),
    };
    let mut session = StreamingSession::new(id, config, gate, transcriber, outbound, commands);

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if !session.handle_command(command).await {
                break;
            }
        }
    });

    handle
}

/// State machine of one streaming connection.
pub struct StreamingSession {
    id: String,
    config: SessionConfig,
    gate: SpeechGate,
    transcriber: Arc<dyn Transcriber>,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Sender of the session's own command queue; timer fires and grace
    /// continuations are routed back through it.
    commands: mpsc::UnboundedSender<SessionCommand>,

    /// Everything accepted since the last consumption point.
    raw_buffer: Vec<u8>,
    /// Speech-classified windows only; maintained only when VAD is enabled.
    speech_buffer: Vec<u8>,
    active: bool,
    last_chunk_at: Option<Instant>,
    consecutive_silence: u32,
    /// When set, chunks stamped after it are dropped without buffering.
    flush_cutoff_ms: Option<u64>,
    cutoff_generation: u64,
    timer: SilenceTimer,
}

impl StreamingSession {
    pub fn new(
        id: String,
        config: SessionConfig,
        gate: SpeechGate,
        transcriber: Arc<dyn Transcriber>,
        outbound: mpsc::UnboundedSender<Outbound>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            id,
            config,
            gate,
            transcriber,
            outbound,
            commands,
            raw_buffer: Vec::new(),
            speech_buffer: Vec::new(),
            active: true,
            last_chunk_at: None,
            consecutive_silence: 0,
            flush_cutoff_ms: None,
            cutoff_generation: 0,
            timer: SilenceTimer::new(),
        }
    }

    /// Dispatch one command; returns false when the session task should stop.
    pub async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Chunk(window) => {
                self.accept_chunk(window).await;
                true
            }
            SessionCommand::Flush {
                cutoff_ms,
                grace_period_ms,
            } => {
                self.handle_flush(cutoff_ms, grace_period_ms).await;
                true
            }
            SessionCommand::CutoffElapsed { generation } => {
                self.finish_cutoff_flush(generation).await;
                true
            }
            SessionCommand::SilenceElapsed { generation } => {
                self.on_silence_timeout(generation).await;
                true
            }
            SessionCommand::EndStream => {
                self.end_stream().await;
                false
            }
            SessionCommand::Teardown => {
                self.teardown().await;
                false
            }
        }
    }

    /// Buffer one audio window and evaluate the segmentation policy.
    pub async fn accept_chunk(&mut self, window: AudioWindow) {
        if !self.active || window.data.is_empty() {
            return;
        }
        if let Some(cutoff) = self.flush_cutoff_ms {
            if window.timestamp_ms > cutoff {
                eprintln!(
                    "[Session] {}: dropped chunk past cutoff ({} > {})",
                    self.id, window.timestamp_ms, cutoff
                );
                return;
            }
        }

        self.raw_buffer.extend_from_slice(&window.data);
        self.last_chunk_at = Some(Instant::now());
        self.timer.arm(
            &self.commands,
            Duration::from_millis(self.config.silence_timeout_ms),
        );

        if self.gate.is_enabled() {
            if self.gate.is_speech(&window.data, window.sample_rate).await {
                self.speech_buffer.extend_from_slice(&window.data);
                self.consecutive_silence = 0;
            } else {
                self.consecutive_silence += 1;
                if !self.speech_buffer.is_empty() && self.consecutive_silence >= 2 {
                    eprintln!(
                        "[Session] {}: trailing silence, flushing {} speech bytes",
                        self.id,
                        self.speech_buffer.len()
                    );
                    self.flush_buffer(false).await;
                    return;
                }
            }
        }

        // Size threshold pre-empts the silence timer.
        if self.active_buffer_len() >= self.config.min_chunk_bytes() {
            self.flush_buffer(false).await;
        }
    }

    /// Silence timer fired. Stale fires (superseded by a newer chunk) and
    /// fires arriving before the quiet window has actually elapsed are no-ops.
    pub async fn on_silence_timeout(&mut self, generation: u64) {
        if !self.active || !self.timer.is_current(generation) {
            return;
        }
        let Some(last) = self.last_chunk_at else {
            return;
        };
        if last.elapsed() < Duration::from_millis(self.config.silence_timeout_ms) {
            return;
        }
        // A flush always clears; below the floor the buffer is kept so the
        // next chunk can still complete it.
        if self.active_buffer_len() < self.config.min_flush_bytes() {
            return;
        }
        eprintln!(
            "[Session] {}: silence timeout, flushing {} bytes",
            self.id,
            self.active_buffer_len()
        );
        self.flush_buffer(false).await;
    }

    /// Explicit flush request from the client.
    pub async fn handle_flush(&mut self, cutoff_ms: Option<u64>, grace_period_ms: u64) {
        if !self.active {
            return;
        }
        if self.flush_cutoff_ms.is_some() {
            // Single-flight: one cutoff flush at a time.
            let message = ServerMessage::Error {
                session_id: self.id.clone(),
                message: "flush already in progress".to_string(),
            };
            self.send(message);
            return;
        }

        match cutoff_ms {
            None => {
                self.flush_buffer(true).await;
                let message = ServerMessage::BufferFlushed {
                    session_id: self.id.clone(),
                };
                self.send(message);
            }
            Some(cutoff) => {
                // Chunks stamped at or before the cutoff may still be in
                // flight; keep accepting them for the grace period, then
                // finalize. The wait is a delayed continuation into our own
                // queue, never a blocking sleep.
                self.flush_cutoff_ms = Some(cutoff);
                self.timer.cancel();
                self.cutoff_generation += 1;
                let generation = self.cutoff_generation;
                let commands = self.commands.clone();
                let grace = Duration::from_millis(grace_period_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = commands.send(SessionCommand::CutoffElapsed { generation });
                });
            }
        }
    }

    /// Grace period of a cutoff flush elapsed; evaluate and clear.
    pub async fn finish_cutoff_flush(&mut self, generation: u64) {
        if generation != self.cutoff_generation {
            return;
        }
        if !self.active {
            self.flush_cutoff_ms = None;
            return;
        }
        self.flush_buffer(true).await;
        // Cleared unconditionally once the flush that set it is done, so
        // subsequent chunks flow again.
        self.flush_cutoff_ms = None;
        let message = ServerMessage::BufferFlushed {
            session_id: self.id.clone(),
        };
        self.send(message);
    }

    /// Evaluate, transcribe and clear the active buffer.
    ///
    /// The buffers are taken before any await so a flush can never leave them
    /// partially consumed: it either clears-and-emits or clears-and-emits
    /// nothing. `is_final` marks client-driven flushes in the emitted event.
    pub async fn flush_buffer(&mut self, is_final: bool) {
        self.timer.cancel();

        let buffer = if self.gate.is_enabled() {
            self.raw_buffer.clear();
            std::mem::take(&mut self.speech_buffer)
        } else {
            self.speech_buffer.clear();
            std::mem::take(&mut self.raw_buffer)
        };
        self.consecutive_silence = 0;

        if buffer.len() < self.config.min_flush_bytes() {
            if !buffer.is_empty() {
                eprintln!(
                    "[Session] {}: discarded {} bytes below the {}ms floor",
                    self.id,
                    buffer.len(),
                    self.config.min_speech_duration_ms
                );
            }
            return;
        }
        if !self
            .gate
            .has_sufficient_speech(
                &buffer,
                self.config.sample_rate,
                self.config.min_speech_duration_ms,
            )
            .await
        {
            eprintln!(
                "[Session] {}: insufficient speech in {} bytes, discarded",
                self.id,
                buffer.len()
            );
            return;
        }

        let byte_len = buffer.len();
        match self
            .transcriber
            .transcribe(buffer, self.config.sample_rate, self.config.language.clone())
            .await
        {
            Ok(transcript) => {
                if transcript.text.trim().is_empty() {
                    return;
                }
                eprintln!(
                    "[Session] {}: transcribed {} bytes -> {} chars",
                    self.id,
                    byte_len,
                    transcript.text.len()
                );
                let message = ServerMessage::Transcription {
                    session_id: self.id.clone(),
                    text: transcript.text,
                    confidence: transcript.confidence,
                    timestamp: now_ms(),
                    is_final: if is_final { Some(true) } else { None },
                };
                self.send(message);
            }
            Err(e) => {
                eprintln!("[Session] {}: transcription failed: {}", self.id, e);
                let message = ServerMessage::Error {
                    session_id: self.id.clone(),
                    message: e.to_string(),
                };
                self.send(message);
            }
        }
    }

    /// Clean client-driven shutdown: final flush, confirmation, close frame.
    pub async fn end_stream(&mut self) {
        if !self.active {
            return;
        }
        self.flush_buffer(true).await;
        let message = ServerMessage::StreamEnded {
            session_id: self.id.clone(),
        };
        self.send(message);
        self.send_close(close_code::NORMAL, "Stream ended normally");
        self.deactivate();
    }

    /// Transport is gone: best-effort final flush, then deactivate.
    pub async fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.flush_buffer(true).await;
        self.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn active_buffer_len(&self) -> usize {
        if self.gate.is_enabled() {
            self.speech_buffer.len()
        } else {
            self.raw_buffer.len()
        }
    }

    fn deactivate(&mut self) {
        self.timer.cancel();
        self.active = false;
    }

    fn send(&mut self, message: ServerMessage) {
        if !self.active {
            return;
        }
        if self.outbound.send(Outbound::Message(message)).is_err() {
            eprintln!("[Session] {}: peer gone, suppressing further sends", self.id);
            self.deactivate();
        }
    }

    fn send_close(&mut self, code: u16, reason: &str) {
        if !self.active {
            return;
        }
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}
