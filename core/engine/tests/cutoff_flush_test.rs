// tests/cutoff_flush_test.rs
// Cutoff-flush protocol: the grace period absorbs in-flight chunks stamped at
// or before the cutoff, drops everything stamped after it, and a flush is
// single-flight per session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use stt_engine::{
    spawn_session, AudioWindow, Outbound, ServerMessage, ServiceResult, SessionConfig, SpeechGate,
    Transcriber, Transcript,
};

struct RecordingTranscriber {
    calls: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTranscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call_len(&self, index: usize) -> usize {
        self.calls.lock().unwrap()[index].len()
    }
}

#[async_trait]
impl Transcriber for RecordingTranscriber {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        _sample_rate: u32,
        _language: Option<String>,
    ) -> ServiceResult<Transcript> {
        self.calls.lock().unwrap().push(audio);
        Ok(Transcript {
            text: "bounded utterance".to_string(),
            confidence: 0.9,
        })
    }
}

fn window(bytes: usize, timestamp_ms: u64) -> AudioWindow {
    AudioWindow {
        sample_rate: 16000,
        data: vec![1u8; bytes],
        timestamp_ms,
    }
}

async fn recv_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ServerMessage {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(Outbound::Message(message))) => message,
        other => panic!("expected an outbound message, got {:?}", other),
    }
}

#[tokio::test]
async fn cutoff_excludes_late_chunks_and_absorbs_in_flight_ones() {
    let transcriber = RecordingTranscriber::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = spawn_session(
        "c1".to_string(),
        SessionConfig::default(),
        SpeechGate::Disabled,
        transcriber.clone(),
        outbound_tx,
    );

    session.chunk(window(16000, 1000));
    session.flush(Some(1000), 300);

    // Arriving mid-grace: stamped after the cutoff, must be excluded
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.chunk(window(16000, 1200));
    // Stamped before the cutoff: still absorbed into the flush
    session.chunk(window(4000, 900));

    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(
        message,
        ServerMessage::Transcription {
            is_final: Some(true),
            ..
        }
    ));
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::BufferFlushed { .. }));

    assert_eq!(transcriber.call_count(), 1);
    assert_eq!(transcriber.call_len(0), 20000);

    // The cutoff is gone afterwards: a late-stamped chunk buffers again and
    // an explicit flush picks it up
    session.chunk(window(16000, 5000));
    session.flush(None, 0);
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::Transcription { .. }));
    assert_eq!(transcriber.call_len(1), 16000);
}

#[tokio::test]
async fn second_flush_during_grace_is_rejected() {
    let transcriber = RecordingTranscriber::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = spawn_session(
        "c2".to_string(),
        SessionConfig::default(),
        SpeechGate::Disabled,
        transcriber.clone(),
        outbound_tx,
    );

    session.chunk(window(16000, 500));
    session.flush(Some(1000), 300);
    session.flush(None, 0);

    // The rejection arrives before the grace period resolves
    let message = recv_message(&mut outbound_rx).await;
    match message {
        ServerMessage::Error { message, .. } => {
            assert!(message.contains("flush already in progress"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    // The pending cutoff flush still completes
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(
        message,
        ServerMessage::Transcription {
            is_final: Some(true),
            ..
        }
    ));
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::BufferFlushed { .. }));
    assert_eq!(transcriber.call_count(), 1);
}

#[tokio::test]
async fn repeated_flush_without_new_audio_is_a_noop() {
    let transcriber = RecordingTranscriber::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = spawn_session(
        "c3".to_string(),
        SessionConfig::default(),
        SpeechGate::Disabled,
        transcriber.clone(),
        outbound_tx,
    );

    session.chunk(window(20000, 0));
    session.flush(None, 0);
    session.flush(None, 0);

    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::Transcription { .. }));
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::BufferFlushed { .. }));
    // The second flush only confirms; nothing is transcribed twice
    let message = recv_message(&mut outbound_rx).await;
    assert!(matches!(message, ServerMessage::BufferFlushed { .. }));
    assert_eq!(transcriber.call_count(), 1);
}
