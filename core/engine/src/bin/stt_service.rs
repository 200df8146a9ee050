use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use stt_engine::protocol::close_code;
use stt_engine::{
    AsrHttpClient, ClientMessage, EnergyVad, HealthChecker, Outbound, ProtocolDispatcher,
    RuntimeConfig, ServerMessage, SessionRegistry, SpeechGate, Transcriber,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
    transcriber: Arc<AsrHttpClient>,
    config: RuntimeConfig,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    asr_service: bool,
    vad_enabled: bool,
    active_sessions: usize,
}

/// Batch transcription request (base64 encoded WAV audio)
#[derive(Debug, Deserialize)]
struct TranscribeRequest {
    audio: String,
    #[serde(default)]
    language: Option<String>,
}

/// Batch transcription response
#[derive(Debug, Serialize)]
struct TranscribeResponse {
    success: bool,
    text: String,
    confidence: f32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => {
            println!("Loading config from: {}", path.display());
            RuntimeConfig::load_from_path(path).map_err(|e| anyhow::anyhow!("{}", e))?
        }
        None => {
            let default_path = PathBuf::from("stt_service_config.toml");
            if default_path.exists() {
                println!("Loading config from: {}", default_path.display());
                RuntimeConfig::load_from_path(&default_path)
                    .map_err(|e| anyhow::anyhow!("{}", e))?
            } else {
                println!("No config file found, using defaults");
                RuntimeConfig::default()
            }
        }
    };

    println!("Config loaded:");
    println!("  ASR URL: {}", config.asr.url);
    println!("  VAD enabled: {}", config.vad.enabled);
    println!(
        "  Chunk threshold: {} bytes",
        config.session.min_chunk_bytes()
    );

    let transcriber = Arc::new(
        AsrHttpClient::new(config.asr.url.clone(), config.asr.timeout_secs)
            .with_default_language(config.session.language.clone()),
    );
    let gate = if config.vad.enabled {
        SpeechGate::Enabled(Arc::new(EnergyVad::new(config.vad.energy_threshold)))
    } else {
        SpeechGate::Disabled
    };
    let registry = Arc::new(SessionRegistry::new(
        config.session.clone(),
        gate,
        transcriber.clone() as Arc<dyn Transcriber>,
    ));

    let app_state = AppState {
        registry,
        transcriber,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/transcribe", post(transcribe_handler))
        .route("/ws/stream", get(stream_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("{}:{}", config.service.host, config.service.port);
    println!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let checker = HealthChecker::new();
    let asr_health = checker.check_asr_service(&state.config.asr.url).await;

    Json(HealthResponse {
        status: "ok".to_string(),
        asr_service: asr_health.is_healthy,
        vad_enabled: state.config.vad.enabled,
        active_sessions: state.registry.len().await,
    })
}

/// Batch transcription endpoint: one WAV file in, one transcript out
async fn transcribe_handler(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Result<Json<TranscribeResponse>, (StatusCode, String)> {
    let bytes = BASE64
        .decode(&request.audio)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid base64 audio: {}", e)))?;

    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unsupported audio format: {}", e),
        )
    })?;
    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "Expected 16-bit mono PCM WAV".to_string(),
        ));
    }

    let mut pcm = Vec::new();
    for sample in reader.into_samples::<i16>() {
        let sample =
            sample.map_err(|e| (StatusCode::BAD_REQUEST, format!("Corrupt WAV payload: {}", e)))?;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }

    let language = request
        .language
        .or_else(|| state.config.session.language.clone());
    let transcript = state
        .transcriber
        .transcribe(pcm, spec.sample_rate, language)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Transcription failed: {}", e),
            )
        })?;

    Ok(Json(TranscribeResponse {
        success: true,
        text: transcript.text,
        confidence: transcript.confidence,
    }))
}

/// WebSocket endpoint for real-time streaming transcription
async fn stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    // The writer task owns the sink; sessions and the reader only queue.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            eprintln!("[WS] failed to encode message: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let dispatcher = ProtocolDispatcher::new(
        state.config.session.sample_rate,
        state.config.session.default_grace_period_ms,
    );

    // The first message must be `connect`
    let first = match stream.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => {
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
    };

    let session = match dispatcher.decode(&first) {
        Ok(ClientMessage::Connect { session_id }) => {
            let handle = state.registry.create(session_id, outbound_tx.clone()).await;
            let _ = outbound_tx.send(Outbound::Message(ServerMessage::Connected {
                session_id: handle.id().to_string(),
            }));
            eprintln!("[WS] connected: {}", handle.id());
            handle
        }
        Ok(_) => {
            eprintln!("[WS] expected connect as the first message");
            let _ = outbound_tx.send(Outbound::Close {
                code: close_code::POLICY_VIOLATION,
                reason: "Invalid initial message".to_string(),
            });
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
        Err(e) => {
            eprintln!("[WS] invalid initial message: {}", e);
            let _ = outbound_tx.send(Outbound::Close {
                code: close_code::POLICY_VIOLATION,
                reason: "Invalid initial message".to_string(),
            });
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
    };

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match dispatcher.decode(&text) {
                Ok(message) => dispatcher.dispatch(message, &session),
                // Malformed JSON never tears the connection down
                Err(e) => eprintln!("[WS] {}: ignoring invalid JSON: {}", session.id(), e),
            },
            Some(Ok(Message::Close(_))) | None => break,
            // Binary frames and pings are not part of the protocol
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                eprintln!("[WS] {}: read error: {}", session.id(), e);
                let _ = outbound_tx.send(Outbound::Close {
                    code: close_code::INTERNAL_ERROR,
                    reason: "Internal server error".to_string(),
                });
                break;
            }
        }
    }

    // Best-effort final flush happens inside the session task
    session.teardown();
    state.registry.remove(session.id()).await;
    drop(outbound_tx);
    let _ = writer.await;
    eprintln!("[WS] disconnected: {}", session.id());
}
