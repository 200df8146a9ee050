pub mod asr_client;
pub mod config;
pub mod error;
pub mod health_check;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod speech_gate;
pub mod transcriber;
pub mod types;

pub use asr_client::AsrHttpClient;
pub use config::{RuntimeConfig, SessionConfig};
pub use error::{ServiceError, ServiceResult};
pub use health_check::{HealthChecker, ServiceHealth};
pub use protocol::{ClientMessage, Outbound, ProtocolDispatcher, ServerMessage};
pub use registry::SessionRegistry;
pub use session::{spawn_session, SessionCommand, SessionHandle, SilenceTimer, StreamingSession};
pub use speech_gate::{EnergyVad, SpeechGate, VoiceActivityDetector};
pub use transcriber::Transcriber;
pub use types::{AudioWindow, Transcript};
