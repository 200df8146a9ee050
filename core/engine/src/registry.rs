//! Concurrent registry of live streaming sessions.
//!
//! The only structure genuinely shared across connection tasks. It owns
//! session creation, lookup and removal; serialization *within* a session is
//! the session task's own discipline.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::protocol::Outbound;
use crate::session::{spawn_session, SessionHandle};
use crate::speech_gate::SpeechGate;
use crate::transcriber::Transcriber;

pub struct SessionRegistry {
    config: SessionConfig,
    gate: SpeechGate,
    transcriber: Arc<dyn Transcriber>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, gate: SpeechGate, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            config,
            gate,
            transcriber,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn and register a session. A missing or empty id gets a generated
    /// one; a colliding id replaces the previous session, which is torn down.
    pub async fn create(
        &self,
        requested_id: Option<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> SessionHandle {
        let id = requested_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let handle = spawn_session(
            id.clone(),
            self.config.clone(),
            self.gate.clone(),
            Arc::clone(&self.transcriber),
            outbound,
        );

        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.insert(id.clone(), handle.clone()) {
            eprintln!("[Registry] replacing session with colliding id: {}", id);
            previous.teardown();
        }
        eprintln!("[Registry] created streaming session: {}", id);
        handle
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            eprintln!("[Registry] removed streaming session: {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
