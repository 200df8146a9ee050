//! Cancellable single-shot silence trigger.
//!
//! At most one timer is live per session. Every arm and every cancel bumps a
//! generation counter; a fire carries the generation it was armed with and is
//! discarded by the session unless it still matches. Aborting the task is
//! best-effort; the generation check is what makes stale fires harmless.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SessionCommand;

pub struct SilenceTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl SilenceTimer {
    pub fn new() -> Self {
        Self {
            generation: 0,
            handle: None,
        }
    }

    /// Replace any previously armed timer with a fresh one. The fire is
    /// delivered into the owning session's command queue, never executed on
    /// the timer task itself.
    pub fn arm(&mut self, commands: &mpsc::UnboundedSender<SessionCommand>, delay: Duration) {
        self.cancel();
        let generation = self.generation;
        let commands = commands.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(SessionCommand::SilenceElapsed { generation });
        }));
    }

    /// Idempotent; also invalidates a fire already queued but not yet
    /// processed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether a fire with this generation belongs to the live timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && generation == self.generation
    }
}

impl Default for SilenceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SilenceTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
