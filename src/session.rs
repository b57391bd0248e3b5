//! Lifecycle of the paired messaging session.
//!
//! The bridge pushes [`SessionEvent`]s into a channel; [`SessionState::drive`]
//! is the only writer and applies them through the pure [`transition`]
//! function. HTTP handlers read snapshots through [`SessionState::status`].

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unpaired,
    Pairing(String),
    Ready,
}

/// Events the messaging client emits about its own lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PairingCode(String),
    Ready,
}

/// Snapshot served to the polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub ready: bool,
    pub pending_code: Option<String>,
}

/// Compute the next phase. `Ready` is terminal: re-pairing needs a restart.
pub fn transition(current: &SessionPhase, event: SessionEvent) -> SessionPhase {
    match (current, event) {
        (SessionPhase::Ready, SessionEvent::PairingCode(_)) => SessionPhase::Ready,
        (_, SessionEvent::PairingCode(code)) => SessionPhase::Pairing(code),
        (_, SessionEvent::Ready) => SessionPhase::Ready,
    }
}

#[derive(Debug)]
pub struct SessionState {
    phase: RwLock<SessionPhase>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(SessionPhase::Unpaired),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.phase.read(), SessionPhase::Ready)
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.phase.read() {
            SessionPhase::Unpaired => SessionStatus {
                ready: false,
                pending_code: None,
            },
            SessionPhase::Pairing(code) => SessionStatus {
                ready: false,
                pending_code: Some(code.clone()),
            },
            SessionPhase::Ready => SessionStatus {
                ready: true,
                pending_code: None,
            },
        }
    }

    /// Apply one event and return the resulting phase.
    pub fn apply(&self, event: SessionEvent) -> SessionPhase {
        let mut phase = self.phase.write();
        let next = transition(&phase, event.clone());

        match (&*phase, &event) {
            (SessionPhase::Ready, SessionEvent::PairingCode(_)) => {
                warn!("Ignoring pairing code: session is already linked");
            }
            (_, SessionEvent::PairingCode(_)) => {
                info!("Pairing code issued; scan it with the messaging app to link this gateway");
            }
            (SessionPhase::Ready, SessionEvent::Ready) => {}
            (_, SessionEvent::Ready) => {
                info!("Messaging session is ready; the manager can now complete setup");
            }
        }

        *phase = next.clone();
        next
    }

    /// Consume events until the sender side closes. `observe` sees every
    /// event before it is applied.
    pub async fn drive<F>(&self, mut events: mpsc::Receiver<SessionEvent>, mut observe: F)
    where
        F: FnMut(&SessionEvent),
    {
        while let Some(event) = events.recv().await {
            observe(&event);
            self.apply(event);
        }
        info!("Session event stream closed");
    }
}
