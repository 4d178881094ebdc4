use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::analyser::AnalyserNode;
use crate::error::ErrorReport;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    /// Connected, the AI is silent.
    Listening,
    /// Connected, AI audio is playing.
    AiSpeaking,
    Error,
}

/// The coarse status shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl Phase {
    pub fn status(self) -> ConnectionStatus {
        match self {
            Phase::Idle => ConnectionStatus::Idle,
            Phase::Connecting => ConnectionStatus::Connecting,
            Phase::Listening | Phase::AiSpeaking => ConnectionStatus::Connected,
            Phase::Error => ConnectionStatus::Error,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Phase::Listening | Phase::AiSpeaking)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of a session as seen from outside. At most one error is held;
/// a newer error replaces it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SessionState {
    phase: Phase,
    error: Option<ErrorReport>,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> ConnectionStatus {
        self.phase.status()
    }

    pub fn error(&self) -> Option<&ErrorReport> {
        self.error.as_ref()
    }

    pub fn is_speaking(&self) -> bool {
        self.phase == Phase::AiSpeaking
    }
}

#[derive(Clone)]
pub(crate) struct Taps {
    pub input: AnalyserNode,
    pub output: AnalyserNode,
}

/// State shared between the handle and the session task.
pub(crate) struct Shared {
    state: watch::Sender<SessionState>,
    taps: Mutex<Option<Taps>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state,
            taps: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Starts a new attempt: clears any previous error.
    pub(crate) fn connecting(&self) {
        self.state.send_replace(SessionState {
            phase: Phase::Connecting,
            error: None,
        });
    }

    /// Moves between connected phases; ignored once the session has left
    /// them.
    pub(crate) fn set_connected_phase(&self, phase: Phase) {
        self.state.send_if_modified(|state| {
            let allowed = state.phase == Phase::Connecting || state.phase.is_connected();
            if !allowed || state.phase == phase {
                return false;
            }
            state.phase = phase;
            true
        });
    }

    pub(crate) fn idle(&self) {
        self.state.send_modify(|state| {
            state.phase = Phase::Idle;
            state.error = None;
        });
    }

    pub(crate) fn fail(&self, report: ErrorReport) {
        self.state.send_modify(|state| {
            state.phase = Phase::Error;
            state.error = Some(report);
        });
    }

    pub(crate) fn set_taps(&self, taps: Option<Taps>) {
        *self.taps.lock().unwrap_or_else(PoisonError::into_inner) = taps;
    }

    pub(crate) fn taps(&self) -> Option<Taps> {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
