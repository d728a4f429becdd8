use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::stage::StageState;
use crate::playback::control::Control;

/// Lifecycle state of a playback session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Opened, graph not built yet.
    Idle,
    /// Graph built, resources checked.
    Ready,
    /// Prerolled, clock stopped.
    Paused,
    /// Data flowing.
    Playing,
    /// A fault exhausted its budget; `Play` rebuilds.
    Error,
    /// Torn down on request; `Play` rebuilds.
    Stopped,
}

impl SessionState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Paused => "paused",
            SessionState::Playing => "playing",
            SessionState::Error => "error",
            SessionState::Stopped => "stopped",
        }
    }

    /// Stage state every stage of the graph is driven to for this session state.
    pub fn stage_state(self) -> StageState {
        match self {
            SessionState::Ready => StageState::Ready,
            SessionState::Paused => StageState::Paused,
            SessionState::Playing => StageState::Playing,
            SessionState::Idle | SessionState::Error | SessionState::Stopped => StageState::Null,
        }
    }

    /// Return `true` while a graph is prerolled (Paused or Playing).
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Paused | SessionState::Playing)
    }

    /// Return `true` when the session has no graph and `Play` must rebuild one.
    pub fn needs_rebuild(self) -> bool {
        matches!(self, SessionState::Error | SessionState::Stopped)
    }

    /// Whether `control` may be requested in this state.
    pub fn accepts(self, control: &Control) -> bool {
        use SessionState::*;
        match control {
            Control::Play => matches!(self, Ready | Paused | Playing | Error | Stopped),
            Control::Pause => matches!(self, Ready | Paused | Playing),
            Control::Stop => !matches!(self, Stopped),
            Control::SeekTo(_) => self.is_running(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/state.rs"]
mod tests;
