use std::time::Duration;

use serde::Serialize;

use crate::foundation::core::{Caps, FilterKind, MediaKind};
use crate::playback::state::SessionState;
use crate::recovery::{Fault, FaultKind, StageLabel};

/// How bad a fault is for the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recovered (or harmless); playback continues.
    Warning,
    /// The session moved to Error.
    Error,
}

/// Notification from a session worker. Delivered in occurrence order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// A requested transition completed.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// Something went wrong.
    Fault {
        /// Taxonomy entry.
        kind: FaultKind,
        /// Whether the session survived it.
        severity: Severity,
        /// Faulting stage, when there is one.
        stage: Option<StageLabel>,
        /// Details.
        message: String,
    },
    /// Every stream of the current URI ended.
    EndOfStream,
    /// A tag (or the duration) discovered by the source.
    MetadataDiscovered {
        /// Tag name.
        key: String,
        /// Tag value.
        value: String,
    },
    /// A branch saw `stream-start`.
    StreamStarted {
        /// Branch kind.
        kind: MediaKind,
    },
    /// A branch's port linked with this format.
    FormatNegotiated {
        /// Branch kind.
        kind: MediaKind,
        /// Negotiated format.
        caps: Caps,
    },
    /// A branch was given up; siblings are unaffected.
    BranchRejected {
        /// Branch kind.
        kind: MediaKind,
        /// Why.
        reason: String,
    },
    /// A seek completed.
    SeekDone {
        /// New position.
        position: Duration,
    },
    /// A new graph replaced the active one.
    BackendSwitched {
        /// Id of the new backend.
        backend: u32,
        /// Filters of the new backend.
        filters: Vec<FilterKind>,
        /// Position captured from the old graph.
        captured: Duration,
        /// Position the new graph resumed at.
        resumed_at: Duration,
    },
    /// Filter parameters reached a live filter stage.
    FilterApplied {
        /// Filter.
        filter: FilterKind,
        /// Band gains now in effect.
        bands: Vec<f64>,
    },
    /// Playback moved on to another URI.
    TrackChanged {
        /// The new URI.
        uri: String,
        /// Whether the graph was reused.
        gapless: bool,
    },
}

impl SessionEvent {
    /// Event describing `fault`.
    pub fn fault(fault: &Fault, severity: Severity) -> Self {
        SessionEvent::Fault {
            kind: fault.kind,
            severity,
            stage: fault.label.clone(),
            message: fault.message.clone(),
        }
    }

    /// New state, for `StateChanged`.
    pub fn new_state(&self) -> Option<SessionState> {
        match self {
            SessionEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        }
    }
}
