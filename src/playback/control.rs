use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::foundation::core::FilterKind;

/// Transport request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Start or resume data flow (rebuilds after Stop or Error).
    Play,
    /// Preroll and hold.
    Pause,
    /// Tear the graph down; preempts a transition in flight.
    Stop,
    /// Flush and reposition; valid while Paused or Playing.
    SeekTo(Duration),
}

/// What happens when every stream of the current URI ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EosPolicy {
    /// Tear down and report Stopped.
    #[default]
    Stop,
    /// Seek back to the start on the same graph.
    Loop,
    /// Play the next queued URI, reusing the graph when its layout matches.
    Advance,
}

/// Everything the worker can be asked to do.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Command {
    Control(Control),
    SetParam {
        filter: String,
        param: String,
        value: f64,
    },
    ApplyPreset(String),
    SwitchBackend(Vec<FilterKind>),
    SetEosPolicy(EosPolicy),
    Enqueue(String),
    SetVolume(f64),
    Shutdown,
}

impl Command {
    /// Return `true` for requests that preempt a transition in flight.
    pub(crate) fn preempts(&self) -> bool {
        matches!(self, Command::Control(Control::Stop) | Command::Shutdown)
    }
}
