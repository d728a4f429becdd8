use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::foundation::core::{Caps, CapsTemplate, MediaKind, Role, SessionId, SurfaceHandle};
use crate::graph::arbiter::DeviceArbiter;

/// Lifecycle state of a stage (and, when uniform, of a whole graph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageState {
    /// Nothing allocated.
    Null,
    /// Resources checked, nothing flowing.
    Ready,
    /// Devices acquired, data prerolled, clock stopped.
    Paused,
    /// Data flowing.
    Playing,
}

impl StageState {
    /// Next state one step from `self` towards `target`.
    pub fn step_towards(self, target: StageState) -> Option<StageState> {
        use StageState::*;
        let order = [Null, Ready, Paused, Playing];
        let cur = order.iter().position(|s| *s == self)?;
        let dst = order.iter().position(|s| *s == target)?;
        match cur.cmp(&dst) {
            std::cmp::Ordering::Less => Some(order[cur + 1]),
            std::cmp::Ordering::Greater => Some(order[cur - 1]),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// One unit of media data.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    /// Format of the payload.
    pub caps: Caps,
    /// Presentation timestamp.
    pub pts: Duration,
    /// Time covered by the buffer.
    pub duration: Duration,
    /// Interleaved audio samples; empty for video.
    pub samples: Vec<f32>,
    /// Audio sample rate (0 for video).
    pub rate: u32,
    /// Audio channel count (0 for video).
    pub channels: usize,
    /// Video frames covered (0 for audio).
    pub frames: u32,
    /// Payload is damaged and cannot be decoded.
    pub corrupt: bool,
}

impl Buffer {
    /// Audio buffer.
    pub fn audio(caps: Caps, pts: Duration, samples: Vec<f32>, rate: u32, channels: usize) -> Self {
        let frames = samples.len() / channels.max(1);
        let duration =
            Duration::from_nanos(frames as u64 * 1_000_000_000 / u64::from(rate.max(1)));
        Self {
            caps,
            pts,
            duration,
            samples,
            rate,
            channels,
            frames: 0,
            corrupt: false,
        }
    }

    /// Video buffer covering `frames` pictures.
    pub fn video(caps: Caps, pts: Duration, duration: Duration, frames: u32) -> Self {
        Self {
            caps,
            pts,
            duration,
            samples: Vec::new(),
            rate: 0,
            channels: 0,
            frames,
            corrupt: false,
        }
    }

    /// Stream kind of the payload.
    pub fn kind(&self) -> MediaKind {
        self.caps.kind
    }
}

/// What a freshly discovered source port announces, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum PortEvent {
    /// A new stream begins on the port.
    StreamStart,
    /// The format of the stream.
    Format(Caps),
    /// Media data.
    Data(Buffer),
}

/// Stage-level failure raised from a state change or from data processing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFault {
    /// A device or output surface is held elsewhere.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    /// The implementation behind the stage is gone or cannot be loaded.
    #[error("missing stage: {0}")]
    Missing(String),

    /// One buffer could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Anything else.
    #[error("{0}")]
    Failed(String),
}

/// Result of asking a stage to change state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// The stage is in the new state.
    Complete,
    /// The stage finishes asynchronously; poll with [`Stage::poll_state`].
    Async,
}

/// Environment handed to stages while they change state.
pub struct StageContext<'a> {
    /// Owning session.
    pub session: SessionId,
    /// Resolved configuration.
    pub config: &'a PipelineConfig,
    /// Exclusive device registry.
    pub arbiter: &'a Arc<DeviceArbiter>,
    /// Output surface for video sinks, if the caller supplied one.
    pub surface: Option<SurfaceHandle>,
}

/// A processing unit inside a graph.
///
/// All methods run on the session worker (or, for `process`, on the branch pool); a
/// stage never sees concurrent calls.
pub trait Stage: Send {
    /// Move from `from` to the adjacent state `to`.
    fn change_state(
        &mut self,
        _from: StageState,
        _to: StageState,
        _ctx: &StageContext<'_>,
    ) -> Result<StateChange, StageFault> {
        Ok(StateChange::Complete)
    }

    /// Poll an asynchronous state change; `Ok(true)` once it completed.
    fn poll_state(&mut self) -> Result<bool, StageFault> {
        Ok(true)
    }

    /// Return `false` to refuse a format offered on the input port.
    fn accepts(&self, _caps: &Caps) -> bool {
        true
    }

    /// Output format produced for `input`.
    fn output_caps(&self, input: &Caps) -> Caps {
        *input
    }

    /// Transform one buffer. `Ok(None)` swallows it.
    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>, StageFault> {
        Ok(Some(buffer))
    }

    /// Drop any buffered data (seek).
    fn flush(&mut self) {}

    /// Set a named numeric property; `false` when the property does not exist.
    fn set_property(&mut self, _name: &str, _value: f64) -> bool {
        false
    }

    /// Read a named numeric property.
    fn property(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Creates stages of one implementation.
pub trait StageFactory: Send + Sync {
    /// Name used in fallback chains.
    fn name(&self) -> &str;

    /// Role the created stages play.
    fn role(&self) -> Role;

    /// Return `true` when the factory can serve a branch of `kind`.
    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    /// Return `false` when the configuration rules this implementation out.
    fn is_available(&self, _config: &PipelineConfig) -> bool {
        true
    }

    /// Instantiate a stage. `arg` is the `@argument` of the chain entry.
    fn create(
        &self,
        kind: MediaKind,
        arg: Option<&str>,
        config: &PipelineConfig,
    ) -> Result<Box<dyn Stage>, StageFault>;
}

/// Input and output port templates of a stage with `role` on a `kind` branch.
///
/// Source and demux have no static ports: the demux grows output ports as the source
/// discovers streams.
pub fn port_templates(role: Role, kind: MediaKind) -> (Option<CapsTemplate>, Option<CapsTemplate>) {
    match role {
        Role::Source | Role::Demux => (None, None),
        Role::Decode => (
            Some(CapsTemplate::Compressed(kind)),
            Some(CapsTemplate::Raw(kind)),
        ),
        Role::Convert | Role::Filter => (Some(CapsTemplate::Raw(kind)), Some(CapsTemplate::Raw(kind))),
        Role::Sink => (Some(CapsTemplate::Raw(kind)), None),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/stage.rs"]
mod tests;
