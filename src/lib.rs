//! shadowplay is a hardware-adaptive media playback pipeline.
//!
//! The crate probes the host for decode/render hardware, resolves a single
//! [`PipelineConfig`], builds an audio/video processing [`Graph`](graph::Graph) out of
//! named stage factories, links the ports that only appear once a source is opened,
//! and drives playback on a worker thread per session:
//!
//! - Probe the host with [`probe_hardware`] (or [`shared_profile`] for the cached copy)
//! - Resolve a [`PipelineConfig`] with [`resolve_config`]
//! - Open a [`SessionHandle`] through an [`Engine`] and drive it with [`Control`]
//! - Observe the ordered [`SessionEvent`] stream
#![forbid(unsafe_code)]

mod engine;
mod foundation;

/// Pipeline configuration resolved from a hardware profile.
pub mod config;
/// Processing graph: stages, ports, bins, builder and device arbitration.
pub mod graph;
/// Dynamic port negotiation and linking.
pub mod negotiate;
/// Session lifecycle, transport controls and the event stream.
pub mod playback;
/// Host capability probing.
pub mod probe;
/// Live reconfiguration: backend switching and filter parameters.
pub mod reconfig;
/// Runtime fault recovery.
pub mod recovery;

pub use crate::config::{ConfigOverrides, PipelineConfig, resolve_config};
pub use crate::engine::{Engine, OpenOptions};
pub use crate::foundation::core::{
    BinId, Caps, CapsTemplate, Codec, Encoding, FilterKind, MediaKind, PortId, Role, SessionId,
    StageId, SurfaceHandle,
};
pub use crate::foundation::error::{PlaybackError, PlaybackResult};
pub use crate::playback::{
    Control, EosPolicy, SessionEvent, SessionHandle, SessionSnapshot, SessionState, Severity,
};
pub use crate::probe::{HardwareProfile, probe_hardware, reprobe, shared_profile, spawn_probe};
pub use crate::reconfig::EqualizerState;
pub use crate::recovery::FaultKind;
