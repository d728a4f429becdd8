use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::chains::RoleChain;
use crate::foundation::core::FilterKind;
use crate::foundation::error::{PlaybackError, PlaybackResult};
use crate::playback::EosPolicy;

/// Caller-supplied adjustments applied on top of what the probe found.
///
/// Deserializable so the embedding application can persist it; the CLI reads it from
/// `--overrides <file.json>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Use this driver if it answered the probe.
    pub driver: Option<String>,
    /// Use this device node if the probe found it.
    pub device: Option<PathBuf>,
    /// Ignore acceleration entirely.
    pub disable_acceleration: bool,
    /// Worker pool size (still clamped to the profile's bounds).
    pub thread_pool_size: Option<usize>,
    /// Chains replacing the defaults for the same role and kind.
    pub chains: Vec<RoleChain>,
    /// Optional filters enabled by default for new sessions.
    pub filters: Option<Vec<FilterKind>>,
    /// Equalizer preset applied when a session opens.
    pub equalizer_preset: Option<String>,
    /// Default end-of-stream policy.
    pub eos_policy: Option<EosPolicy>,
    /// Session tunables.
    pub tunables: TunableOverrides,
}

/// Partial [`Tunables`](crate::config::Tunables); unset fields keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunableOverrides {
    /// Per-transition deadline in milliseconds.
    pub transition_timeout_ms: Option<u64>,
    /// Substitution budget per session.
    pub max_recovery_attempts: Option<u32>,
    /// Decode errors tolerated per branch.
    pub decode_error_threshold: Option<u32>,
    /// Link attempts per discovered port.
    pub max_link_attempts: Option<u32>,
    /// Filter parameter coalescing interval in milliseconds.
    pub coalesce_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Parse overrides from JSON text.
    pub fn from_json(text: &str) -> PlaybackResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| PlaybackError::validation(format!("invalid config overrides: {e}")))
    }
}
