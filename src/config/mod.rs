//! Pipeline configuration.
//!
//! [`resolve_config`] turns a [`HardwareProfile`] (plus [`ConfigOverrides`]) into the
//! single [`PipelineConfig`] every session of the process is built from. Resolution is
//! a pure function: the same inputs always give the same configuration.

mod chains;
mod overrides;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use chains::{FallbackChains, RoleChain, factories, factory_arg, factory_name};
pub use overrides::{ConfigOverrides, TunableOverrides};

use crate::foundation::core::{Codec, FilterKind, MediaKind, Role};
use crate::playback::EosPolicy;
use crate::probe::HardwareProfile;
use crate::reconfig::equalizer;

/// Factories that only work with a VA-API driver and device.
pub const ACCELERATED_FACTORIES: [&str; 3] = [
    factories::VAAPI_DECODE,
    factories::VAAPI_POSTPROC,
    factories::VAAPISINK,
];

/// Session timing and retry knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    /// Deadline for one requested state transition.
    pub transition_timeout_ms: u64,
    /// Substitutions allowed per session before giving up.
    pub max_recovery_attempts: u32,
    /// Decode errors tolerated per branch before the branch is torn down.
    pub decode_error_threshold: u32,
    /// Link attempts per discovered port before it is rejected.
    pub max_link_attempts: u32,
    /// Minimum spacing of filter parameter applies.
    pub coalesce_interval_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            transition_timeout_ms: 5_000,
            max_recovery_attempts: 2,
            decode_error_threshold: 8,
            max_link_attempts: 3,
            coalesce_interval_ms: 40,
        }
    }
}

impl Tunables {
    /// [`Tunables::transition_timeout_ms`] as a duration.
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }

    /// [`Tunables::coalesce_interval_ms`] as a duration.
    pub fn coalesce_interval(&self) -> Duration {
        Duration::from_millis(self.coalesce_interval_ms)
    }

    fn apply(&mut self, o: &TunableOverrides) {
        if let Some(v) = o.transition_timeout_ms {
            self.transition_timeout_ms = v.max(1);
        }
        if let Some(v) = o.max_recovery_attempts {
            self.max_recovery_attempts = v;
        }
        if let Some(v) = o.decode_error_threshold {
            self.decode_error_threshold = v;
        }
        if let Some(v) = o.max_link_attempts {
            self.max_link_attempts = v.max(1);
        }
        if let Some(v) = o.coalesce_interval_ms {
            self.coalesce_interval_ms = v;
        }
    }
}

/// Everything a session needs to know about the host, decided once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// VA-API driver in use, if accelerated.
    pub driver: Option<String>,
    /// Device node in use, if accelerated.
    pub device: Option<PathBuf>,
    /// Codecs decoded in hardware. Empty for software-only configurations.
    pub codecs: BTreeSet<Codec>,
    /// Branch worker pool size.
    pub thread_pool_size: usize,
    /// Optional filters enabled for new sessions.
    pub filters: Vec<FilterKind>,
    /// Equalizer preset applied when a session opens.
    pub equalizer_preset: Option<String>,
    /// End-of-stream policy of sessions that do not choose one.
    #[serde(default)]
    pub eos_policy: EosPolicy,
    /// Role -> fallback chain table.
    pub chains: FallbackChains,
    /// Timing and retry knobs.
    pub tunables: Tunables,
}

impl PipelineConfig {
    /// Configuration for a host without any acceleration.
    pub fn software_only() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        resolve_config(
            &HardwareProfile::software_only(cpus),
            &ConfigOverrides::default(),
        )
    }

    /// Return `true` when a VA-API driver and device were resolved.
    pub fn is_accelerated(&self) -> bool {
        self.driver.is_some() && self.device.is_some()
    }

    /// Return `true` when `codec` is decoded in hardware.
    pub fn accelerates(&self, codec: Codec) -> bool {
        self.is_accelerated() && self.codecs.contains(&codec)
    }

    /// Chain for `role`; `kind` is ignored for source and demux.
    pub fn chain(&self, role: Role, kind: MediaKind) -> &[String] {
        let kind = role.is_per_branch().then_some(kind);
        self.chains.get(role, kind)
    }
}

/// Resolve the configuration for `profile`.
pub fn resolve_config(profile: &HardwareProfile, overrides: &ConfigOverrides) -> PipelineConfig {
    let (driver, device, codecs) = if overrides.disable_acceleration {
        (None, None, BTreeSet::new())
    } else {
        let driver = match overrides.driver.as_deref() {
            Some(name) => profile.driver_info(name).or_else(|| {
                warn!(driver = name, "forced driver did not answer the probe; ignoring");
                profile.drivers.first()
            }),
            None => profile.drivers.first(),
        };
        let device = match overrides.device.as_ref() {
            Some(d) if profile.devices.contains(d) => Some(d.clone()),
            Some(d) => {
                warn!(device = %d.display(), "forced device was not found; ignoring");
                profile.device.clone()
            }
            None => profile.device.clone(),
        };
        match (driver, device) {
            (Some(info), Some(device)) => (Some(info.name.clone()), Some(device), info.codecs.codecs()),
            _ => (None, None, BTreeSet::new()),
        }
    };
    let accelerated = driver.is_some() && device.is_some();

    let thread_pool_size = profile
        .thread_bounds
        .clamp(overrides.thread_pool_size.unwrap_or(profile.cpu_count));

    let defaults = FallbackChains::defaults(accelerated);
    let mut chains = defaults.clone();
    for chain in &overrides.chains {
        chains.set(chain.clone());
    }
    if !accelerated {
        chains.remove_factories(&ACCELERATED_FACTORIES);
    }
    for chain in defaults.iter() {
        if chains.get(chain.role, chain.kind).is_empty() {
            warn!(role = %chain.role, kind = ?chain.kind, "empty chain override; keeping default");
            chains.set(chain.clone());
        }
    }

    let equalizer_preset = overrides.equalizer_preset.clone().filter(|name| {
        let known = equalizer::preset_gains(name).is_some();
        if !known {
            warn!(preset = %name, "unknown equalizer preset; ignoring");
        }
        known
    });

    let mut tunables = Tunables::default();
    tunables.apply(&overrides.tunables);

    let config = PipelineConfig {
        driver,
        device,
        codecs,
        thread_pool_size,
        filters: overrides.filters.clone().unwrap_or_default(),
        equalizer_preset,
        eos_policy: overrides.eos_policy.unwrap_or_default(),
        chains,
        tunables,
    };
    debug!(
        accelerated = config.is_accelerated(),
        threads = config.thread_pool_size,
        "pipeline configuration resolved"
    );
    config
}

#[cfg(test)]
#[path = "../../tests/unit/config/resolve.rs"]
mod tests;
