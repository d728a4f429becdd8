use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::foundation::core::Codec;

/// Smallest and largest worker pool a configuration may ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadBounds {
    /// Lower bound (inclusive).
    pub min: usize,
    /// Upper bound (inclusive).
    pub max: usize,
}

impl Default for ThreadBounds {
    fn default() -> Self {
        Self { min: 2, max: 16 }
    }
}

impl ThreadBounds {
    /// Clamp `n` into the bounds.
    pub fn clamp(self, n: usize) -> usize {
        n.clamp(self.min, self.max)
    }
}

/// Hardware decode support advertised by one VA-API driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSupport {
    /// H.264 / AVC.
    pub h264: bool,
    /// H.265 / HEVC.
    pub h265: bool,
    /// VP8.
    pub vp8: bool,
    /// VP9.
    pub vp9: bool,
    /// AV1.
    pub av1: bool,
}

impl CodecSupport {
    /// Read decode support out of `vainfo` output.
    ///
    /// Profile lines look like `VAProfileH264Main : VAEntrypointVLD`; only lines with a
    /// decode (`VLD`) entrypoint count. Output without any entrypoint listing is matched
    /// by codec name alone.
    pub fn from_vainfo(output: &str) -> Self {
        let lower = output.to_ascii_lowercase();
        let structured = lower.contains("vaentrypoint");

        let mut support = Self::default();
        for line in lower.lines() {
            if structured && !(line.contains("vaprofile") && line.contains("vld")) {
                continue;
            }
            support.h264 |= line.contains("h264") || line.contains("avc");
            support.h265 |= line.contains("hevc") || line.contains("h265");
            support.vp8 |= line.contains("vp8");
            support.vp9 |= line.contains("vp9");
            support.av1 |= line.contains("av1");
        }
        support
    }

    /// Support flag for `codec`; non-accelerable codecs are always `false`.
    pub fn supports(&self, codec: Codec) -> bool {
        match codec {
            Codec::H264 => self.h264,
            Codec::H265 => self.h265,
            Codec::Vp8 => self.vp8,
            Codec::Vp9 => self.vp9,
            Codec::Av1 => self.av1,
            _ => false,
        }
    }

    /// Supported codecs in canonical order.
    pub fn codecs(&self) -> BTreeSet<Codec> {
        Codec::ACCELERABLE
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }

    /// Return `true` when nothing is supported.
    pub fn is_empty(&self) -> bool {
        !(self.h264 || self.h265 || self.vp8 || self.vp9 || self.av1)
    }
}

/// A VA-API driver that answered the probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Driver name as passed in `LIBVA_DRIVER_NAME`.
    pub name: String,
    /// Decode support reported by this driver.
    pub codecs: CodecSupport,
}

/// What the host can do for decode and render.
///
/// Produced once per process by the probe and treated as immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// First driver that answered, if any.
    pub driver: Option<String>,
    /// First render/card node found, if any.
    pub device: Option<PathBuf>,
    /// Decode support of [`HardwareProfile::driver`].
    pub codecs: CodecSupport,
    /// Every driver that answered, in probe order.
    pub drivers: Vec<DriverInfo>,
    /// Every device node found, in priority order.
    pub devices: Vec<PathBuf>,
    /// CPU feature flags (`sse4_2`, `avx2`, ...).
    pub cpu_flags: BTreeSet<String>,
    /// Logical CPU count.
    pub cpu_count: usize,
    /// Worker pool bounds.
    pub thread_bounds: ThreadBounds,
    /// Non-fatal problems met while probing.
    pub diagnostics: Vec<String>,
}

impl HardwareProfile {
    /// A profile with no acceleration at all.
    pub fn software_only(cpu_count: usize) -> Self {
        Self {
            driver: None,
            device: None,
            codecs: CodecSupport::default(),
            drivers: Vec::new(),
            devices: Vec::new(),
            cpu_flags: BTreeSet::new(),
            cpu_count: cpu_count.max(1),
            thread_bounds: ThreadBounds::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Return `true` when both a driver and a device were found.
    pub fn has_acceleration(&self) -> bool {
        self.driver.is_some() && self.device.is_some()
    }

    /// Look up an answering driver by name.
    pub fn driver_info(&self, name: &str) -> Option<&DriverInfo> {
        self.drivers.iter().find(|d| d.name == name)
    }

    /// Return `true` when `/proc/cpuinfo` listed `flag`.
    pub fn has_cpu_flag(&self, flag: &str) -> bool {
        self.cpu_flags.contains(flag)
    }
}

/// Extract the `flags` line of `/proc/cpuinfo` (first processor only).
pub fn parse_cpu_flags(cpuinfo: &str) -> BTreeSet<String> {
    cpuinfo
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "flags").then_some(value)
        })
        .map(|flags| flags.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "../../tests/unit/probe/profile.rs"]
mod tests;
