//! Host capability probing.
//!
//! The probe looks for DRM render nodes, asks each known VA-API driver whether it
//! answers on the first node found, records the decode codecs of the first answering
//! driver and reads the CPU feature flags. Nothing here is fatal: every failure ends up
//! in [`HardwareProfile::diagnostics`] and the worst case is a software-only profile.

mod host;
mod profile;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

pub use host::{CommandOutput, ProbeHost, SystemHost};
pub use profile::{CodecSupport, DriverInfo, HardwareProfile, ThreadBounds, parse_cpu_flags};

/// Device nodes tried first, in priority order.
pub const DRM_DEVICES: [&str; 4] = [
    "/dev/dri/renderD128",
    "/dev/dri/card0",
    "/dev/dri/renderD129",
    "/dev/dri/card1",
];

/// VA-API drivers queried, in priority order.
pub const VA_DRIVERS: [&str; 6] = ["iHD", "i965", "radeonsi", "nouveau", "r600", "nvidia"];

/// Deadline for a single driver query.
pub const DRIVER_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

const DRI_DIR: &str = "/dev/dri";
const CPUINFO: &str = "/proc/cpuinfo";

/// Probe the real host.
pub fn probe_hardware() -> HardwareProfile {
    probe_with(&SystemHost)
}

/// Probe through an arbitrary [`ProbeHost`].
#[tracing::instrument(skip(host))]
pub fn probe_with(host: &dyn ProbeHost) -> HardwareProfile {
    let mut profile = HardwareProfile::software_only(host.cpu_count());

    profile.devices = find_devices(host, &mut profile.diagnostics);
    profile.device = profile.devices.first().cloned();

    match profile.device.clone() {
        Some(device) => {
            profile.drivers = query_drivers(host, &device, &mut profile.diagnostics);
        }
        None => profile
            .diagnostics
            .push("no DRM device node found; skipping VA-API driver queries".to_owned()),
    }
    if let Some(first) = profile.drivers.first() {
        profile.driver = Some(first.name.clone());
        profile.codecs = first.codecs;
    }

    match host.read_to_string(Path::new(CPUINFO)) {
        Ok(text) => profile.cpu_flags = parse_cpu_flags(&text),
        Err(e) => profile
            .diagnostics
            .push(format!("cannot read {CPUINFO}: {e}")),
    }

    info!(
        driver = profile.driver.as_deref().unwrap_or("none"),
        device = ?profile.device,
        codecs = ?profile.codecs.codecs(),
        cpus = profile.cpu_count,
        "hardware probe finished"
    );
    for d in &profile.diagnostics {
        debug!("probe diagnostic: {d}");
    }
    profile
}

fn find_devices(host: &dyn ProbeHost, diagnostics: &mut Vec<String>) -> Vec<PathBuf> {
    let known: Vec<PathBuf> = DRM_DEVICES
        .iter()
        .map(PathBuf::from)
        .filter(|p| host.exists(p))
        .collect();
    if !known.is_empty() {
        return known;
    }

    match host.list_dir(Path::new(DRI_DIR)) {
        Ok(names) => {
            let mut render: Vec<PathBuf> = Vec::new();
            let mut card: Vec<PathBuf> = Vec::new();
            for name in names {
                if name.starts_with("renderD") {
                    render.push(Path::new(DRI_DIR).join(name));
                } else if name.starts_with("card") {
                    card.push(Path::new(DRI_DIR).join(name));
                }
            }
            render.sort();
            card.sort();
            render.extend(card);
            render
        }
        Err(e) => {
            diagnostics.push(format!("cannot scan {DRI_DIR}: {e}"));
            Vec::new()
        }
    }
}

fn query_drivers(
    host: &dyn ProbeHost,
    device: &Path,
    diagnostics: &mut Vec<String>,
) -> Vec<DriverInfo> {
    let device_arg = device.to_string_lossy();
    let mut found = Vec::new();
    for driver in VA_DRIVERS {
        let args = ["--display", "drm", "--device", device_arg.as_ref()];
        match host.run(
            "vainfo",
            &args,
            &[("LIBVA_DRIVER_NAME", driver)],
            DRIVER_QUERY_TIMEOUT,
        ) {
            Ok(out) if out.success => {
                debug!(driver, "VA-API driver answered");
                found.push(DriverInfo {
                    name: driver.to_owned(),
                    codecs: CodecSupport::from_vainfo(&out.stdout),
                });
            }
            Ok(out) => {
                let reason = out.stderr.lines().last().unwrap_or("non-zero exit").trim();
                diagnostics.push(format!("driver {driver}: {reason}"));
            }
            Err(e) => diagnostics.push(format!("driver {driver}: {e}")),
        }
    }
    found
}

static SHARED: RwLock<Option<Arc<HardwareProfile>>> = RwLock::new(None);

/// Process-wide cached profile, probing the real host on first use.
pub fn shared_profile() -> Arc<HardwareProfile> {
    if let Some(p) = SHARED
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
    {
        return Arc::clone(p);
    }
    let mut slot = SHARED.write().unwrap_or_else(|e| e.into_inner());
    // Another thread may have won the race while we waited for the write lock.
    if let Some(p) = slot.as_ref() {
        return Arc::clone(p);
    }
    let profile = Arc::new(probe_hardware());
    *slot = Some(Arc::clone(&profile));
    profile
}

/// Probe again and replace the cached profile.
pub fn reprobe() -> Arc<HardwareProfile> {
    let profile = Arc::new(probe_hardware());
    *SHARED.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&profile));
    profile
}

/// Probe on a background thread; the caller collects the profile from the handle.
///
/// The result also becomes the cached [`shared_profile`].
pub fn spawn_probe() -> std::io::Result<thread::JoinHandle<Arc<HardwareProfile>>> {
    thread::Builder::new()
        .name("shadowplay-probe".to_owned())
        .spawn(reprobe)
}

#[cfg(test)]
#[path = "../../tests/unit/probe/probe.rs"]
mod tests;
