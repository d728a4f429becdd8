use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::foundation::core::{SessionId, SurfaceHandle};
use crate::graph::stage::StageFault;

/// Who holds an exclusive device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Holder {
    /// A playback session. Stages of the same session may share the device.
    Session(SessionId),
    /// Something outside this process (or a test standing in for it).
    External,
}

#[derive(Debug)]
struct Entry {
    holder: Holder,
    leases: usize,
}

/// Registry of exclusively held devices and accelerated output surfaces.
///
/// Keys are host strings such as `alsa:hw:0,0` or `surface:7`. A collision is
/// reported to the acquiring stage as [`StageFault::ResourceBusy`].
#[derive(Debug, Default)]
pub struct DeviceArbiter {
    held: Mutex<BTreeMap<String, Entry>>,
}

/// Key of an accelerated output surface.
pub fn surface_key(surface: SurfaceHandle) -> String {
    format!("surface:{}", surface.0)
}

/// Key of an ALSA PCM device.
pub fn alsa_key(device: &str) -> String {
    format!("alsa:{device}")
}

impl DeviceArbiter {
    /// Empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take `key` on behalf of `session`.
    pub fn acquire(self: &Arc<Self>, key: &str, session: SessionId) -> Result<DeviceLease, StageFault> {
        self.take(key, Holder::Session(session))
    }

    /// Take `key` on behalf of something outside the pipeline.
    pub fn occupy(self: &Arc<Self>, key: &str) -> Result<DeviceLease, StageFault> {
        self.take(key, Holder::External)
    }

    /// Current holder of `key`.
    pub fn holder(&self, key: &str) -> Option<Holder> {
        self.lock().get(key).map(|e| e.holder)
    }

    /// Every held key.
    pub fn held_keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn take(self: &Arc<Self>, key: &str, holder: Holder) -> Result<DeviceLease, StageFault> {
        let mut held = self.lock();
        match held.get_mut(key) {
            Some(entry) if entry.holder == holder && holder != Holder::External => {
                entry.leases += 1;
            }
            Some(entry) => {
                return Err(StageFault::ResourceBusy(format!(
                    "{key} is held by {:?}",
                    entry.holder
                )));
            }
            None => {
                held.insert(key.to_owned(), Entry { holder, leases: 1 });
            }
        }
        debug!(key, ?holder, "device acquired");
        Ok(DeviceLease {
            arbiter: Arc::clone(self),
            key: key.to_owned(),
            holder,
        })
    }

    fn release(&self, key: &str, holder: Holder) {
        let mut held = self.lock();
        let drop_entry = match held.get_mut(key) {
            Some(entry) if entry.holder == holder => {
                entry.leases = entry.leases.saturating_sub(1);
                entry.leases == 0
            }
            _ => false,
        };
        if drop_entry {
            held.remove(key);
            debug!(key, "device released");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Entry>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Proof of holding a device; dropping it releases the device.
#[derive(Debug)]
pub struct DeviceLease {
    arbiter: Arc<DeviceArbiter>,
    key: String,
    holder: Holder,
}

impl DeviceLease {
    /// Key held by this lease.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.arbiter.release(&self.key, self.holder);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/arbiter.rs"]
mod tests;
