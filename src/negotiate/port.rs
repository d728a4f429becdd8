use tracing::{debug, warn};

use crate::foundation::core::{Caps, MediaKind, PortId};
use crate::graph::stage::{Buffer, PortEvent};

/// Where a discovered port stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortPhase {
    /// The port exists; nothing arrived yet.
    Discovered,
    /// Waiting for `stream-start` and `format`.
    AwaitingSequenceEvents,
    /// Linked to its branch; data flows.
    Linked,
    /// Given up on; its data is dropped.
    Rejected,
}

/// Negotiation state of one discovered output port.
///
/// Whatever order the source announces things in, the destination sees
/// `stream-start`, then `format`, then data: an early `format` waits for
/// `stream-start`, and data waits until the port is linked.
#[derive(Debug)]
pub struct PortNegotiation {
    port: PortId,
    track: usize,
    kind: MediaKind,
    phase: PortPhase,
    started: bool,
    early_format: Option<Caps>,
    format: Option<Caps>,
    held: Vec<Buffer>,
    attempts: u32,
    reason: Option<String>,
}

impl PortNegotiation {
    /// Fresh negotiation for `port`, carrying source track `track`.
    pub fn new(port: PortId, track: usize, kind: MediaKind) -> Self {
        Self {
            port,
            track,
            kind,
            phase: PortPhase::Discovered,
            started: false,
            early_format: None,
            format: None,
            held: Vec::new(),
            attempts: 0,
            reason: None,
        }
    }

    /// Feed one announced event; returns what the destination may observe now, in
    /// order.
    pub fn push(&mut self, event: PortEvent) -> Vec<PortEvent> {
        if self.phase == PortPhase::Discovered {
            self.phase = PortPhase::AwaitingSequenceEvents;
        }
        let mut released = Vec::new();
        match (self.phase, event) {
            (PortPhase::Rejected, _) => {}
            (_, PortEvent::StreamStart) => {
                if self.started {
                    debug!(port = ?self.port, "duplicate stream-start ignored");
                } else {
                    self.started = true;
                    released.push(PortEvent::StreamStart);
                    if let Some(caps) = self.early_format.take() {
                        self.format = Some(caps);
                        released.push(PortEvent::Format(caps));
                    }
                }
            }
            (_, PortEvent::Format(caps)) if !self.started => {
                debug!(port = ?self.port, %caps, "format before stream-start; buffered");
                self.early_format = Some(caps);
            }
            (_, PortEvent::Format(caps)) => match self.format {
                None => {
                    self.format = Some(caps);
                    released.push(PortEvent::Format(caps));
                }
                Some(current) if current == caps => {}
                Some(current) => {
                    warn!(port = ?self.port, %current, new = %caps, "format change without re-link ignored");
                }
            },
            (PortPhase::Linked, PortEvent::Data(buffer)) => released.push(PortEvent::Data(buffer)),
            (_, PortEvent::Data(buffer)) => self.held.push(buffer),
        }
        released
    }

    /// Return `true` once `stream-start` and `format` were both seen and the port still
    /// waits for a link.
    pub fn ready_to_link(&self) -> bool {
        self.phase == PortPhase::AwaitingSequenceEvents && self.started && self.format.is_some()
    }

    /// Count one link attempt; returns the attempts made so far.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// The port is linked: hand back held data in arrival order.
    pub fn mark_linked(&mut self) -> Vec<Buffer> {
        self.phase = PortPhase::Linked;
        std::mem::take(&mut self.held)
    }

    /// Give up on the port; held data is dropped.
    pub fn reject(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(port = ?self.port, kind = %self.kind, reason = %reason, "port rejected");
        self.phase = PortPhase::Rejected;
        self.held.clear();
        self.reason = Some(reason);
    }

    /// Demux output port under negotiation.
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Source track behind the port.
    pub fn track(&self) -> usize {
        self.track
    }

    /// Stream kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Current phase.
    pub fn phase(&self) -> PortPhase {
        self.phase
    }

    /// Format released to the destination, if any.
    pub fn format(&self) -> Option<Caps> {
        self.format
    }

    /// Link attempts made.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Buffers waiting for the link.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Why the port was rejected.
    pub fn rejection(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/negotiate/port.rs"]
mod tests;
