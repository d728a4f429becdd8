//! Dynamic port negotiation.
//!
//! A source only reveals its streams once opened. Each revealed stream gets a demux
//! output port and a [`PortNegotiation`] that orders its announcements; once ready,
//! the [`Linker`] connects it to the branch of its kind. Branches are independent: a
//! rejected port only costs its own branch.

mod linker;
mod port;

pub use linker::{LinkOutcome, Linker};
pub use port::{PortNegotiation, PortPhase};

use crate::foundation::core::{MediaKind, PortId};
use crate::graph::topology::Graph;

/// Every port negotiation of one graph.
#[derive(Debug, Default)]
pub struct NegotiationTable {
    ports: Vec<PortNegotiation>,
    no_more_ports: bool,
}

impl NegotiationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly discovered port.
    pub fn add(&mut self, negotiation: PortNegotiation) {
        self.ports.push(negotiation);
    }

    /// Every negotiation in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &PortNegotiation> {
        self.ports.iter()
    }

    /// Negotiation of `port`.
    pub fn get_mut(&mut self, port: PortId) -> Option<&mut PortNegotiation> {
        self.ports.iter_mut().find(|n| n.port() == port)
    }

    /// Negotiation feeding the `kind` branch, if linked.
    pub fn linked(&self, kind: MediaKind) -> Option<&PortNegotiation> {
        self.ports
            .iter()
            .find(|n| n.kind() == kind && n.phase() == PortPhase::Linked)
    }

    /// The source announced its last port.
    pub fn set_no_more_ports(&mut self) {
        self.no_more_ports = true;
    }

    /// Return `true` when no port is still waiting for its sequence events or a link.
    pub fn is_settled(&self) -> bool {
        self.no_more_ports
            && self
                .ports
                .iter()
                .all(|n| matches!(n.phase(), PortPhase::Linked | PortPhase::Rejected))
    }

    /// Branches of `graph` that no linked port feeds. Empty until the table is
    /// [settled](NegotiationTable::is_settled), since a late port may still feed them.
    pub fn unfed_branches(&self, graph: &Graph) -> Vec<MediaKind> {
        if !self.is_settled() {
            return Vec::new();
        }
        graph
            .bins()
            .map(|b| b.kind())
            .filter(|kind| self.linked(*kind).is_none())
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/negotiate/table.rs"]
mod tests;
