use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::foundation::core::{Caps, Role, StageId};
use crate::graph::builder::GraphBuilder;
use crate::graph::registry::StageRegistry;
use crate::graph::stage::Buffer;
use crate::graph::topology::{Graph, LinkError, StageBody};
use crate::negotiate::port::PortNegotiation;

/// What linking a ready port achieved.
#[derive(Debug)]
pub enum LinkOutcome {
    /// The port feeds its branch.
    Linked {
        /// Negotiated format.
        caps: Caps,
        /// Capsfilter synthesized to reach the branch, if one was needed.
        capsfilter: Option<StageId>,
        /// Decoder put in place of one that refused the format.
        decoder: Option<StageId>,
        /// Data held while the port waited, in arrival order.
        held: Vec<Buffer>,
    },
    /// The port gave up.
    Rejected(String),
}

/// Links discovered ports to the branch of their kind.
///
/// Each attempt tries the direct link first. A wrong-hierarchy answer puts a
/// capsfilter carrying the negotiated format in front of the branch's ghost port; a
/// refused format swaps the branch decoder for the next one in its chain. The port is
/// rejected after [`Tunables::max_link_attempts`].
///
/// [`Tunables::max_link_attempts`]: crate::config::Tunables::max_link_attempts
pub struct Linker<'a> {
    config: &'a PipelineConfig,
    registry: &'a StageRegistry,
}

impl<'a> Linker<'a> {
    /// Linker using `config`'s chains and limits.
    pub fn new(config: &'a PipelineConfig, registry: &'a StageRegistry) -> Self {
        Self { config, registry }
    }

    /// Link `neg` (which must be [`PortNegotiation::ready_to_link`]).
    pub fn link(&self, graph: &mut Graph, neg: &mut PortNegotiation) -> LinkOutcome {
        let Some(caps) = neg.format().filter(|_| neg.ready_to_link()) else {
            return LinkOutcome::Rejected("port is not ready to link".to_owned());
        };
        let kind = neg.kind();
        let max = self.config.tunables.max_link_attempts.max(1);
        let mut capsfilter = None;
        let mut decoder = None;
        let mut last_error = String::from("no attempt made");

        while neg.attempts() < max {
            let attempt = neg.record_attempt();
            let Some(entry) = graph.branch_entry(kind) else {
                return self.reject(neg, format!("no {kind} branch"), graph, capsfilter);
            };
            let result = match capsfilter {
                Some(cf) => self.link_through(graph, neg, cf, caps),
                None => graph.link(neg.port(), entry, Some(caps)),
            };
            match result {
                Ok(()) => {
                    graph.propagate_formats(entry);
                    let held = neg.mark_linked();
                    info!(%kind, %caps, attempt, "port linked");
                    return LinkOutcome::Linked {
                        caps,
                        capsfilter,
                        decoder,
                        held,
                    };
                }
                Err(LinkError::WrongHierarchy) if capsfilter.is_none() => {
                    debug!(%kind, %caps, "wrong hierarchy; synthesizing capsfilter");
                    capsfilter = Some(graph.add_capsfilter(caps));
                    last_error = LinkError::WrongHierarchy.to_string();
                }
                Err(LinkError::NoFormat(reason)) => {
                    warn!(%kind, %caps, reason = %reason, "format refused");
                    match self.substitute_decoder(graph, neg, caps) {
                        Some(id) => decoder = Some(id),
                        None => {
                            return self.reject(neg, reason, graph, capsfilter);
                        }
                    }
                    last_error = reason;
                }
                Err(err @ LinkError::AlreadyLinked(_)) => {
                    return self.reject(neg, err.to_string(), graph, capsfilter);
                }
                Err(err) => {
                    debug!(%kind, %err, attempt, "link attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        self.reject(
            neg,
            format!("gave up after {max} attempts: {last_error}"),
            graph,
            capsfilter,
        )
    }

    fn link_through(
        &self,
        graph: &mut Graph,
        neg: &PortNegotiation,
        cf: StageId,
        caps: Caps,
    ) -> Result<(), LinkError> {
        let kind = neg.kind();
        let (cf_in, cf_out) = graph
            .stage(cf)
            .and_then(|n| Some((n.input()?, n.outputs().first().copied()?)))
            .ok_or(LinkError::WrongHierarchy)?;

        let bin = graph.bin_for(kind).ok_or(LinkError::WrongHierarchy)?;
        let target = graph
            .branch_stage(kind, Role::Decode)
            .and_then(|d| graph.stage(d))
            .and_then(|n| n.input())
            .ok_or(LinkError::WrongHierarchy)?;
        let ghost = graph.expose_ghost(bin, target)?;

        if graph.port(cf_in).and_then(|p| p.peer()).is_none() {
            graph.link(neg.port(), cf_in, Some(caps))?;
        }
        if let Err(err) = graph.link(cf_out, ghost, Some(caps)) {
            graph.unlink(cf_in);
            return Err(err);
        }
        Ok(())
    }

    fn substitute_decoder(&self, graph: &mut Graph, neg: &PortNegotiation, caps: Caps) -> Option<StageId> {
        let kind = neg.kind();
        let old = graph.branch_stage(kind, Role::Decode)?;
        let mut next = graph.stage(old)?.chain_index().map_or(0, |i| i + 1);
        let builder = GraphBuilder::new(self.config, self.registry);
        let mut skipped = Vec::new();

        while let Some(candidate) = builder.instantiate(Role::Decode, Some(kind), next, &mut skipped) {
            next = candidate.chain_index + 1;
            if !candidate.stage.accepts(&caps) {
                debug!(entry = %candidate.entry, %caps, "decoder candidate refuses format");
                continue;
            }
            let entry = candidate.entry.clone();
            match graph.replace_stage(old, &entry, candidate.chain_index, candidate.stage) {
                Ok((new, body)) => {
                    drop(body);
                    info!(%kind, entry = %entry, "decoder substituted");
                    return Some(new);
                }
                Err(err) => {
                    warn!(%kind, entry = %entry, %err, "decoder substitution failed");
                    return None;
                }
            }
        }
        None
    }

    fn reject(
        &self,
        neg: &mut PortNegotiation,
        reason: String,
        graph: &mut Graph,
        capsfilter: Option<StageId>,
    ) -> LinkOutcome {
        if let Some(cf) = capsfilter
            && let Some(StageBody::Element(_)) = graph.remove_stage(cf)
        {
            debug!(?cf, "synthesized capsfilter removed");
        }
        warn!(kind = %neg.kind(), reason = %reason, "port rejected");
        neg.reject(reason.clone());
        LinkOutcome::Rejected(reason)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/negotiate/linker.rs"]
mod tests;
