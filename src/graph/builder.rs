use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, factory_name};
use crate::foundation::core::{BinId, FilterKind, MediaKind, Role};
use crate::foundation::error::{PlaybackError, PlaybackResult};
use crate::graph::registry::StageRegistry;
use crate::graph::source::Source;
use crate::graph::stage::Stage;
use crate::graph::topology::{Graph, StageBody};

/// A chain entry the builder passed over, and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Role the entry was tried for.
    pub role: Role,
    /// Branch kind, `None` for source and demux.
    pub kind: Option<MediaKind>,
    /// The chain entry.
    pub entry: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome of [`GraphBuilder::build`].
#[derive(Debug)]
pub struct BuildReport {
    /// The unlinked graph.
    pub graph: Graph,
    /// Entries skipped on the way.
    pub skipped: Vec<SkippedEntry>,
    /// Branches omitted because a chain ran out.
    pub missing_branches: Vec<MediaKind>,
}

/// A stage created from a chain entry.
pub struct Instantiated {
    /// Position of the entry in its chain.
    pub chain_index: usize,
    /// The chain entry.
    pub entry: String,
    /// The new stage.
    pub stage: Box<dyn Stage>,
}

/// Assembles graphs from a [`PipelineConfig`] and the registry's factories.
///
/// There is one code path for every host: what differs between an accelerated and a
/// software-only machine is only the chain table in the configuration.
pub struct GraphBuilder<'a> {
    config: &'a PipelineConfig,
    registry: &'a StageRegistry,
    allow_degraded: bool,
}

impl<'a> GraphBuilder<'a> {
    /// Builder over `config` and `registry`. Degraded graphs are allowed by default.
    pub fn new(config: &'a PipelineConfig, registry: &'a StageRegistry) -> Self {
        Self {
            config,
            registry,
            allow_degraded: true,
        }
    }

    /// Whether a branch whose chain runs out may be omitted instead of failing.
    pub fn allow_degraded(mut self, allow: bool) -> Self {
        self.allow_degraded = allow;
        self
    }

    /// Build the graph for `uri` with `filters` between convert and sink.
    ///
    /// Nothing is linked to the demux yet; its output ports appear once the source is
    /// opened.
    #[tracing::instrument(skip(self), fields(accelerated = self.config.is_accelerated()))]
    pub fn build(&self, uri: &str, filters: &[FilterKind]) -> PlaybackResult<BuildReport> {
        let mut graph = Graph::new(uri);
        let mut skipped = Vec::new();

        let (index, entry, source) = self.instantiate_source(uri, &mut skipped)?;
        graph.add_stage(
            Role::Source,
            None,
            &entry,
            Some(index),
            None,
            StageBody::Source(source),
        );

        let demux = self
            .instantiate(Role::Demux, None, 0, &mut skipped)
            .ok_or_else(|| PlaybackError::build("no demux could be created"))?;
        graph.add_stage(
            Role::Demux,
            None,
            &demux.entry,
            Some(demux.chain_index),
            None,
            StageBody::Element(demux.stage),
        );

        let mut missing_branches = Vec::new();
        for kind in MediaKind::ALL {
            let branch_filters: Vec<FilterKind> =
                filters.iter().copied().filter(|f| f.kind() == kind).collect();
            if let Err(role) = self.build_branch(&mut graph, kind, &branch_filters, &mut skipped) {
                if !self.allow_degraded {
                    return Err(PlaybackError::build(format!(
                        "{kind} branch: no usable {role} stage"
                    )));
                }
                warn!(%kind, %role, "branch omitted; chain exhausted");
                missing_branches.push(kind);
            }
        }
        if graph.bins().next().is_none() {
            return Err(PlaybackError::build("no branch could be built"));
        }

        info!(graph = %graph.describe(), skipped = skipped.len(), "graph built");
        Ok(BuildReport {
            graph,
            skipped,
            missing_branches,
        })
    }

    fn build_branch(
        &self,
        graph: &mut Graph,
        kind: MediaKind,
        filters: &[FilterKind],
        skipped: &mut Vec<SkippedEntry>,
    ) -> Result<BinId, Role> {
        let mut stages = Vec::new();
        for role in [Role::Decode, Role::Convert] {
            stages.push((
                role,
                self.instantiate(role, Some(kind), 0, skipped).ok_or(role)?,
            ));
        }
        for filter in filters {
            match self.instantiate(Role::Filter, Some(kind), 0, skipped) {
                Some(stage) => stages.push((Role::Filter, stage)),
                None => warn!(filter = filter.id(), %kind, "filter unavailable; left out"),
            }
        }
        stages.push((
            Role::Sink,
            self.instantiate(Role::Sink, Some(kind), 0, skipped)
                .ok_or(Role::Sink)?,
        ));

        let bin = graph.add_bin(kind);
        let ids: Vec<_> = stages
            .into_iter()
            .map(|(role, s)| {
                graph.add_stage(
                    role,
                    Some(kind),
                    &s.entry,
                    Some(s.chain_index),
                    Some(bin),
                    StageBody::Element(s.stage),
                )
            })
            .collect();

        for pair in ids.windows(2) {
            let out = graph.stage(pair[0]).and_then(|n| n.outputs().first().copied());
            let inp = graph.stage(pair[1]).and_then(|n| n.input());
            if let (Some(out), Some(inp)) = (out, inp)
                && let Err(err) = graph.link(out, inp, None)
            {
                warn!(%kind, %err, "static branch link failed");
                graph.remove_bin(bin);
                return Err(Role::Convert);
            }
        }
        let entry = ids
            .first()
            .and_then(|s| graph.stage(*s))
            .and_then(|n| n.input());
        if let Some(entry) = entry
            && graph.expose_ghost(bin, entry).is_err()
        {
            graph.remove_bin(bin);
            return Err(Role::Decode);
        }
        debug!(%kind, stages = ids.len(), "branch bin assembled");
        Ok(bin)
    }

    fn instantiate_source(
        &self,
        uri: &str,
        skipped: &mut Vec<SkippedEntry>,
    ) -> PlaybackResult<(usize, String, Box<dyn Source>)> {
        let chain = self.config.chains.get(Role::Source, None);
        for (index, entry) in chain.iter().enumerate() {
            let reason = match self.registry.source(factory_name(entry)) {
                None => "not registered".to_owned(),
                Some(f) if !f.handles(uri) => format!("does not handle {uri}"),
                Some(f) => match f.create(uri) {
                    Ok(source) => return Ok((index, entry.clone(), source)),
                    Err(err) => err.to_string(),
                },
            };
            debug!(entry = %entry, reason = %reason, "source candidate skipped");
            skipped.push(SkippedEntry {
                role: Role::Source,
                kind: None,
                entry: entry.clone(),
                reason,
            });
        }
        Err(PlaybackError::build(format!("no source can read '{uri}'")))
    }

    /// Create the first usable stage of the `(role, kind)` chain at or after `start`.
    ///
    /// Unregistered, unsupported and unavailable factories and creation errors all
    /// count as a missing stage: the entry is recorded in `skipped` and the next one
    /// is tried.
    pub fn instantiate(
        &self,
        role: Role,
        kind: Option<MediaKind>,
        start: usize,
        skipped: &mut Vec<SkippedEntry>,
    ) -> Option<Instantiated> {
        let chain = self.config.chains.get(role, kind);
        let branch = kind.unwrap_or(MediaKind::Video);
        for (index, entry) in chain.iter().enumerate().skip(start) {
            let reason = match self.registry.resolve(entry) {
                None => "not registered".to_owned(),
                Some((f, _)) if f.role() != role => format!("is a {} factory", f.role()),
                Some((f, _)) if kind.is_some() && !f.supports(branch) => {
                    format!("cannot serve a {branch} branch")
                }
                Some((f, _)) if !f.is_available(self.config) => {
                    "unavailable in this configuration".to_owned()
                }
                Some((f, arg)) => match f.create(branch, arg, self.config) {
                    Ok(stage) => {
                        return Some(Instantiated {
                            chain_index: index,
                            entry: entry.clone(),
                            stage,
                        });
                    }
                    Err(err) => err.to_string(),
                },
            };
            debug!(%role, entry = %entry, reason = %reason, "chain entry skipped");
            skipped.push(SkippedEntry {
                role,
                kind,
                entry: entry.clone(),
                reason,
            });
        }
        None
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/builder.rs"]
mod tests;
