//! The live side of a graph: state changes, source discovery, streaming and seeking.
//!
//! A [`GraphRuntime`] is owned by one session worker. Everything that happens to it is
//! reported through [`Note`]s, which the worker turns into events and recovery
//! decisions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, factory_name};
use crate::foundation::core::{
    Caps, CapsTemplate, FilterKind, MediaKind, PortId, Role, SessionId, StageId, SurfaceHandle,
};
use crate::foundation::error::PlaybackResult;
use crate::graph::arbiter::DeviceArbiter;
use crate::graph::builder::{GraphBuilder, SkippedEntry};
use crate::graph::registry::StageRegistry;
use crate::graph::source::Source;
use crate::graph::stage::{Buffer, PortEvent, Stage, StageContext, StageFault, StageState, StateChange};
use crate::graph::topology::Graph;
use crate::negotiate::{LinkOutcome, Linker, NegotiationTable, PortNegotiation, PortPhase};
use crate::playback::events::SessionEvent;
use crate::reconfig::equalizer::BAND_COUNT;
use crate::recovery::{Fault, FaultKind};

/// Shared, read-only environment of a session's graphs.
#[derive(Clone)]
pub(crate) struct Environment {
    pub session: SessionId,
    pub config: Arc<PipelineConfig>,
    pub registry: Arc<StageRegistry>,
    pub arbiter: Arc<DeviceArbiter>,
    pub surface: Option<SurfaceHandle>,
    pub pool: Arc<rayon::ThreadPool>,
}

/// Something the runtime wants the worker to know.
#[derive(Debug)]
pub(crate) enum Note {
    Event(SessionEvent),
    Fault(Fault),
    EndOfStream,
}

/// Why a state change stopped short.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A stage faulted; the worker may recover and retry.
    Fault(Fault),
    /// A stage missed the deadline.
    Timeout(String),
    /// A preempting request arrived.
    Preempted,
    /// Nothing left to recover.
    Fatal(Fault),
}

struct Lane {
    stages: Vec<(StageId, Box<dyn Stage>)>,
    input: Vec<Buffer>,
    faults: Vec<(StageId, StageFault)>,
    end: Option<Duration>,
}

impl Lane {
    fn run(&mut self) {
        for buffer in self.input.drain(..) {
            let end = buffer.pts + buffer.duration;
            let mut current = Some(buffer);
            let mut stop = false;
            for (id, stage) in &mut self.stages {
                let Some(b) = current.take() else { break };
                match stage.process(b) {
                    Ok(next) => current = next,
                    Err(fault) => {
                        stop = !matches!(fault, StageFault::Decode(_));
                        self.faults.push((*id, fault));
                        break;
                    }
                }
            }
            self.end = Some(self.end.map_or(end, |e| e.max(end)));
            if stop {
                break;
            }
        }
    }
}

/// One graph plus everything needed to run it.
pub(crate) struct GraphRuntime {
    env: Environment,
    graph: Graph,
    filters: Vec<FilterKind>,
    negotiations: NegotiationTable,
    rejections: BTreeMap<MediaKind, String>,
    preroll: BTreeMap<MediaKind, Vec<Buffer>>,
    opened: bool,
    duration: Option<Duration>,
    position: Duration,
    ended: BTreeSet<MediaKind>,
    eos_sent: bool,
    halted: bool,
}

impl GraphRuntime {
    /// Build a graph for `uri`. Skipped chain entries and omitted branches are
    /// reported as notes.
    pub(crate) fn build(
        env: &Environment,
        uri: &str,
        filters: &[FilterKind],
        allow_degraded: bool,
        out: &mut Vec<Note>,
    ) -> PlaybackResult<Self> {
        let report = GraphBuilder::new(&env.config, &env.registry)
            .allow_degraded(allow_degraded)
            .build(uri, filters)?;
        for SkippedEntry { role, kind, entry, reason } in report.skipped {
            let label = match kind {
                Some(kind) => format!("{kind} {role}"),
                None => role.to_string(),
            };
            out.push(Note::Fault(Fault::session(
                FaultKind::MissingStage,
                format!("{label} '{entry}' skipped: {reason}"),
            )));
        }
        let mut rejections = BTreeMap::new();
        for kind in report.missing_branches {
            rejections.insert(kind, "no usable stage for this branch".to_owned());
            out.push(Note::Event(SessionEvent::BranchRejected {
                kind,
                reason: "no usable stage for this branch".to_owned(),
            }));
        }
        Ok(Self {
            env: env.clone(),
            graph: report.graph,
            filters: filters.to_vec(),
            negotiations: NegotiationTable::new(),
            rejections,
            preroll: BTreeMap::new(),
            opened: false,
            duration: None,
            position: Duration::ZERO,
            ended: BTreeSet::new(),
            eos_sent: false,
            halted: false,
        })
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn filters(&self) -> &[FilterKind] {
        &self.filters
    }

    pub(crate) fn position(&self) -> Duration {
        self.position
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Stage state of the least advanced stage.
    #[cfg(test)]
    pub(crate) fn state(&self) -> StageState {
        self.graph.settled_state()
    }

    pub(crate) fn has_branches(&self) -> bool {
        self.graph.bins().next().is_some()
    }

    #[cfg(test)]
    pub(crate) fn has_equalizer(&self) -> bool {
        self.graph.equalizer().is_some()
    }

    /// Chain position of `stage`.
    pub(crate) fn chain_index(&self, stage: StageId) -> Option<usize> {
        self.graph.stage(stage).and_then(|n| n.chain_index())
    }

    /// Drive every stage to `target`, one level at a time.
    ///
    /// Going up, sinks move first; going down, the source does. Stages lagging behind
    /// (a substitute starts in Null) are caught up level by level too.
    pub(crate) fn set_state(
        &mut self,
        target: StageState,
        deadline: Instant,
        out: &mut Vec<Note>,
        preempt: &mut dyn FnMut() -> bool,
    ) -> Result<(), Interrupt> {
        for _ in 0..64 {
            let (lo, hi) = self.bounds(target);
            let (level, upward) = if lo < target {
                (lo, true)
            } else if hi > target {
                (hi, false)
            } else {
                return Ok(());
            };
            let Some(next) = level.step_towards(target) else {
                return Ok(());
            };
            debug!(?level, ?next, "graph level change");
            for id in self.graph.transition_order(upward) {
                if self.graph.stage(id).map(|n| n.state()) != Some(level) {
                    continue;
                }
                if preempt() {
                    return Err(Interrupt::Preempted);
                }
                if Instant::now() >= deadline {
                    let label = self.graph.stage(id).map(|n| n.label()).unwrap_or_default();
                    return Err(Interrupt::Timeout(label));
                }
                self.step_stage(id, level, next, deadline, out, preempt)?;
            }
        }
        Err(Interrupt::Fatal(Fault::session(
            FaultKind::Internal,
            "graph state does not converge",
        )))
    }

    fn bounds(&self, target: StageState) -> (StageState, StageState) {
        let lo = self.graph.stages().map(|n| n.state()).min();
        let hi = self.graph.stages().map(|n| n.state()).max();
        (lo.unwrap_or(target), hi.unwrap_or(target))
    }

    fn step_stage(
        &mut self,
        id: StageId,
        from: StageState,
        to: StageState,
        deadline: Instant,
        out: &mut Vec<Note>,
        preempt: &mut dyn FnMut() -> bool,
    ) -> Result<(), Interrupt> {
        if self.graph.source_id() == Some(id) {
            match (from, to) {
                (StageState::Ready, StageState::Paused) if !self.opened => self.open_source(id, out)?,
                (StageState::Ready, StageState::Null) => self.close_source(),
                _ => {}
            }
            if let Some(node) = self.graph.stage_mut(id) {
                node.state = to;
            }
            return Ok(());
        }

        let ctx = StageContext {
            session: self.env.session,
            config: &self.env.config,
            arbiter: &self.env.arbiter,
            surface: self.env.surface,
        };
        let Some(node) = self.graph.stage_mut(id) else {
            return Ok(());
        };
        let result = match node.element_mut() {
            Some(e) => e.change_state(from, to, &ctx),
            None => Ok(StateChange::Complete),
        };
        match result {
            Ok(StateChange::Complete) => {}
            Ok(StateChange::Async) => loop {
                match node.element_mut().map_or(Ok(true), |e| e.poll_state()) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(fault) => return Err(Interrupt::Fault(Fault::from_stage(node, &fault))),
                }
                if Instant::now() >= deadline {
                    return Err(Interrupt::Timeout(node.label()));
                }
                if preempt() {
                    return Err(Interrupt::Preempted);
                }
                thread::sleep(Duration::from_millis(1));
            },
            Err(fault) => {
                debug!(stage = %node.label(), %fault, "state change refused");
                return Err(Interrupt::Fault(Fault::from_stage(node, &fault)));
            }
        }
        node.state = to;
        Ok(())
    }

    fn open_source(&mut self, id: StageId, out: &mut Vec<Note>) -> Result<(), Interrupt> {
        let Some(mut source) = self.graph.detach_source() else {
            return Err(Interrupt::Fatal(Fault::session(FaultKind::Internal, "source is not attached")));
        };
        let result = self.discover(id, source.as_mut(), out);
        self.graph.attach_source(source);
        result
    }

    fn discover(&mut self, id: StageId, source: &mut dyn Source, out: &mut Vec<Note>) -> Result<(), Interrupt> {
        let ctx = StageContext {
            session: self.env.session,
            config: &self.env.config,
            arbiter: &self.env.arbiter,
            surface: self.env.surface,
        };
        let info = match source.open(&ctx) {
            Ok(info) => info,
            Err(fault) => {
                let fault = match self.graph.stage(id) {
                    Some(node) => Fault::from_stage(node, &fault),
                    None => Fault::session(FaultKind::of(&fault), fault.to_string()),
                };
                return Err(Interrupt::Fatal(fault));
            }
        };
        self.opened = true;
        self.duration = info.duration;
        self.report_metadata(info.duration, &info.tags, out);

        let demux = self.graph.demux_id().ok_or_else(|| {
            Interrupt::Fatal(Fault::session(FaultKind::Internal, "graph has no demux"))
        })?;
        let linker = Linker::new(&self.env.config, &self.env.registry);
        for (track, t) in info.tracks.iter().enumerate() {
            let kind = t.caps.kind;
            let Some(port) = self.graph.add_output_port(demux, CapsTemplate::Compressed(kind)) else {
                continue;
            };
            let mut neg = PortNegotiation::new(port, track, kind);
            for event in source.announce(track) {
                for released in neg.push(event) {
                    match released {
                        PortEvent::StreamStart => out.push(Note::Event(SessionEvent::StreamStarted { kind })),
                        PortEvent::Format(_) => {}
                        PortEvent::Data(buffer) => self.preroll.entry(kind).or_default().push(buffer),
                    }
                }
            }
            if !neg.ready_to_link() {
                neg.reject("stream never announced its format");
            }
            if neg.phase() != PortPhase::Rejected {
                match linker.link(&mut self.graph, &mut neg) {
                    LinkOutcome::Linked { caps, held, .. } => {
                        out.push(Note::Event(SessionEvent::FormatNegotiated { kind, caps }));
                        self.preroll.entry(kind).or_default().extend(held);
                    }
                    LinkOutcome::Rejected(reason) => {
                        self.rejections.entry(kind).or_insert(reason);
                    }
                }
            } else if let Some(reason) = neg.rejection() {
                self.rejections.entry(kind).or_insert_with(|| reason.to_owned());
            }
            if neg.phase() == PortPhase::Rejected && self.negotiations.linked(kind).is_some() {
                out.push(Note::Fault(Fault::session(
                    FaultKind::Warning,
                    format!("extra {kind} stream on track {track} ignored"),
                )));
            }
            self.negotiations.add(neg);
        }
        self.negotiations.set_no_more_ports();

        for kind in self.negotiations.unfed_branches(&self.graph) {
            let reason = self
                .rejections
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| format!("source has no {kind} stream"));
            self.tear_down_branch(kind, &reason, out);
        }
        if !self.has_branches() {
            return Err(Interrupt::Fatal(Fault::session(
                FaultKind::LinkFailure,
                "no branch could be linked",
            )));
        }
        info!(graph = %self.graph.describe(), "source discovered");
        Ok(())
    }

    fn report_metadata(&self, duration: Option<Duration>, tags: &[(String, String)], out: &mut Vec<Note>) {
        if let Some(d) = duration {
            out.push(Note::Event(SessionEvent::MetadataDiscovered {
                key: "duration".to_owned(),
                value: d.as_millis().to_string(),
            }));
        }
        for (key, value) in tags {
            out.push(Note::Event(SessionEvent::MetadataDiscovered {
                key: key.clone(),
                value: value.clone(),
            }));
        }
    }

    fn close_source(&mut self) {
        if let Some(mut source) = self.graph.detach_source() {
            source.close();
            self.graph.attach_source(source);
        }
        self.opened = false;
    }

    /// Step one stage down to Null, ignoring faults.
    fn bring_down(&mut self, id: StageId) {
        let ctx = StageContext {
            session: self.env.session,
            config: &self.env.config,
            arbiter: &self.env.arbiter,
            surface: self.env.surface,
        };
        let Some(node) = self.graph.stage_mut(id) else {
            return;
        };
        while let Some(next) = node.state().step_towards(StageState::Null) {
            let from = node.state();
            if let Some(e) = node.element_mut()
                && let Err(fault) = e.change_state(from, next, &ctx)
            {
                debug!(stage = %node.label(), %fault, "fault while going down ignored");
            }
            node.state = next;
        }
    }

    /// Give up on the `kind` branch; siblings keep running.
    pub(crate) fn tear_down_branch(&mut self, kind: MediaKind, reason: &str, out: &mut Vec<Note>) {
        let Some(bin) = self.graph.bin_for(kind) else {
            return;
        };
        let mut doomed: Vec<StageId> = self
            .graph
            .stages()
            .filter(|n| n.parent().is_none() && n.role() == Role::Filter && n.kind() == Some(kind))
            .map(|n| n.id())
            .collect();
        if let Some(b) = self.graph.bin(bin) {
            doomed.extend(b.stages());
        }
        for id in &doomed {
            self.bring_down(*id);
        }
        let top_level: Vec<StageId> = doomed
            .iter()
            .copied()
            .filter(|id| self.graph.stage(*id).is_some_and(|n| n.parent().is_none()))
            .collect();
        for id in top_level {
            self.graph.remove_stage(id);
        }
        self.graph.remove_bin(bin);
        self.preroll.remove(&kind);
        if let Some(neg) = self
            .negotiations
            .linked(kind)
            .map(PortNegotiation::port)
            .and_then(|p| self.negotiations.get_mut(p))
        {
            neg.reject(reason);
        }
        warn!(%kind, reason, "branch torn down");
        out.push(Note::Event(SessionEvent::BranchRejected {
            kind,
            reason: reason.to_owned(),
        }));
    }

    /// Replace `stage` by the first usable entry of its chain at or after `start`.
    /// The substitute starts in Null and catches up on the next [`set_state`].
    ///
    /// [`set_state`]: GraphRuntime::set_state
    pub(crate) fn substitute(&mut self, stage: StageId, role: Role, kind: MediaKind, start: usize) -> Result<StageId, String> {
        let builder = GraphBuilder::new(&self.env.config, &self.env.registry);
        let mut skipped = Vec::new();
        let candidate = builder
            .instantiate(role, Some(kind), start, &mut skipped)
            .ok_or_else(|| format!("no usable {kind} {role} left in the chain"))?;
        self.bring_down(stage);
        let entry = candidate.entry.clone();
        let (new, _old) = self
            .graph
            .replace_stage(stage, &entry, candidate.chain_index, candidate.stage)
            .map_err(|e| e.to_string())?;
        info!(%kind, %role, entry = %entry, "stage substituted");
        Ok(new)
    }

    /// Move data for `span` through every linked branch, branches in parallel.
    pub(crate) fn tick(&mut self, span: Duration, out: &mut Vec<Note>) {
        if self.halted || self.eos_sent || span.is_zero() {
            return;
        }
        let feeds: Vec<(MediaKind, usize, PortId)> = self
            .negotiations
            .iter()
            .filter(|n| n.phase() == PortPhase::Linked)
            .map(|n| (n.kind(), n.track(), n.port()))
            .collect();
        let Some(mut source) = self.graph.detach_source() else {
            return;
        };

        let mut lanes = Vec::with_capacity(feeds.len());
        let mut live = 0usize;
        for (kind, track, port) in feeds {
            let chain = self.graph.downstream_of(port);
            if chain.is_empty() || self.ended.contains(&kind) {
                continue;
            }
            live += 1;
            let mut input = self.preroll.remove(&kind).unwrap_or_default();
            match source.pull(track, span) {
                Some(buffer) => input.push(buffer),
                None if input.is_empty() => {
                    debug!(%kind, "track ended");
                    self.ended.insert(kind);
                    continue;
                }
                None => {}
            }
            let stages = chain
                .iter()
                .filter_map(|id| self.graph.detach(*id).map(|e| (*id, e)))
                .collect();
            lanes.push(Lane {
                stages,
                input,
                faults: Vec::new(),
                end: None,
            });
        }
        self.graph.attach_source(source);

        self.env.pool.install(|| lanes.par_iter_mut().for_each(Lane::run));

        for lane in lanes {
            for (id, element) in lane.stages {
                self.graph.attach(id, element);
            }
            for (id, fault) in lane.faults {
                let fault = match self.graph.stage(id) {
                    Some(node) => Fault::from_stage(node, &fault),
                    None => Fault::session(FaultKind::of(&fault), fault.to_string()),
                };
                out.push(Note::Fault(fault));
            }
            if let Some(end) = lane.end {
                self.position = self.position.max(end);
            }
        }

        let all_ended = live > 0 && self.live_kinds().iter().all(|k| self.ended.contains(k));
        if all_ended && !self.eos_sent {
            self.eos_sent = true;
            info!(position = ?self.position, "end of stream");
            out.push(Note::EndOfStream);
        }
    }

    fn live_kinds(&self) -> Vec<MediaKind> {
        self.negotiations
            .iter()
            .filter(|n| n.phase() == PortPhase::Linked && !self.graph.downstream_of(n.port()).is_empty())
            .map(|n| n.kind())
            .collect()
    }

    /// Flush every stage and reposition the source. Returns the clamped position.
    pub(crate) fn seek(&mut self, position: Duration) -> Duration {
        let position = self.duration.map_or(position, |d| position.min(d));
        for id in self.graph.stage_ids() {
            if let Some(e) = self.graph.stage_mut(id).and_then(|n| n.element_mut()) {
                e.flush();
            }
        }
        if let Some(mut source) = self.graph.detach_source() {
            source.seek(position);
            self.graph.attach_source(source);
        }
        self.preroll.clear();
        self.ended.clear();
        self.eos_sent = false;
        self.position = position;
        debug!(?position, "flushing seek");
        position
    }

    /// Stop moving data without changing any stage state.
    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }

    /// Undo [`GraphRuntime::halt`].
    pub(crate) fn resume(&mut self) {
        self.halted = false;
    }

    /// Push equalizer gains into the filter stage; `false` when the graph has none.
    pub(crate) fn apply_equalizer(&mut self, bands: &[f64; BAND_COUNT]) -> bool {
        let Some(id) = self.graph.equalizer() else {
            return false;
        };
        let Some(e) = self.graph.stage_mut(id).and_then(|n| n.element_mut()) else {
            return false;
        };
        for (band, gain) in bands.iter().enumerate() {
            e.set_property(&format!("band{band}"), *gain);
        }
        true
    }

    /// Set the audio sink volume; `false` when there is no audio sink.
    pub(crate) fn set_volume(&mut self, volume: f64) -> bool {
        self.graph
            .branch_stage(MediaKind::Audio, Role::Sink)
            .and_then(|id| self.graph.stage_mut(id))
            .and_then(|n| n.element_mut())
            .is_some_and(|e| e.set_property("volume", volume))
    }

    /// Numeric property of the `kind` branch's `role` stage.
    #[cfg(test)]
    pub(crate) fn stage_property(&self, kind: MediaKind, role: Role, name: &str) -> Option<f64> {
        let id = self.graph.branch_stage(kind, role)?;
        self.graph.stage(id)?.element()?.property(name)
    }

    /// Formats of the linked tracks, by track index.
    fn layout(&self) -> BTreeMap<usize, Caps> {
        self.negotiations
            .iter()
            .filter(|n| n.phase() == PortPhase::Linked)
            .filter_map(|n| Some((n.track(), n.format()?)))
            .collect()
    }

    /// Put a source for `uri` in place of the current one when its streams match the
    /// linked layout. `Ok(false)` means the layout differs and the graph must be rebuilt.
    pub(crate) fn swap_source(&mut self, uri: &str, out: &mut Vec<Note>) -> Result<bool, String> {
        let factory = self
            .env
            .config
            .chains
            .get(Role::Source, None)
            .iter()
            .filter_map(|e| self.env.registry.source(factory_name(e)))
            .find(|f| f.handles(uri))
            .ok_or_else(|| format!("no source can read '{uri}'"))?;
        let mut next = factory.create(uri).map_err(|e| e.to_string())?;
        let ctx = StageContext {
            session: self.env.session,
            config: &self.env.config,
            arbiter: &self.env.arbiter,
            surface: self.env.surface,
        };
        let info = next.open(&ctx).map_err(|e| e.to_string())?;

        let layout = self.layout();
        let matches = !layout.is_empty()
            && layout
                .iter()
                .all(|(track, caps)| info.tracks.get(*track).is_some_and(|t| t.caps == *caps));
        if !matches {
            next.close();
            debug!(uri, "next uri has another layout");
            return Ok(false);
        }

        if let Some(mut old) = self.graph.detach_source() {
            old.close();
        }
        self.graph.attach_source(next);
        self.graph.set_uri(uri);
        self.duration = info.duration;
        self.report_metadata(info.duration, &info.tags, out);
        self.seek(Duration::ZERO);
        info!(uri, "source swapped");
        Ok(true)
    }

    /// Bring everything down to Null and close the source. Faults are ignored.
    pub(crate) fn teardown(&mut self) {
        let deadline = Instant::now() + self.env.config.tunables.transition_timeout();
        let mut notes = Vec::new();
        if let Err(err) = self.set_state(StageState::Null, deadline, &mut notes, &mut || false) {
            warn!(?err, "orderly teardown failed; forcing");
            for id in self.graph.transition_order(false) {
                if self.graph.source_id() == Some(id) {
                    self.close_source();
                } else {
                    self.bring_down(id);
                }
            }
        }
        self.close_source();
        debug!(uri = self.graph.uri(), "graph torn down");
    }
}

impl std::fmt::Debug for GraphRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRuntime")
            .field("graph", &self.graph)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/runtime.rs"]
mod tests;
