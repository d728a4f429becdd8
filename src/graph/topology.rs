use std::fmt;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::factories;
use crate::foundation::core::{BinId, Caps, CapsTemplate, MediaKind, PortId, Role, StageId};
use crate::graph::elements::CapsFilter;
use crate::graph::source::Source;
use crate::graph::stage::{Stage, StageState, port_templates};

/// Which way data crosses a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Data enters the owner.
    Input,
    /// Data leaves the owner.
    Output,
}

/// Owner of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortOwner {
    /// A regular stage port.
    Stage(StageId),
    /// A ghost port exposing a bin's entry.
    Bin(BinId),
}

/// A typed connection point.
#[derive(Clone, Debug)]
pub struct Port {
    id: PortId,
    name: String,
    owner: PortOwner,
    direction: Direction,
    template: CapsTemplate,
    peer: Option<PortId>,
    format: Option<Caps>,
    target: Option<PortId>,
}

impl Port {
    /// Port id.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Port name (`sink`, `src`, `src_0`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage or bin owning the port.
    pub fn owner(&self) -> PortOwner {
        self.owner
    }

    /// Data direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Formats the port can carry.
    pub fn template(&self) -> CapsTemplate {
        self.template
    }

    /// Linked peer, if any.
    pub fn peer(&self) -> Option<PortId> {
        self.peer
    }

    /// Negotiated format; only set while linked.
    pub fn format(&self) -> Option<Caps> {
        self.format
    }

    /// Internal port a ghost forwards to.
    pub fn ghost_target(&self) -> Option<PortId> {
        self.target
    }

    /// Return `true` for bin ghost ports.
    pub fn is_ghost(&self) -> bool {
        matches!(self.owner, PortOwner::Bin(_))
    }
}

/// What occupies a stage slot.
pub enum StageBody {
    /// The graph's source.
    Source(Box<dyn Source>),
    /// Any other stage.
    Element(Box<dyn Stage>),
    /// Temporarily lent out (branch processing).
    Detached,
}

/// A stage and its place in the graph.
pub struct StageNode {
    id: StageId,
    role: Role,
    kind: Option<MediaKind>,
    entry: String,
    chain_index: Option<usize>,
    parent: Option<BinId>,
    input: Option<PortId>,
    outputs: SmallVec<[PortId; 4]>,
    pub(crate) state: StageState,
    pub(crate) body: StageBody,
}

impl StageNode {
    /// Stage id.
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Role in the graph.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Branch kind; `None` for source and demux.
    pub fn kind(&self) -> Option<MediaKind> {
        self.kind
    }

    /// Chain entry the stage was created from (`alsasink@hw:0,0`).
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Position of [`StageNode::entry`] in its chain; `None` for synthesized stages.
    pub fn chain_index(&self) -> Option<usize> {
        self.chain_index
    }

    /// Bin containing the stage; `None` at top level.
    pub fn parent(&self) -> Option<BinId> {
        self.parent
    }

    /// Static input port.
    pub fn input(&self) -> Option<PortId> {
        self.input
    }

    /// Output ports.
    pub fn outputs(&self) -> &[PortId] {
        &self.outputs
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StageState {
        self.state
    }

    /// `role kind (entry)` for logs and fault reports.
    pub fn label(&self) -> String {
        match self.kind {
            Some(kind) => format!("{kind} {} ({})", self.role, self.entry),
            None => format!("{} ({})", self.role, self.entry),
        }
    }

    /// The element behind the stage, unless it is the source or lent out.
    pub fn element(&self) -> Option<&dyn Stage> {
        match &self.body {
            StageBody::Element(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Mutable access to the element behind the stage.
    pub fn element_mut(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        match &mut self.body {
            StageBody::Element(e) => Some(e.as_mut()),
            _ => None,
        }
    }
}

/// A branch sub-graph exposed through one ghost port.
#[derive(Clone, Debug)]
pub struct Bin {
    id: BinId,
    kind: MediaKind,
    stages: Vec<StageId>,
    ghost: Option<PortId>,
}

impl Bin {
    /// Bin id.
    pub fn id(&self) -> BinId {
        self.id
    }

    /// Branch kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Stages from upstream to downstream.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Ghost port, once exposed.
    pub fn ghost(&self) -> Option<PortId> {
        self.ghost
    }
}

/// Why two ports could not be linked.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// One side already has a peer.
    #[error("port {0:?} is already linked")]
    AlreadyLinked(PortId),

    /// The destination refuses the format.
    #[error("format refused: {0}")]
    NoFormat(String),

    /// The ports are compatible but live in different containers.
    #[error("ports are not in the same container")]
    WrongHierarchy,

    /// Output must be linked to input.
    #[error("ports have the wrong direction")]
    WrongDirection,

    /// No such port.
    #[error("unknown port {0:?}")]
    UnknownPort(PortId),
}

/// Stages, ports and bins of one playback graph.
///
/// The graph is an arena: ids stay valid until the item is removed, and removed slots
/// are never reused.
pub struct Graph {
    uri: String,
    stages: Vec<Option<StageNode>>,
    ports: Vec<Option<Port>>,
    bins: Vec<Option<Bin>>,
    source: Option<StageId>,
    demux: Option<StageId>,
}

impl Graph {
    /// Empty graph for `uri`.
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            stages: Vec::new(),
            ports: Vec::new(),
            bins: Vec::new(),
            source: None,
            demux: None,
        }
    }

    /// URI the graph plays.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Source stage.
    pub fn source_id(&self) -> Option<StageId> {
        self.source
    }

    /// Demux stage.
    pub fn demux_id(&self) -> Option<StageId> {
        self.demux
    }

    /// Add a stage with the default ports of its role.
    pub fn add_stage(
        &mut self,
        role: Role,
        kind: Option<MediaKind>,
        entry: &str,
        chain_index: Option<usize>,
        parent: Option<BinId>,
        body: StageBody,
    ) -> StageId {
        let templates = match kind {
            Some(kind) => port_templates(role, kind),
            None => (None, None),
        };
        let id = self.push_stage(role, kind, entry, chain_index, parent, body, templates);
        if let Some(bin) = parent.and_then(|b| self.bin_mut(b)) {
            bin.stages.push(id);
        }
        id
    }

    /// Add a top-level pass-through stage pinned to `caps`.
    pub fn add_capsfilter(&mut self, caps: Caps) -> StageId {
        self.push_stage(
            Role::Filter,
            Some(caps.kind),
            factories::CAPSFILTER,
            None,
            None,
            StageBody::Element(Box::new(CapsFilter::new(caps))),
            (Some(CapsTemplate::Exact(caps)), Some(CapsTemplate::Exact(caps))),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn push_stage(
        &mut self,
        role: Role,
        kind: Option<MediaKind>,
        entry: &str,
        chain_index: Option<usize>,
        parent: Option<BinId>,
        body: StageBody,
        (input, output): (Option<CapsTemplate>, Option<CapsTemplate>),
    ) -> StageId {
        let id = StageId(self.stages.len() as u32);
        let input = input.map(|t| self.push_port("sink", PortOwner::Stage(id), Direction::Input, t));
        let outputs = output
            .map(|t| self.push_port("src", PortOwner::Stage(id), Direction::Output, t))
            .into_iter()
            .collect();
        self.stages.push(Some(StageNode {
            id,
            role,
            kind,
            entry: entry.to_owned(),
            chain_index,
            parent,
            input,
            outputs,
            state: StageState::Null,
            body,
        }));
        match role {
            Role::Source => self.source = Some(id),
            Role::Demux => self.demux = Some(id),
            _ => {}
        }
        id
    }

    fn push_port(
        &mut self,
        name: &str,
        owner: PortOwner,
        direction: Direction,
        template: CapsTemplate,
    ) -> PortId {
        let id = PortId(self.ports.len() as u32);
        self.ports.push(Some(Port {
            id,
            name: name.to_owned(),
            owner,
            direction,
            template,
            peer: None,
            format: None,
            target: None,
        }));
        id
    }

    /// Grow a dynamic output port on `stage` (the demux does this per discovered stream).
    pub fn add_output_port(&mut self, stage: StageId, template: CapsTemplate) -> Option<PortId> {
        let index = self.stage(stage)?.outputs.len();
        let port = self.push_port(
            &format!("src_{index}"),
            PortOwner::Stage(stage),
            Direction::Output,
            template,
        );
        self.stage_mut(stage)?.outputs.push(port);
        Some(port)
    }

    /// New empty bin for a `kind` branch.
    pub fn add_bin(&mut self, kind: MediaKind) -> BinId {
        let id = BinId(self.bins.len() as u32);
        self.bins.push(Some(Bin {
            id,
            kind,
            stages: Vec::new(),
            ghost: None,
        }));
        id
    }

    /// Expose `target` (an input port of a stage inside `bin`) through the bin's ghost
    /// port, creating the ghost on first use and retargeting it afterwards.
    pub fn expose_ghost(&mut self, bin: BinId, target: PortId) -> Result<PortId, LinkError> {
        let t = self.port(target).ok_or(LinkError::UnknownPort(target))?;
        let inside = match t.owner {
            PortOwner::Stage(s) => self.stage(s).and_then(|n| n.parent) == Some(bin),
            PortOwner::Bin(_) => false,
        };
        if !inside || t.direction != Direction::Input {
            return Err(LinkError::WrongHierarchy);
        }
        let template = t.template;
        let existing = self.bin(bin).and_then(|b| b.ghost);
        let ghost = match existing {
            Some(g) => g,
            None => {
                let g = self.push_port("sink", PortOwner::Bin(bin), Direction::Input, template);
                if let Some(b) = self.bin_mut(bin) {
                    b.ghost = Some(g);
                }
                g
            }
        };
        let format = self.port(ghost).and_then(|p| p.format);
        if let Some(p) = self.port_mut(ghost) {
            p.target = Some(target);
            p.template = template;
        }
        if let Some(p) = self.port_mut(target) {
            p.format = format;
        }
        Ok(ghost)
    }

    /// Link output `src` to input `dst`, optionally fixing the negotiated `caps`.
    ///
    /// Checks run in order: direction, existing peers, format, hierarchy. A
    /// [`LinkError::WrongHierarchy`] therefore means the format would have been fine.
    pub fn link(&mut self, src: PortId, dst: PortId, caps: Option<Caps>) -> Result<(), LinkError> {
        let s = self.port(src).ok_or(LinkError::UnknownPort(src))?;
        let d = self.port(dst).ok_or(LinkError::UnknownPort(dst))?;
        if s.direction != Direction::Output || d.direction != Direction::Input {
            return Err(LinkError::WrongDirection);
        }
        if s.peer.is_some() {
            return Err(LinkError::AlreadyLinked(src));
        }
        if d.peer.is_some() {
            return Err(LinkError::AlreadyLinked(dst));
        }

        if let Some(caps) = caps {
            if !s.template.accepts(&caps) {
                return Err(LinkError::NoFormat(format!("{caps} does not fit the output port")));
            }
            let accepting = if d.is_ghost() {
                d.target.ok_or_else(|| LinkError::NoFormat("ghost port has no target".into()))?
            } else {
                dst
            };
            let a = self.port(accepting).ok_or(LinkError::UnknownPort(accepting))?;
            if !d.template.accepts(&caps) || !a.template.accepts(&caps) {
                return Err(LinkError::NoFormat(format!("{caps} does not fit {}", a.template.kind())));
            }
            if let PortOwner::Stage(owner) = a.owner
                && !self.stage(owner).is_some_and(|n| n.element().is_some_and(|e| e.accepts(&caps)))
            {
                let label = self.stage(owner).map(StageNode::label).unwrap_or_default();
                return Err(LinkError::NoFormat(format!("{label} refuses {caps}")));
            }
        } else if s.template.kind() != d.template.kind() {
            return Err(LinkError::NoFormat(format!(
                "cannot link {} to {}",
                s.template.kind(),
                d.template.kind()
            )));
        }

        if self.container_of(src) != self.container_of(dst) {
            return Err(LinkError::WrongHierarchy);
        }

        let target = self.port(dst).and_then(|p| p.target);
        if let Some(p) = self.port_mut(src) {
            p.peer = Some(dst);
            p.format = caps;
        }
        if let Some(p) = self.port_mut(dst) {
            p.peer = Some(src);
            p.format = caps;
        }
        if let Some(t) = target
            && let Some(p) = self.port_mut(t)
        {
            p.format = caps;
        }
        debug!(?src, ?dst, caps = ?caps, "ports linked");
        Ok(())
    }

    /// Break the link of `port` (both sides forget the peer and the format).
    pub fn unlink(&mut self, port: PortId) {
        let Some(peer) = self.port(port).and_then(|p| p.peer) else {
            return;
        };
        for id in [port, peer] {
            let target = self.port(id).and_then(|p| p.target);
            if let Some(p) = self.port_mut(id) {
                p.peer = None;
                p.format = None;
            }
            if let Some(t) = target
                && let Some(p) = self.port_mut(t)
            {
                p.format = None;
            }
        }
    }

    /// Carry the format of a freshly linked input downstream through the static links.
    pub fn propagate_formats(&mut self, from: PortId) {
        let mut port = self.resolve_ghost(from);
        let mut seen = 0usize;
        while let Some(p) = self.port(port) {
            let Some(caps) = p.format else { break };
            let PortOwner::Stage(owner) = p.owner else { break };
            let Some(node) = self.stage(owner) else { break };
            let out_caps = node.element().map_or(caps, |e| e.output_caps(&caps));
            let Some(&out) = node.outputs.first() else { break };
            let Some(next) = self.port(out).and_then(|o| o.peer) else { break };

            for id in [out, next] {
                if let Some(p) = self.port_mut(id) {
                    p.format = Some(out_caps);
                }
            }
            port = self.resolve_ghost(next);
            if let Some(p) = self.port_mut(port) {
                p.format = Some(out_caps);
            }
            seen += 1;
            if seen > self.stages.len() {
                warn!("format propagation loop detected");
                break;
            }
        }
    }

    /// Replace stage `old` by a new one built from `entry`, keeping its links.
    ///
    /// The new stage takes the old one's place in its bin (and ghost port) and starts
    /// in [`StageState::Null`]. The old body is handed back for disposal.
    pub fn replace_stage(
        &mut self,
        old: StageId,
        entry: &str,
        chain_index: usize,
        body: Box<dyn Stage>,
    ) -> Result<(StageId, StageBody), LinkError> {
        let (role, kind, parent, input, outputs) = {
            let n = self
                .stage(old)
                .ok_or_else(|| LinkError::NoFormat(format!("stage {old:?} does not exist")))?;
            (n.role, n.kind, n.parent, n.input, n.outputs.clone())
        };
        let Some(kind) = kind else {
            return Err(LinkError::NoFormat(format!("{old:?} is not a branch stage")));
        };

        let ghost = parent
            .and_then(|b| self.bin(b))
            .and_then(|b| b.ghost)
            .filter(|g| input.is_some() && self.port(*g).and_then(|p| p.target) == input);
        let upstream = input
            .and_then(|i| self.port(i))
            .and_then(|p| p.peer.map(|peer| (peer, p.format)));
        let downstream = outputs
            .first()
            .and_then(|o| self.port(*o))
            .and_then(|p| p.peer);
        let ghost_format = ghost.and_then(|g| self.port(g)).and_then(|p| p.format);

        for port in input.into_iter().chain(outputs.iter().copied()) {
            self.unlink(port);
        }

        let new = self.push_stage(
            role,
            Some(kind),
            entry,
            Some(chain_index),
            parent,
            StageBody::Element(body),
            port_templates(role, kind),
        );
        if let Some(bin) = parent.and_then(|b| self.bin_mut(b))
            && let Some(slot) = bin.stages.iter_mut().find(|s| **s == old)
        {
            *slot = new;
        }
        let old_body = self.drop_stage(old);

        let new_input = self.stage(new).and_then(|n| n.input);
        let new_output = self.stage(new).and_then(|n| n.outputs.first().copied());

        if let (Some(g), Some(i)) = (ghost, new_input) {
            self.expose_ghost(parent.ok_or(LinkError::WrongHierarchy)?, i)?;
            if let Some(caps) = ghost_format {
                let accepted = self
                    .stage(new)
                    .and_then(StageNode::element)
                    .is_some_and(|e| e.accepts(&caps));
                if !accepted {
                    return Err(LinkError::NoFormat(format!("{entry} refuses {caps}")));
                }
                if let Some(p) = self.port_mut(i) {
                    p.format = Some(caps);
                }
            }
            debug!(ghost = ?g, "ghost retargeted");
        }
        if let (Some((peer, format)), Some(i)) = (upstream, new_input) {
            self.link(peer, i, format)?;
        }
        if let (Some(down), Some(o)) = (downstream, new_output) {
            self.link(o, down, None)?;
        }
        if let Some(i) = new_input {
            self.propagate_formats(i);
        }
        Ok((new, old_body.unwrap_or(StageBody::Detached)))
    }

    /// Remove a stage, unlinking its ports. Returns its body.
    pub fn remove_stage(&mut self, id: StageId) -> Option<StageBody> {
        let (input, outputs, parent) = {
            let n = self.stage(id)?;
            (n.input, n.outputs.clone(), n.parent)
        };
        for port in input.into_iter().chain(outputs.iter().copied()) {
            self.unlink(port);
        }
        if let Some(bin) = parent.and_then(|b| self.bin_mut(b)) {
            bin.stages.retain(|s| *s != id);
        }
        if let (Some(b), Some(i)) = (parent, input)
            && let Some(g) = self.bin(b).and_then(|b| b.ghost)
            && self.port(g).and_then(|p| p.target) == Some(i)
            && let Some(p) = self.port_mut(g)
        {
            p.target = None;
        }
        self.drop_stage(id)
    }

    fn drop_stage(&mut self, id: StageId) -> Option<StageBody> {
        let node = self.stages.get_mut(id.0 as usize)?.take()?;
        for port in node.input.into_iter().chain(node.outputs.iter().copied()) {
            if let Some(slot) = self.ports.get_mut(port.0 as usize) {
                *slot = None;
            }
        }
        if self.source == Some(id) {
            self.source = None;
        }
        if self.demux == Some(id) {
            self.demux = None;
        }
        Some(node.body)
    }

    /// Remove a whole branch. Returns the bodies of its stages, upstream first.
    pub fn remove_bin(&mut self, bin: BinId) -> Vec<StageBody> {
        let Some(b) = self.bin(bin).cloned() else {
            return Vec::new();
        };
        if let Some(g) = b.ghost {
            self.unlink(g);
            if let Some(slot) = self.ports.get_mut(g.0 as usize) {
                *slot = None;
            }
        }
        let bodies = b
            .stages
            .iter()
            .filter_map(|s| self.remove_stage(*s))
            .collect();
        if let Some(slot) = self.bins.get_mut(bin.0 as usize) {
            *slot = None;
        }
        bodies
    }

    /// Stage by id.
    pub fn stage(&self, id: StageId) -> Option<&StageNode> {
        self.stages.get(id.0 as usize)?.as_ref()
    }

    /// Mutable stage by id.
    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut StageNode> {
        self.stages.get_mut(id.0 as usize)?.as_mut()
    }

    /// Every live stage.
    pub fn stages(&self) -> impl Iterator<Item = &StageNode> {
        self.stages.iter().flatten()
    }

    /// Port by id.
    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id.0 as usize)?.as_ref()
    }

    fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.ports.get_mut(id.0 as usize)?.as_mut()
    }

    /// Bin by id.
    pub fn bin(&self, id: BinId) -> Option<&Bin> {
        self.bins.get(id.0 as usize)?.as_ref()
    }

    fn bin_mut(&mut self, id: BinId) -> Option<&mut Bin> {
        self.bins.get_mut(id.0 as usize)?.as_mut()
    }

    /// Every live bin.
    pub fn bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter().flatten()
    }

    /// Bin of the `kind` branch.
    pub fn bin_for(&self, kind: MediaKind) -> Option<BinId> {
        self.bins().find(|b| b.kind == kind).map(|b| b.id)
    }

    /// Where a discovered `kind` port should be linked: the ghost port when it has a
    /// target, the first stage's input otherwise.
    pub fn branch_entry(&self, kind: MediaKind) -> Option<PortId> {
        let bin = self.bin(self.bin_for(kind)?)?;
        if let Some(g) = bin.ghost
            && self.port(g).is_some_and(|p| p.target.is_some())
        {
            return Some(g);
        }
        self.stage(*bin.stages.first()?)?.input
    }

    /// Stage of `role` inside the `kind` branch.
    pub fn branch_stage(&self, kind: MediaKind, role: Role) -> Option<StageId> {
        let bin = self.bin(self.bin_for(kind)?)?;
        bin.stages
            .iter()
            .copied()
            .find(|s| self.stage(*s).is_some_and(|n| n.role == role))
    }

    /// The equalizer stage, if the graph has one.
    pub fn equalizer(&self) -> Option<StageId> {
        self.stages()
            .find(|n| n.role == Role::Filter && n.entry == factories::EQUALIZER)
            .map(|n| n.id)
    }

    /// Stages data crosses after leaving output `port`, following links and ghosts.
    pub fn downstream_of(&self, port: PortId) -> Vec<StageId> {
        let mut chain = Vec::new();
        let mut cur = port;
        while let Some(peer) = self.port(cur).and_then(|p| p.peer) {
            let dst = self.resolve_ghost(peer);
            let Some(PortOwner::Stage(owner)) = self.port(dst).map(|p| p.owner) else {
                break;
            };
            if chain.contains(&owner) {
                break;
            }
            chain.push(owner);
            match self.stage(owner).and_then(|n| n.outputs.first().copied()) {
                Some(out) => cur = out,
                None => break,
            }
        }
        chain
    }

    fn resolve_ghost(&self, port: PortId) -> PortId {
        self.port(port).and_then(|p| p.target).unwrap_or(port)
    }

    fn container_of(&self, port: PortId) -> Option<BinId> {
        match self.port(port)?.owner {
            PortOwner::Stage(s) => self.stage(s)?.parent,
            PortOwner::Bin(_) => None,
        }
    }

    /// Order in which stages change state: sinks first going up, source first going
    /// down.
    pub fn transition_order(&self, upward: bool) -> Vec<StageId> {
        let mut order: Vec<StageId> = Vec::new();
        for bin in self.bins() {
            order.extend(bin.stages.iter().rev().copied());
        }
        order.extend(
            self.stages()
                .filter(|n| n.parent.is_none() && n.role.is_per_branch())
                .map(|n| n.id),
        );
        order.extend(self.demux);
        order.extend(self.source);
        if !upward {
            order.reverse();
        }
        order
    }

    /// Lowest state among all stages (the state the graph as a whole is in).
    pub fn settled_state(&self) -> StageState {
        self.stages()
            .map(|n| n.state)
            .min()
            .unwrap_or(StageState::Null)
    }

    /// Lend a stage's element out; [`Graph::attach`] gives it back.
    pub fn detach(&mut self, id: StageId) -> Option<Box<dyn Stage>> {
        let node = self.stage_mut(id)?;
        match std::mem::replace(&mut node.body, StageBody::Detached) {
            StageBody::Element(e) => Some(e),
            other => {
                node.body = other;
                None
            }
        }
    }

    /// Return an element lent out with [`Graph::detach`].
    pub fn attach(&mut self, id: StageId, element: Box<dyn Stage>) {
        if let Some(node) = self.stage_mut(id) {
            node.body = StageBody::Element(element);
        }
    }

    /// Lend the source out; [`Graph::attach_source`] gives it back.
    pub fn detach_source(&mut self) -> Option<Box<dyn Source>> {
        let id = self.source?;
        let node = self.stage_mut(id)?;
        match std::mem::replace(&mut node.body, StageBody::Detached) {
            StageBody::Source(s) => Some(s),
            other => {
                node.body = other;
                None
            }
        }
    }

    /// Return (or replace) the source.
    pub fn attach_source(&mut self, source: Box<dyn Source>) {
        if let Some(node) = self.source.and_then(|id| self.stage_mut(id)) {
            node.body = StageBody::Source(source);
        }
    }

    /// Point the graph at another URI (the source was swapped).
    pub fn set_uri(&mut self, uri: &str) {
        uri.clone_into(&mut self.uri);
    }

    /// Ids of every live stage.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages().map(|n| n.id).collect()
    }

    /// One-line description, gst-launch style.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = [self.source, self.demux]
            .into_iter()
            .flatten()
            .filter_map(|s| self.stage(s))
            .map(|n| n.entry.clone())
            .collect();
        for bin in self.bins() {
            let inner: Vec<&str> = bin
                .stages
                .iter()
                .filter_map(|s| self.stage(*s))
                .map(|n| n.entry.as_str())
                .collect();
            parts.push(format!("[{}: {}]", bin.kind, inner.join(" ! ")));
        }
        parts.join(" ! ")
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("uri", &self.uri)
            .field("stages", &self.describe())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for StageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageBody::Source(_) => f.write_str("Source(..)"),
            StageBody::Element(_) => f.write_str("Element(..)"),
            StageBody::Detached => f.write_str("Detached"),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/topology.rs"]
mod tests;
