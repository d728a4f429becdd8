use std::fmt;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{MediaKind, Role, StageId};
use crate::graph::stage::StageFault;
use crate::graph::topology::StageNode;

/// Fault taxonomy carried on the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Capability probing degraded.
    ProbeFailure,
    /// A graph could not be built.
    BuildFailure,
    /// A port could not be linked; its branch is lost.
    LinkFailure,
    /// A device or surface is held elsewhere.
    ResourceBusy,
    /// A stage implementation is gone.
    MissingStage,
    /// A buffer could not be decoded.
    DecodeError,
    /// A state transition missed its deadline.
    TransitionTimeout,
    /// Anything worth telling that changes nothing.
    Warning,
    /// A stage or the worker misbehaved (panic, broken invariant).
    Internal,
}

impl FaultKind {
    /// Stable kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::ProbeFailure => "probe-failure",
            FaultKind::BuildFailure => "build-failure",
            FaultKind::LinkFailure => "link-failure",
            FaultKind::ResourceBusy => "resource-busy",
            FaultKind::MissingStage => "missing-stage",
            FaultKind::DecodeError => "decode-error",
            FaultKind::TransitionTimeout => "transition-timeout",
            FaultKind::Warning => "warning",
            FaultKind::Internal => "internal",
        }
    }

    /// Kind of a stage-level fault.
    pub fn of(fault: &StageFault) -> Self {
        match fault {
            StageFault::ResourceBusy(_) => FaultKind::ResourceBusy,
            StageFault::Missing(_) => FaultKind::MissingStage,
            StageFault::Decode(_) => FaultKind::DecodeError,
            StageFault::Failed(_) => FaultKind::Internal,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a fault came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLabel {
    /// Role of the stage.
    pub role: Role,
    /// Branch kind, if any.
    pub kind: Option<MediaKind>,
    /// Chain entry the stage was created from.
    pub entry: String,
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind} {} ({})", self.role, self.entry),
            None => write!(f, "{} ({})", self.role, self.entry),
        }
    }
}

/// One fault, tagged with its stage when it has one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    /// Taxonomy entry.
    pub kind: FaultKind,
    /// Faulting stage.
    pub stage: Option<StageId>,
    /// Description of the faulting stage.
    pub label: Option<StageLabel>,
    /// Message from the stage or the worker.
    pub message: String,
}

impl Fault {
    /// Fault raised by the stage behind `node`.
    pub fn from_stage(node: &StageNode, fault: &StageFault) -> Self {
        Self {
            kind: FaultKind::of(fault),
            stage: Some(node.id()),
            label: Some(StageLabel {
                role: node.role(),
                kind: node.kind(),
                entry: node.entry().to_owned(),
            }),
            message: fault.to_string(),
        }
    }

    /// Fault not tied to a stage.
    pub fn session(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: None,
            label: None,
            message: message.into(),
        }
    }

    /// Branch of the faulting stage.
    pub fn branch(&self) -> Option<MediaKind> {
        self.label.as_ref().and_then(|l| l.kind)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}: {label}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
