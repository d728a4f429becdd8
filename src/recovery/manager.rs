use std::collections::BTreeMap;

use tracing::{error, warn};

use crate::config::{PipelineConfig, Tunables};
use crate::foundation::core::{MediaKind, Role, StageId};
use crate::recovery::fault::{Fault, FaultKind};

/// Limits applied by a [`RecoveryManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Substitutions allowed per session.
    pub max_attempts: u32,
    /// Decode errors tolerated per branch.
    pub decode_error_threshold: u32,
}

impl From<&Tunables> for RecoveryPolicy {
    fn from(t: &Tunables) -> Self {
        Self {
            max_attempts: t.max_recovery_attempts,
            decode_error_threshold: t.decode_error_threshold,
        }
    }
}

/// What the session should do about a fault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Replace `stage` by the first usable entry of its chain at or after `start`.
    Substitute {
        /// Faulting stage.
        stage: StageId,
        /// Its role.
        role: Role,
        /// Its branch.
        kind: MediaKind,
        /// First chain index to try.
        start: usize,
        /// Substitutions made so far, this one included.
        attempt: u32,
    },
    /// Drop the buffer and carry on.
    Tolerate {
        /// Decode errors seen on the branch so far.
        count: u32,
    },
    /// Give up on one branch; siblings keep playing.
    TearDownBranch(MediaKind),
    /// Nothing to do beyond reporting.
    Report,
    /// The session cannot continue.
    Fatal(String),
}

/// Decides how a session answers faults, and keeps the budgets.
#[derive(Debug)]
pub struct RecoveryManager {
    policy: RecoveryPolicy,
    attempts: u32,
    decode_errors: BTreeMap<MediaKind, u32>,
}

impl RecoveryManager {
    /// Manager with fresh budgets.
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            decode_errors: BTreeMap::new(),
        }
    }

    /// Substitutions made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decode errors counted on `kind`.
    pub fn decode_errors(&self, kind: MediaKind) -> u32 {
        self.decode_errors.get(&kind).copied().unwrap_or(0)
    }

    /// Forget decode errors (new source or new graph).
    pub fn reset_decode_errors(&mut self) {
        self.decode_errors.clear();
    }

    /// Decide what to do about `fault`. `chain_index` is the faulting stage's position
    /// in its chain.
    pub fn on_fault(
        &mut self,
        fault: &Fault,
        chain_index: Option<usize>,
        config: &PipelineConfig,
    ) -> RecoveryAction {
        match fault.kind {
            FaultKind::ResourceBusy | FaultKind::MissingStage => self.substitute(fault, chain_index, config),
            FaultKind::DecodeError => {
                let Some(kind) = fault.branch() else {
                    return RecoveryAction::Fatal(format!("unattributed decode error: {}", fault.message));
                };
                let count = self.decode_errors.entry(kind).or_insert(0);
                *count += 1;
                if *count > self.policy.decode_error_threshold {
                    warn!(%kind, errors = *count, "decode error threshold exceeded");
                    RecoveryAction::TearDownBranch(kind)
                } else {
                    RecoveryAction::Tolerate { count: *count }
                }
            }
            FaultKind::Warning | FaultKind::ProbeFailure => RecoveryAction::Report,
            FaultKind::LinkFailure => match fault.branch() {
                Some(kind) => RecoveryAction::TearDownBranch(kind),
                None => RecoveryAction::Report,
            },
            FaultKind::BuildFailure | FaultKind::TransitionTimeout | FaultKind::Internal => {
                RecoveryAction::Fatal(fault.to_string())
            }
        }
    }

    fn substitute(&mut self, fault: &Fault, chain_index: Option<usize>, config: &PipelineConfig) -> RecoveryAction {
        let (Some(stage), Some(label)) = (fault.stage, fault.label.as_ref()) else {
            return RecoveryAction::Fatal(fault.to_string());
        };
        let Some(kind) = label.kind.filter(|_| label.role.is_per_branch()) else {
            return RecoveryAction::Fatal(format!("no substitute for {label}: {}", fault.message));
        };
        let start = chain_index.map_or(0, |i| i + 1);
        if config.chains.get(label.role, Some(kind)).len() <= start {
            error!(%label, "fallback chain exhausted");
            return RecoveryAction::Fatal(format!("fallback chain exhausted for {label}: {}", fault.message));
        }
        if self.attempts >= self.policy.max_attempts {
            error!(%label, attempts = self.attempts, "recovery budget exhausted");
            return RecoveryAction::Fatal(format!(
                "recovery budget of {} exhausted at {label}: {}",
                self.policy.max_attempts, fault.message
            ));
        }
        self.attempts += 1;
        RecoveryAction::Substitute {
            stage,
            role: label.role,
            kind,
            start,
            attempt: self.attempts,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/recovery/manager.rs"]
mod tests;
