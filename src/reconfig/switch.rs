use std::mem;
use std::time::Duration;

use tracing::{info, warn};

use crate::foundation::core::FilterKind;
use crate::playback::runtime::{Environment, GraphRuntime, Interrupt, Note};
use crate::recovery::{Fault, FaultKind};

/// What a completed backend switch did.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BackendSwitch {
    pub filters: Vec<FilterKind>,
    pub captured: Duration,
    pub resumed_at: Duration,
}

/// Replace `active` by a graph carrying `filters`, without stopping the session.
///
/// The active graph is halted (its stages keep their state) while the alternate one is
/// built, driven by `drive` and seeked to the captured position. Only then are the two
/// swapped and the old one torn down. On any failure the alternate graph is discarded
/// and `active` resumes where it was.
///
/// `drive` receives the build notes first, so events keep their order.
pub(crate) fn stage_backend<D>(
    active: &mut GraphRuntime,
    env: &Environment,
    filters: &[FilterKind],
    allow_degraded: bool,
    mut drive: D,
) -> Result<BackendSwitch, Interrupt>
where
    D: FnMut(&mut GraphRuntime, Vec<Note>) -> Result<(), Interrupt>,
{
    let uri = active.graph().uri().to_owned();
    let captured = active.position();
    active.halt();

    let mut notes = Vec::new();
    let mut next = match GraphRuntime::build(env, &uri, filters, allow_degraded, &mut notes) {
        Ok(rt) => rt,
        Err(err) => {
            active.resume();
            warn!(%err, "alternate graph could not be built");
            return Err(Interrupt::Fatal(Fault::session(
                FaultKind::BuildFailure,
                err.to_string(),
            )));
        }
    };
    if let Err(interrupt) = drive(&mut next, notes) {
        next.teardown();
        active.resume();
        return Err(interrupt);
    }
    let resumed_at = next.seek(captured);

    mem::swap(active, &mut next);
    next.teardown();
    info!(
        graph = %active.graph().describe(),
        ?captured,
        ?resumed_at,
        "backend switched"
    );
    Ok(BackendSwitch {
        filters: active.filters().to_vec(),
        captured,
        resumed_at,
    })
}
