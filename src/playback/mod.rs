//! Sessions: one worker thread per opened URI.
//!
//! The caller holds a [`SessionHandle`]; requests travel to the worker over a channel
//! and are applied in order, except that `Stop` (and dropping the handle) preempt a
//! state change in flight. Everything the worker does is reported on one ordered
//! [`SessionEvent`] stream.
//!
//! A session walks Idle -> Ready -> Paused <-> Playing. `Stop` tears the graph down
//! (Stopped); an unrecoverable fault does the same but lands in Error. From either,
//! `Play` builds a fresh graph.

mod control;
mod events;
pub(crate) mod runtime;
mod session;
mod state;

pub use control::{Control, EosPolicy};
pub use events::{SessionEvent, Severity};
pub(crate) use session::SessionSetup;
pub use session::{SessionHandle, SessionSnapshot};
pub use state::SessionState;
