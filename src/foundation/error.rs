/// Result alias used by every synchronous entry point of the crate.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Failures reported synchronously to the caller.
///
/// Faults that happen on a session worker are reported as
/// [`SessionEvent::Fault`](crate::SessionEvent::Fault) instead.
#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    /// Host probing could not complete.
    #[error("probe failure: {0}")]
    Probe(String),

    /// No usable graph could be assembled.
    #[error("build failure: {0}")]
    Build(String),

    /// A port could not be linked.
    #[error("link failure: {0}")]
    Link(String),

    /// An exclusive device or output surface is held elsewhere.
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    /// Media data could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A state transition did not complete before its deadline.
    #[error("transition timeout: {0}")]
    TransitionTimeout(String),

    /// The request itself is malformed (out-of-range value, unknown preset, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The session worker has shut down.
    #[error("session closed")]
    SessionClosed,

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlaybackError {
    /// Build a [`PlaybackError::Probe`].
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Build a [`PlaybackError::Build`].
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    /// Build a [`PlaybackError::Link`].
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    /// Build a [`PlaybackError::ResourceBusy`].
    pub fn resource_busy(msg: impl Into<String>) -> Self {
        Self::ResourceBusy(msg.into())
    }

    /// Build a [`PlaybackError::Decode`].
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`PlaybackError::TransitionTimeout`].
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TransitionTimeout(msg.into())
    }

    /// Build a [`PlaybackError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
