use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::config::PipelineConfig;
use crate::foundation::core::{FilterKind, SessionId, SurfaceHandle};
use crate::foundation::error::{PlaybackError, PlaybackResult};
use crate::graph::arbiter::DeviceArbiter;
use crate::graph::registry::StageRegistry;
use crate::playback::runtime::Environment;
use crate::playback::{EosPolicy, SessionHandle, SessionSetup};

/// Per-session knobs for [`Engine::open`].
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Filters of the initial backend; `None` takes them from the configuration.
    pub filters: Option<Vec<FilterKind>>,
    /// Render surface for accelerated video output.
    pub surface: Option<SurfaceHandle>,
    /// What to do at end of stream; `None` takes it from the configuration.
    pub eos_policy: Option<EosPolicy>,
    /// Build without a branch whose chain is exhausted instead of failing.
    pub allow_degraded: bool,
    /// Pace streaming by the wall clock. When `false`, media time advances by a fixed
    /// step per worker iteration (faster than real time).
    pub realtime: bool,
    /// Start playing as soon as the graph is Ready.
    pub autoplay: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            filters: None,
            surface: None,
            eos_policy: None,
            allow_degraded: true,
            realtime: true,
            autoplay: false,
        }
    }
}

/// Entry point: owns the stage registry and the device arbiter shared by every session.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<StageRegistry>,
    arbiter: Arc<DeviceArbiter>,
    next_session: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the built-in stage catalogue.
    pub fn new() -> Self {
        Self::with_registry(StageRegistry::with_builtins())
    }

    /// Engine with a custom registry.
    pub fn with_registry(registry: StageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            arbiter: DeviceArbiter::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Stage registry; factories registered here are visible to sessions opened later.
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Device arbiter shared by every session of this engine.
    pub fn arbiter(&self) -> &Arc<DeviceArbiter> {
        &self.arbiter
    }

    /// Open a session for `uri`. Returns as soon as the worker is running; the outcome
    /// of the build (Ready or Error) arrives on the event stream.
    pub fn open(
        &self,
        uri: &str,
        config: &PipelineConfig,
        options: OpenOptions,
    ) -> PlaybackResult<SessionHandle> {
        if uri.trim().is_empty() {
            return Err(PlaybackError::validation("uri must not be empty"));
        }
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let pool = build_thread_pool(config.thread_pool_size)?;
        let env = Environment {
            session,
            config: Arc::new(config.clone()),
            registry: Arc::clone(&self.registry),
            arbiter: Arc::clone(&self.arbiter),
            surface: options.surface,
            pool: Arc::new(pool),
        };
        info!(%session, uri, threads = config.thread_pool_size, "opening session");
        SessionHandle::spawn(SessionSetup {
            env,
            uri: uri.to_owned(),
            filters: options.filters.unwrap_or_else(|| config.filters.clone()),
            eos_policy: options.eos_policy.unwrap_or(config.eos_policy),
            allow_degraded: options.allow_degraded,
            realtime: options.realtime,
            autoplay: options.autoplay,
        })
    }
}

fn build_thread_pool(threads: usize) -> PlaybackResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(PlaybackError::validation("thread_pool_size must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("shadowplay-branch-{i}"))
        .build()
        .map_err(|e| PlaybackError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}
