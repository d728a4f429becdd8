use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::foundation::core::{FilterKind, MediaKind, SessionId};
use crate::foundation::error::{PlaybackError, PlaybackResult};
use crate::playback::control::{Command, Control, EosPolicy};
use crate::playback::events::{SessionEvent, Severity};
use crate::playback::runtime::{Environment, GraphRuntime, Interrupt, Note};
use crate::playback::state::SessionState;
use crate::reconfig::equalizer::{EqualizerState, parse_band_param, preset_gains};
use crate::reconfig::switch::stage_backend;
use crate::reconfig::ParamCoalescer;
use crate::recovery::{Fault, FaultKind, RecoveryAction, RecoveryManager};

const IDLE_WAIT: Duration = Duration::from_millis(10);
const BUSY_WAIT: Duration = Duration::from_millis(1);
const MAX_REALTIME_SPAN: Duration = Duration::from_millis(100);
const FIXED_SPAN: Duration = Duration::from_millis(20);

/// Point-in-time view of a session, refreshed by the worker after every step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// URI currently loaded.
    pub uri: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Playback position.
    pub position: Duration,
    /// Duration reported by the source, once known.
    pub duration: Option<Duration>,
    /// Backend generation; bumped by every completed switch.
    pub backend: u32,
    /// Filters of the active backend.
    pub filters: Vec<FilterKind>,
    /// Equalizer parameters, applied or not.
    pub equalizer: EqualizerState,
    /// End-of-stream policy.
    pub eos_policy: EosPolicy,
    /// Audio volume, linear.
    pub volume: f64,
    /// Stage substitutions made so far.
    pub recovery_attempts: u32,
    /// Active graph, gst-launch style.
    pub graph: Option<String>,
}

/// Everything a worker needs to start.
pub(crate) struct SessionSetup {
    pub env: Environment,
    pub uri: String,
    pub filters: Vec<FilterKind>,
    pub eos_policy: EosPolicy,
    pub allow_degraded: bool,
    pub realtime: bool,
    pub autoplay: bool,
}

/// Caller side of a playback session.
///
/// Commands are queued to the session's worker thread and return immediately;
/// outcomes arrive on the ordered event stream ([`SessionHandle::events`]). Dropping
/// the handle shuts the worker down and releases every device it held.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    commands: Sender<Command>,
    events: Receiver<SessionEvent>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub(crate) fn spawn(setup: SessionSetup) -> PlaybackResult<Self> {
        let id = setup.env.session;
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (evt_tx, evt_rx) = crossbeam_channel::unbounded();
        let snapshot = Arc::new(Mutex::new(SessionSnapshot {
            id,
            uri: setup.uri.clone(),
            state: SessionState::Idle,
            position: Duration::ZERO,
            duration: None,
            backend: 0,
            filters: setup.filters.clone(),
            equalizer: EqualizerState::flat(),
            eos_policy: setup.eos_policy,
            volume: 1.0,
            recovery_attempts: 0,
            graph: None,
        }));
        let worker = Worker::new(setup, cmd_rx, evt_tx, Arc::clone(&snapshot));
        let handle = thread::Builder::new()
            .name(format!("shadowplay-{id}"))
            .spawn(move || worker.run())
            .map_err(|e| PlaybackError::Other(anyhow::Error::new(e).context("spawn session worker")))?;
        Ok(Self {
            id,
            commands: cmd_tx,
            events: evt_rx,
            snapshot,
            worker: Some(handle),
        })
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn send(&self, command: Command) -> PlaybackResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::SessionClosed)
    }

    /// Queue a transport request. Completion is reported as `StateChanged` (or
    /// `SeekDone`); an illegal request is reported as a warning fault.
    pub fn control(&self, control: Control) -> PlaybackResult<()> {
        self.send(Command::Control(control))
    }

    /// Set a filter parameter (`band0`..`band9` for the equalizer). Fire-and-forget:
    /// updates are coalesced and reach a live filter at most once per coalescing
    /// interval. Without a live filter the value is kept for later.
    pub fn set_filter_parameter(&self, filter_id: &str, param: &str, value: f64) -> PlaybackResult<()> {
        self.send(Command::SetParam {
            filter: filter_id.to_owned(),
            param: param.to_owned(),
            value,
        })
    }

    /// Load a named equalizer preset.
    pub fn apply_equalizer_preset(&self, name: &str) -> PlaybackResult<()> {
        if preset_gains(name).is_none() {
            return Err(PlaybackError::validation(format!("unknown equalizer preset '{name}'")));
        }
        self.send(Command::ApplyPreset(name.to_owned()))
    }

    /// Swap the active graph for one carrying `filters`, keeping state and position.
    pub fn switch_backend(&self, filters: &[FilterKind]) -> PlaybackResult<()> {
        self.send(Command::SwitchBackend(filters.to_vec()))
    }

    /// Change the end-of-stream policy.
    pub fn set_eos_policy(&self, policy: EosPolicy) -> PlaybackResult<()> {
        self.send(Command::SetEosPolicy(policy))
    }

    /// Queue a URI for [`EosPolicy::Advance`].
    pub fn enqueue(&self, uri: &str) -> PlaybackResult<()> {
        self.send(Command::Enqueue(uri.to_owned()))
    }

    /// Set the audio volume (linear, `0.0..=1.0`).
    pub fn set_volume(&self, volume: f64) -> PlaybackResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::validation(format!("volume {volume} outside [0, 1]")));
        }
        self.send(Command::SetVolume(volume))
    }

    /// The ordered event stream.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Every event delivered so far, without blocking.
    pub fn try_events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    /// Latest snapshot published by the worker.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Collect events until one satisfies `pred` (included in the result). On timeout,
    /// returns the events seen so far as the error.
    pub fn wait_for(
        &self,
        timeout: Duration,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> Result<Vec<SessionEvent>, Vec<SessionEvent>> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        loop {
            match self.events.recv_deadline(deadline) {
                Ok(event) => {
                    let done = pred(&event);
                    seen.push(event);
                    if done {
                        return Ok(seen);
                    }
                }
                Err(_) => return Err(seen),
            }
        }
    }

    /// Shut the worker down and wait for it.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!(session = %self.id, "session worker panicked");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Commands received but not handled yet.
struct Inbox {
    rx: Receiver<Command>,
    pending: VecDeque<Command>,
}

impl Inbox {
    fn next(&mut self, wait: Duration) -> Option<Command> {
        if let Some(cmd) = self.pending.pop_front() {
            return Some(cmd);
        }
        match self.rx.recv_timeout(wait) {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
        }
    }

    /// Drain the channel and report whether a preempting request is waiting.
    fn stop_requested(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => self.pending.push_back(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.pending.push_back(Command::Shutdown);
                    break;
                }
            }
        }
        self.pending.iter().any(Command::preempts)
    }
}

struct Worker {
    env: Environment,
    uri: String,
    filters: Vec<FilterKind>,
    allow_degraded: bool,
    realtime: bool,
    autoplay: bool,
    eos_policy: EosPolicy,
    queue: VecDeque<String>,
    state: SessionState,
    runtime: Option<GraphRuntime>,
    fresh_graph: bool,
    recovery: RecoveryManager,
    equalizer: EqualizerState,
    coalescer: ParamCoalescer,
    volume: f64,
    backend: u32,
    last_tick: Instant,
    eos_pending: bool,
    inbox: Inbox,
    events: Sender<SessionEvent>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
}

impl Worker {
    fn new(
        setup: SessionSetup,
        rx: Receiver<Command>,
        events: Sender<SessionEvent>,
        snapshot: Arc<Mutex<SessionSnapshot>>,
    ) -> Self {
        let tunables = &setup.env.config.tunables;
        let recovery = RecoveryManager::new(tunables.into());
        let coalescer = ParamCoalescer::new(tunables.coalesce_interval());
        Self {
            uri: setup.uri,
            filters: setup.filters,
            allow_degraded: setup.allow_degraded,
            realtime: setup.realtime,
            autoplay: setup.autoplay,
            eos_policy: setup.eos_policy,
            queue: VecDeque::new(),
            state: SessionState::Idle,
            runtime: None,
            fresh_graph: false,
            recovery,
            equalizer: EqualizerState::flat(),
            coalescer,
            volume: 1.0,
            backend: 0,
            last_tick: Instant::now(),
            eos_pending: false,
            inbox: Inbox {
                rx,
                pending: VecDeque::new(),
            },
            events,
            snapshot,
            env: setup.env,
        }
    }

    fn run(mut self) {
        info!(session = %self.env.session, uri = %self.uri, "session started");
        if let Some(preset) = self.env.config.equalizer_preset.clone()
            && let Err(err) = self.equalizer.apply_preset(&preset)
        {
            self.warn(FaultKind::Warning, err.to_string());
        }
        self.guarded(|w| {
            if w.open() && w.autoplay {
                w.handle_control(Control::Play);
            }
        });
        self.publish();

        loop {
            let wait = self.wait_time();
            match self.inbox.next(wait) {
                Some(Command::Shutdown) => break,
                Some(cmd) => self.guarded(|w| w.handle(cmd)),
                None => {}
            }
            self.guarded(Worker::service);
            self.publish();
        }

        if let Some(mut rt) = self.runtime.take() {
            rt.teardown();
        }
        info!(session = %self.env.session, "session closed");
    }

    fn wait_time(&self) -> Duration {
        let mut wait = if self.state == SessionState::Playing && !self.realtime {
            BUSY_WAIT
        } else {
            IDLE_WAIT
        };
        if let Some(due) = self.coalescer.deadline() {
            wait = wait.min(due.saturating_duration_since(Instant::now()));
        }
        wait
    }

    /// Run one worker step; a panic anywhere below becomes an Error.
    fn guarded(&mut self, step: impl FnOnce(&mut Self)) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| step(self))) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!(session = %self.env.session, %message, "worker step panicked");
            // The graph may be half-updated; drop it without driving its stages.
            self.runtime = None;
            let fault = Fault::session(FaultKind::Internal, format!("worker panicked: {message}"));
            self.emit(SessionEvent::fault(&fault, Severity::Error));
            self.set_session_state(SessionState::Error);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(session = %self.env.session, "event dropped; handle is gone");
        }
    }

    fn warn(&self, kind: FaultKind, message: impl Into<String>) {
        let fault = Fault::session(kind, message);
        warn!(session = %self.env.session, %fault, "warning");
        self.emit(SessionEvent::fault(&fault, Severity::Warning));
    }

    fn set_session_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        // Observers woken by the event must see the new snapshot.
        self.publish();
        info!(session = %self.env.session, %from, %to, "state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn publish(&self) {
        let rt = self.runtime.as_ref();
        let snapshot = SessionSnapshot {
            id: self.env.session,
            uri: self.uri.clone(),
            state: self.state,
            position: rt.map_or(Duration::ZERO, GraphRuntime::position),
            duration: rt.and_then(GraphRuntime::duration),
            backend: self.backend,
            filters: self.filters.clone(),
            equalizer: self.equalizer.clone(),
            eos_policy: self.eos_policy,
            volume: self.volume,
            recovery_attempts: self.recovery.attempts(),
            graph: rt.map(|r| r.graph().describe()),
        };
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Build a graph for the current URI and bring it to Ready.
    fn open(&mut self) -> bool {
        let mut notes = Vec::new();
        let built = GraphRuntime::build(&self.env, &self.uri, &self.filters, self.allow_degraded, &mut notes);
        self.absorb(notes);
        match built {
            Ok(rt) => {
                self.runtime = Some(rt);
                self.fresh_graph = true;
                self.recovery.reset_decode_errors();
                self.transition(SessionState::Ready)
            }
            Err(err) => {
                self.fail(Fault::session(FaultKind::BuildFailure, err.to_string()));
                false
            }
        }
    }

    fn discard_graph(&mut self) {
        if let Some(mut rt) = self.runtime.take() {
            rt.teardown();
        }
        self.eos_pending = false;
    }

    fn fail(&mut self, fault: Fault) {
        error!(session = %self.env.session, %fault, "session failed");
        self.emit(SessionEvent::fault(&fault, Severity::Error));
        self.discard_graph();
        self.set_session_state(SessionState::Error);
    }

    fn stop(&mut self) {
        self.discard_graph();
        self.coalescer.cancel();
        self.set_session_state(SessionState::Stopped);
    }

    /// Drive the graph to `to`, recovering where possible. Returns `true` once the
    /// session reached `to`.
    fn transition(&mut self, to: SessionState) -> bool {
        let Some(mut rt) = self.runtime.take() else {
            self.fail(Fault::session(FaultKind::Internal, "no graph to drive"));
            return false;
        };
        let result = self.drive(&mut rt, to);
        self.runtime = Some(rt);
        match result {
            Ok(()) => {
                self.set_session_state(to);
                if to.is_running() && self.fresh_graph {
                    self.fresh_graph = false;
                    self.reapply();
                }
                true
            }
            Err(interrupt) => {
                self.interrupted(interrupt);
                false
            }
        }
    }

    fn interrupted(&mut self, interrupt: Interrupt) {
        match interrupt {
            Interrupt::Preempted => debug!(session = %self.env.session, "transition preempted"),
            Interrupt::Timeout(stage) => {
                let ms = self.env.config.tunables.transition_timeout_ms;
                self.fail(Fault::session(
                    FaultKind::TransitionTimeout,
                    format!("{stage} did not change state within {ms} ms"),
                ));
            }
            Interrupt::Fault(fault) | Interrupt::Fatal(fault) => self.fail(fault),
        }
    }

    /// Drive `rt` to `to`. Stage faults are answered by the recovery manager; after a
    /// substitution the graph resumes at the position it had.
    fn drive(&mut self, rt: &mut GraphRuntime, to: SessionState) -> Result<(), Interrupt> {
        let resume_at = rt.position();
        let mut substituted = false;
        loop {
            let deadline = Instant::now() + self.env.config.tunables.transition_timeout();
            let mut notes = Vec::new();
            let inbox = &mut self.inbox;
            let result = rt.set_state(to.stage_state(), deadline, &mut notes, &mut || inbox.stop_requested());
            self.absorb(notes);
            match result {
                Ok(()) => break,
                Err(Interrupt::Fault(fault)) => {
                    self.recover_transition(rt, fault)?;
                    substituted = true;
                }
                Err(other) => return Err(other),
            }
        }
        if substituted && to.is_running() && !resume_at.is_zero() {
            rt.seek(resume_at);
        }
        Ok(())
    }

    /// Consult the recovery manager about `fault`.
    fn decide(&mut self, rt: &GraphRuntime, fault: &Fault) -> RecoveryAction {
        let chain_index = fault.stage.and_then(|s| rt.chain_index(s));
        self.recovery.on_fault(fault, chain_index, &self.env.config)
    }

    fn recover_transition(&mut self, rt: &mut GraphRuntime, fault: Fault) -> Result<(), Interrupt> {
        match self.decide(rt, &fault) {
            RecoveryAction::Fatal(message) => Err(Interrupt::Fatal(Fault { message, ..fault })),
            // A refused state change cannot be tolerated.
            RecoveryAction::Tolerate { .. } | RecoveryAction::Report => Err(Interrupt::Fatal(fault)),
            action => self.recover(rt, fault, action),
        }
    }

    /// Carry out a substitution or a branch teardown.
    fn recover(&mut self, rt: &mut GraphRuntime, fault: Fault, action: RecoveryAction) -> Result<(), Interrupt> {
        self.emit(SessionEvent::fault(&fault, Severity::Warning));
        match action {
            RecoveryAction::Substitute {
                stage,
                role,
                kind,
                start,
                attempt,
            } => {
                warn!(session = %self.env.session, %fault, attempt, "substituting stage");
                match rt.substitute(stage, role, kind, start) {
                    Ok(_) => Ok(()),
                    Err(reason) => Err(Interrupt::Fatal(Fault {
                        message: format!("{}; {reason}", fault.message),
                        ..fault
                    })),
                }
            }
            RecoveryAction::TearDownBranch(kind) => {
                let reason = match fault.kind {
                    FaultKind::DecodeError => format!("{} decode errors", self.recovery.decode_errors(kind)),
                    _ => fault.message.clone(),
                };
                let mut notes = Vec::new();
                rt.tear_down_branch(kind, &reason, &mut notes);
                self.absorb(notes);
                if rt.has_branches() {
                    Ok(())
                } else {
                    Err(Interrupt::Fatal(Fault {
                        message: format!("no branch left: {reason}"),
                        ..fault
                    }))
                }
            }
            RecoveryAction::Tolerate { .. } | RecoveryAction::Report | RecoveryAction::Fatal(_) => Ok(()),
        }
    }

    /// Forward runtime notes; streaming faults go through the recovery manager.
    fn absorb(&mut self, notes: Vec<Note>) {
        for note in notes {
            match note {
                Note::Event(event) => self.emit(event),
                Note::EndOfStream => self.eos_pending = true,
                Note::Fault(fault) if fault.stage.is_none() => {
                    warn!(session = %self.env.session, %fault, "warning");
                    self.emit(SessionEvent::fault(&fault, Severity::Warning));
                }
                Note::Fault(fault) => self.on_stream_fault(fault),
            }
        }
    }

    fn on_stream_fault(&mut self, fault: Fault) {
        let Some(mut rt) = self.runtime.take() else {
            self.emit(SessionEvent::fault(&fault, Severity::Warning));
            return;
        };
        let outcome = match self.decide(&rt, &fault) {
            RecoveryAction::Tolerate { count } => {
                debug!(session = %self.env.session, %fault, count, "decode error tolerated");
                self.emit(SessionEvent::fault(&fault, Severity::Warning));
                Ok(())
            }
            RecoveryAction::Report => {
                self.emit(SessionEvent::fault(&fault, Severity::Warning));
                Ok(())
            }
            RecoveryAction::Fatal(message) => Err(Interrupt::Fatal(Fault { message, ..fault })),
            action => {
                let target = self.state;
                self.recover(&mut rt, fault, action)
                    .and_then(|()| self.drive(&mut rt, target))
            }
        };
        self.runtime = Some(rt);
        if let Err(interrupt) = outcome {
            self.interrupted(interrupt);
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Control(control) => self.handle_control(control),
            Command::SetParam { filter, param, value } => self.set_param(&filter, &param, value),
            Command::ApplyPreset(name) => match self.equalizer.apply_preset(&name) {
                Ok(()) => self.coalescer.mark(Instant::now()),
                Err(err) => self.warn(FaultKind::Warning, err.to_string()),
            },
            Command::SwitchBackend(filters) => self.switch_backend(filters),
            Command::SetEosPolicy(policy) => self.eos_policy = policy,
            Command::Enqueue(uri) => self.queue.push_back(uri),
            Command::SetVolume(volume) => {
                self.volume = volume;
                if let Some(rt) = self.runtime.as_mut() {
                    rt.set_volume(volume);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn handle_control(&mut self, control: Control) {
        if !self.state.accepts(&control) {
            self.warn(
                FaultKind::Warning,
                format!("{control:?} is not valid while {}", self.state),
            );
            return;
        }
        match control {
            Control::Play => {
                if self.state.needs_rebuild() && !self.open() {
                    return;
                }
                self.transition(SessionState::Playing);
            }
            Control::Pause => {
                self.transition(SessionState::Paused);
            }
            Control::Stop => self.stop(),
            Control::SeekTo(position) => {
                if let Some(rt) = self.runtime.as_mut() {
                    let position = rt.seek(position);
                    self.eos_pending = false;
                    self.emit(SessionEvent::SeekDone { position });
                }
            }
        }
    }

    fn set_param(&mut self, filter: &str, param: &str, value: f64) {
        if FilterKind::from_id(filter) != Some(FilterKind::Equalizer) {
            self.warn(FaultKind::Warning, format!("unknown filter '{filter}'"));
            return;
        }
        let Some(band) = parse_band_param(param) else {
            self.warn(FaultKind::Warning, format!("unknown equalizer parameter '{param}'"));
            return;
        };
        match self.equalizer.set_band(band, value) {
            Ok(()) => self.coalescer.mark(Instant::now()),
            Err(err) => self.warn(FaultKind::Warning, err.to_string()),
        }
    }

    fn switch_backend(&mut self, filters: Vec<FilterKind>) {
        let Some(mut active) = self.runtime.take() else {
            debug!(session = %self.env.session, ?filters, "no graph; filters apply on next build");
            self.filters = filters;
            return;
        };
        let target = self.state;
        let env = self.env.clone();
        let allow_degraded = self.allow_degraded;
        let result = stage_backend(&mut active, &env, &filters, allow_degraded, |rt, notes| {
            self.absorb(notes);
            self.drive(rt, target)
        });
        self.runtime = Some(active);
        match result {
            Ok(switch) => {
                self.backend += 1;
                self.filters = switch.filters.clone();
                self.recovery.reset_decode_errors();
                self.eos_pending = false;
                self.publish();
                self.emit(SessionEvent::BackendSwitched {
                    backend: self.backend,
                    filters: switch.filters,
                    captured: switch.captured,
                    resumed_at: switch.resumed_at,
                });
                self.fresh_graph = true;
                if self.state.is_running() {
                    self.fresh_graph = false;
                    self.reapply();
                }
            }
            Err(Interrupt::Preempted) => debug!(session = %self.env.session, "switch preempted"),
            Err(Interrupt::Timeout(stage)) => {
                self.warn(FaultKind::TransitionTimeout, format!("backend switch abandoned: {stage} timed out"));
            }
            Err(Interrupt::Fault(fault) | Interrupt::Fatal(fault)) => {
                self.warn(fault.kind, format!("backend switch abandoned: {}", fault.message));
            }
        }
    }

    /// Push session-level parameters into a graph that just became live.
    fn reapply(&mut self) {
        if let Some(rt) = self.runtime.as_mut() {
            rt.set_volume(self.volume);
        }
        self.push_equalizer(Instant::now());
    }

    fn push_equalizer(&mut self, now: Instant) {
        let bands = *self.equalizer.bands();
        let applied = self.state.is_running()
            && self.runtime.as_mut().is_some_and(|rt| rt.apply_equalizer(&bands));
        if applied {
            self.coalescer.applied(now);
            debug!(session = %self.env.session, ?bands, "equalizer applied");
            self.emit(SessionEvent::FilterApplied {
                filter: FilterKind::Equalizer,
                bands: bands.to_vec(),
            });
        } else {
            // Kept on the session; applied once a filter stage is live.
            self.coalescer.cancel();
        }
    }

    fn service(&mut self) {
        let now = Instant::now();
        if self.state == SessionState::Playing
            && let Some(rt) = self.runtime.as_mut()
        {
            let span = if self.realtime {
                now.saturating_duration_since(self.last_tick).min(MAX_REALTIME_SPAN)
            } else {
                FIXED_SPAN
            };
            let mut notes = Vec::new();
            rt.tick(span, &mut notes);
            self.absorb(notes);
        }
        self.last_tick = now;

        if self.coalescer.is_due(now) {
            self.push_equalizer(now);
        }
        if self.eos_pending {
            self.eos_pending = false;
            self.end_of_stream();
        }
    }

    fn end_of_stream(&mut self) {
        self.emit(SessionEvent::EndOfStream);
        match self.eos_policy {
            EosPolicy::Stop => self.stop(),
            EosPolicy::Loop => {
                if let Some(rt) = self.runtime.as_mut() {
                    rt.seek(Duration::ZERO);
                    debug!(session = %self.env.session, "looping");
                }
            }
            EosPolicy::Advance => match self.queue.pop_front() {
                Some(uri) => self.advance(uri),
                None => self.stop(),
            },
        }
    }

    fn advance(&mut self, uri: String) {
        let swapped = match self.runtime.as_mut() {
            Some(rt) => {
                let mut notes = Vec::new();
                let swapped = rt.swap_source(&uri, &mut notes);
                self.absorb(notes);
                swapped
            }
            None => Ok(false),
        };
        match swapped {
            Ok(true) => {
                self.uri = uri.clone();
                self.recovery.reset_decode_errors();
                self.emit(SessionEvent::TrackChanged { uri, gapless: true });
            }
            Ok(false) | Err(_) => {
                if let Err(reason) = &swapped {
                    debug!(session = %self.env.session, %reason, "gapless advance impossible");
                }
                let target = self.state;
                self.discard_graph();
                self.uri = uri.clone();
                self.emit(SessionEvent::TrackChanged { uri, gapless: false });
                if self.open() && target.is_running() {
                    self.transition(target);
                }
            }
        }
    }
}

impl SessionSnapshot {
    /// Return `true` when the `kind` branch is part of the active graph.
    pub fn has_branch(&self, kind: MediaKind) -> bool {
        self.graph
            .as_deref()
            .is_some_and(|g| g.contains(&format!("[{kind}:")))
    }

    /// Return `true` when the active graph contains a stage built from `factory`.
    pub fn uses(&self, factory: &str) -> bool {
        self.graph.as_deref().is_some_and(|g| {
            g.split(|c: char| c == ' ' || c == '[' || c == ']')
                .any(|tok| tok == factory || tok.starts_with(&format!("{factory}@")))
        })
    }
}
