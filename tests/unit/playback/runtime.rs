use super::*;

fn env(config: PipelineConfig) -> Environment {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    Environment {
        session: SessionId(1),
        config: Arc::new(config),
        registry: Arc::new(StageRegistry::with_builtins()),
        arbiter: DeviceArbiter::new(),
        surface: None,
        pool: Arc::new(pool),
    }
}

fn runtime(env: &Environment, uri: &str, filters: &[FilterKind]) -> (GraphRuntime, Vec<Note>) {
    let mut notes = Vec::new();
    let rt = GraphRuntime::build(env, uri, filters, true, &mut notes).unwrap();
    (rt, notes)
}

fn drive(rt: &mut GraphRuntime, target: StageState, notes: &mut Vec<Note>) -> Result<(), Interrupt> {
    let deadline = Instant::now() + Duration::from_secs(5);
    rt.set_state(target, deadline, notes, &mut || false)
}

fn events(notes: &[Note]) -> Vec<&SessionEvent> {
    notes
        .iter()
        .filter_map(|n| match n {
            Note::Event(e) => Some(e),
            _ => None,
        })
        .collect()
}

#[test]
fn preroll_links_every_branch_after_its_stream_start() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av?order=format-first&title=Night+Drive", &[]);
    drive(&mut rt, StageState::Paused, &mut notes).unwrap();

    assert_eq!(rt.state(), StageState::Paused);
    let evs = events(&notes);
    for kind in MediaKind::ALL {
        let started = evs
            .iter()
            .position(|e| **e == SessionEvent::StreamStarted { kind })
            .unwrap();
        let negotiated = evs
            .iter()
            .position(|e| matches!(e, SessionEvent::FormatNegotiated { kind: k, .. } if *k == kind))
            .unwrap();
        assert!(started < negotiated, "{kind}");
    }
    assert!(evs.contains(&&SessionEvent::MetadataDiscovered {
        key: "title".to_owned(),
        value: "Night Drive".to_owned(),
    }));
}

#[test]
fn missing_stream_rejects_only_its_branch() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://video?duration_ms=200", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    assert!(events(&notes).iter().any(|e| matches!(
        e,
        SessionEvent::BranchRejected { kind: MediaKind::Audio, .. }
    )));
    assert!(rt.graph().bin_for(MediaKind::Audio).is_none());
    assert!(rt.graph().bin_for(MediaKind::Video).is_some());
    assert_eq!(rt.state(), StageState::Playing);
}

#[test]
fn source_without_streams_is_fatal() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://none", &[]);
    let err = drive(&mut rt, StageState::Paused, &mut notes).unwrap_err();
    assert!(matches!(err, Interrupt::Fatal(f) if f.kind == FaultKind::LinkFailure));
}

#[test]
fn ticks_run_to_end_of_stream_once() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av?duration_ms=300", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    let mut eos = 0;
    for _ in 0..40 {
        let mut out = Vec::new();
        rt.tick(Duration::from_millis(20), &mut out);
        eos += out.iter().filter(|n| matches!(n, Note::EndOfStream)).count();
    }
    assert_eq!(eos, 1);
    assert!(rt.position() >= Duration::from_millis(280));
    let rendered = rt
        .stage_property(MediaKind::Audio, Role::Sink, "rendered_ms")
        .unwrap();
    assert!(rendered >= 250.0, "{rendered}");
}

#[test]
fn halted_graph_does_not_move() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    rt.halt();
    rt.tick(Duration::from_millis(100), &mut notes);
    assert_eq!(rt.position(), Duration::ZERO);
    rt.resume();
    rt.tick(Duration::from_millis(100), &mut notes);
    assert!(rt.position() > Duration::ZERO);
}

#[test]
fn seek_clamps_to_duration_and_rearms_end_of_stream() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://audio?duration_ms=100", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    for _ in 0..10 {
        rt.tick(Duration::from_millis(20), &mut notes);
    }
    assert_eq!(notes.iter().filter(|n| matches!(n, Note::EndOfStream)).count(), 1);

    assert_eq!(rt.seek(Duration::from_secs(9)), Duration::from_millis(100));
    assert_eq!(rt.seek(Duration::ZERO), Duration::ZERO);
    let mut again = Vec::new();
    for _ in 0..10 {
        rt.tick(Duration::from_millis(20), &mut again);
    }
    assert_eq!(again.iter().filter(|n| matches!(n, Note::EndOfStream)).count(), 1);
}

#[test]
fn corrupt_buffers_surface_as_decode_faults() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av?corrupt=video:2", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    let mut out = Vec::new();
    for _ in 0..10 {
        rt.tick(Duration::from_millis(40), &mut out);
    }
    let faults: Vec<&Fault> = out
        .iter()
        .filter_map(|n| match n {
            Note::Fault(f) => Some(f),
            _ => None,
        })
        .collect();
    assert!(!faults.is_empty());
    assert!(faults.iter().all(|f| f.kind == FaultKind::DecodeError));
    assert!(faults.iter().all(|f| f.branch() == Some(MediaKind::Video)));
    // The audio branch is unaffected.
    assert!(rt.stage_property(MediaKind::Audio, Role::Sink, "buffers").unwrap() >= 10.0);
}

#[test]
fn tear_down_keeps_the_sibling_running() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    let mut out = Vec::new();
    rt.tear_down_branch(MediaKind::Video, "gave up", &mut out);
    assert!(matches!(
        &out[..],
        [Note::Event(SessionEvent::BranchRejected { kind: MediaKind::Video, reason })] if reason == "gave up"
    ));
    assert!(rt.has_branches());
    assert_eq!(rt.state(), StageState::Playing);

    rt.tick(Duration::from_millis(50), &mut out);
    assert!(rt.stage_property(MediaKind::Audio, Role::Sink, "buffers").unwrap() >= 1.0);
}

#[test]
fn equalizer_and_volume_need_their_stages() {
    let env = env(PipelineConfig::software_only());
    let (mut plain, _) = runtime(&env, "test://av", &[]);
    assert!(!plain.has_equalizer());
    assert!(!plain.apply_equalizer(&[3.0; BAND_COUNT]));
    assert!(plain.set_volume(0.5));

    let (mut eq, _) = runtime(&env, "test://av", &[FilterKind::Equalizer]);
    assert!(eq.apply_equalizer(&[3.0; BAND_COUNT]));
    let id = eq.graph().equalizer().unwrap();
    let stage = eq.graph().stage(id).unwrap().element().unwrap();
    assert_eq!(stage.property("band4"), Some(3.0));
}

#[test]
fn substitute_replaces_a_sink_in_place() {
    let mut config = PipelineConfig::software_only();
    config.chains.set(crate::config::RoleChain::new(
        Role::Sink,
        Some(MediaKind::Audio),
        &["alsasink@hw:7", "fakesink"],
    ));
    let env = env(config);
    let _held = env.arbiter.occupy("alsa:hw:7").unwrap();
    let (mut rt, mut notes) = runtime(&env, "test://av", &[]);

    let err = drive(&mut rt, StageState::Paused, &mut notes).unwrap_err();
    let Interrupt::Fault(fault) = err else {
        panic!("expected a stage fault");
    };
    assert_eq!(fault.kind, FaultKind::ResourceBusy);
    let stage = fault.stage.unwrap();
    assert_eq!(rt.chain_index(stage), Some(0));

    let new = rt.substitute(stage, Role::Sink, MediaKind::Audio, 1).unwrap();
    assert_eq!(rt.graph().stage(new).unwrap().entry(), "fakesink");
    drive(&mut rt, StageState::Paused, &mut notes).unwrap();
    assert_eq!(rt.state(), StageState::Paused);
}

#[test]
fn gapless_swap_requires_matching_layout() {
    let env = env(PipelineConfig::software_only());
    let (mut rt, mut notes) = runtime(&env, "test://av?duration_ms=100", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();

    assert!(!rt.swap_source("test://av?video=vp9", &mut notes).unwrap());
    assert_eq!(rt.graph().uri(), "test://av?duration_ms=100");

    assert!(rt.swap_source("test://av?duration_ms=500", &mut notes).unwrap());
    assert_eq!(rt.graph().uri(), "test://av?duration_ms=500");
    assert_eq!(rt.duration(), Some(Duration::from_millis(500)));
    assert_eq!(rt.position(), Duration::ZERO);
    assert!(rt.swap_source("bogus://x", &mut notes).is_err());
}

#[test]
fn teardown_releases_exclusive_devices() {
    let mut config = PipelineConfig::software_only();
    config.chains.set(crate::config::RoleChain::new(
        Role::Sink,
        Some(MediaKind::Audio),
        &["alsasink@hw:3"],
    ));
    let env = env(config);
    let (mut rt, mut notes) = runtime(&env, "test://audio", &[]);
    drive(&mut rt, StageState::Playing, &mut notes).unwrap();
    assert_eq!(env.arbiter.held_keys(), ["alsa:hw:3"]);

    rt.teardown();
    assert!(env.arbiter.held_keys().is_empty());
    assert_eq!(rt.state(), StageState::Null);
}
