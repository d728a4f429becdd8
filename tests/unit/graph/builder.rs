use super::*;

use crate::config::{RoleChain, factories as f};

fn build(config: &PipelineConfig, registry: &StageRegistry, filters: &[FilterKind]) -> BuildReport {
    GraphBuilder::new(config, registry)
        .build("test://av", filters)
        .unwrap()
}

#[test]
fn software_graph_uses_fallback_stages_only() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    let report = build(&config, &registry, &[]);

    assert_eq!(
        report.graph.describe(),
        "urisrc ! demux ! [video: avdec-video ! videoconvert ! glimagesink] ! \
         [audio: avdec-audio ! audioconvert ! pulsesink]"
    );
    assert!(report.missing_branches.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn equalizer_sits_between_convert_and_sink() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    let report = build(&config, &registry, &[FilterKind::Equalizer]);
    let g = &report.graph;

    let bin = g.bin(g.bin_for(MediaKind::Audio).unwrap()).unwrap();
    let roles: Vec<Role> = bin
        .stages()
        .iter()
        .map(|s| g.stage(*s).unwrap().role())
        .collect();
    assert_eq!(roles, [Role::Decode, Role::Convert, Role::Filter, Role::Sink]);
    assert!(g.equalizer().is_some());

    let video = g.bin(g.bin_for(MediaKind::Video).unwrap()).unwrap();
    assert_eq!(video.stages().len(), 3);
}

#[test]
fn every_bin_exposes_its_decoder() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    let report = build(&config, &registry, &[]);
    let g = &report.graph;

    for kind in MediaKind::ALL {
        let ghost = g.branch_entry(kind).unwrap();
        let decoder = g.branch_stage(kind, Role::Decode).unwrap();
        assert_eq!(
            g.port(ghost).unwrap().ghost_target(),
            g.stage(decoder).unwrap().input()
        );
    }
}

#[test]
fn unregistered_factories_are_skipped() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    registry.unregister(f::GLIMAGESINK);
    let report = build(&config, &registry, &[]);

    let sink = report.graph.branch_stage(MediaKind::Video, Role::Sink).unwrap();
    assert_eq!(report.graph.stage(sink).unwrap().entry(), f::XVIMAGESINK);
    assert_eq!(report.graph.stage(sink).unwrap().chain_index(), Some(1));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entry, f::GLIMAGESINK);
}

#[test]
fn exhausted_branch_is_omitted_only_when_degradation_is_allowed() {
    let mut config = PipelineConfig::software_only();
    config
        .chains
        .set(RoleChain::new(Role::Sink, Some(MediaKind::Audio), &["nosuchsink"]));
    let registry = StageRegistry::with_builtins();

    let report = build(&config, &registry, &[]);
    assert_eq!(report.missing_branches, [MediaKind::Audio]);
    assert!(report.graph.bin_for(MediaKind::Audio).is_none());
    assert!(report.graph.bin_for(MediaKind::Video).is_some());

    let err = GraphBuilder::new(&config, &registry)
        .allow_degraded(false)
        .build("test://av", &[])
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Build(_)), "{err}");
}

#[test]
fn zero_branches_is_a_build_failure() {
    let mut config = PipelineConfig::software_only();
    for kind in MediaKind::ALL {
        config
            .chains
            .set(RoleChain::new(Role::Decode, Some(kind), &["nosuchdecoder"]));
    }
    let registry = StageRegistry::with_builtins();
    let err = GraphBuilder::new(&config, &registry)
        .build("test://av", &[])
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Build(_)));
}

#[test]
fn unreadable_uri_is_a_build_failure() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    let err = GraphBuilder::new(&config, &registry)
        .build("rtsp://camera/stream", &[])
        .unwrap_err();
    assert!(matches!(err, PlaybackError::Build(_)));
}

#[test]
fn instantiate_resumes_after_the_failed_entry() {
    let config = PipelineConfig::software_only();
    let registry = StageRegistry::with_builtins();
    let builder = GraphBuilder::new(&config, &registry);
    let mut skipped = Vec::new();

    let chain = config.chains.get(Role::Sink, Some(MediaKind::Audio));
    let alsa = chain.iter().position(|e| e == "alsasink@hw:1,0").unwrap();
    let next = builder
        .instantiate(Role::Sink, Some(MediaKind::Audio), alsa, &mut skipped)
        .unwrap();
    assert_eq!(next.entry, "alsasink@hw:1,0");
    assert_eq!(next.chain_index, alsa);

    let last = chain.len();
    assert!(
        builder
            .instantiate(Role::Sink, Some(MediaKind::Audio), last, &mut skipped)
            .is_none()
    );
    assert!(skipped.is_empty());
}
