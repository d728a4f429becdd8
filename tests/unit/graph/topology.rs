use super::*;

use std::collections::BTreeSet;

use crate::foundation::core::Codec;
use crate::graph::elements::{Decoder, Passthrough, Sink, SinkDevice};

const AUDIO: MediaKind = MediaKind::Audio;

fn demux(g: &mut Graph) -> StageId {
    g.add_stage(
        Role::Demux,
        None,
        "demux",
        Some(0),
        None,
        StageBody::Element(Box::new(Passthrough)),
    )
}

fn decoder(accepted: Option<&[Codec]>) -> StageBody {
    let set = accepted.map(|c| c.iter().copied().collect::<BTreeSet<_>>());
    StageBody::Element(Box::new(Decoder::new(AUDIO, set)))
}

fn sink() -> StageBody {
    StageBody::Element(Box::new(Sink::new("fakesink", AUDIO, SinkDevice::Shared)))
}

/// Audio bin `decode ! sink`, statically linked.
fn branch(g: &mut Graph, accepted: Option<&[Codec]>) -> (BinId, StageId, StageId) {
    let bin = g.add_bin(AUDIO);
    let dec = g.add_stage(Role::Decode, Some(AUDIO), "avdec-audio", Some(0), Some(bin), decoder(accepted));
    let snk = g.add_stage(Role::Sink, Some(AUDIO), "fakesink", Some(3), Some(bin), sink());
    let out = g.stage(dec).unwrap().outputs()[0];
    let inp = g.stage(snk).unwrap().input().unwrap();
    g.link(out, inp, None).unwrap();
    (bin, dec, snk)
}

fn aac() -> Caps {
    Caps::compressed(Codec::Aac)
}

#[test]
fn link_sets_peers_both_ways() {
    let mut g = Graph::new("test://audio");
    let (_, dec, snk) = branch(&mut g, None);
    let out = g.stage(dec).unwrap().outputs()[0];
    let inp = g.stage(snk).unwrap().input().unwrap();
    assert_eq!(g.port(out).unwrap().peer(), Some(inp));
    assert_eq!(g.port(inp).unwrap().peer(), Some(out));
    assert_eq!(g.port(inp).unwrap().format(), None);
}

#[test]
fn a_port_has_at_most_one_peer() {
    let mut g = Graph::new("test://audio");
    let (bin, dec, snk) = branch(&mut g, None);
    let out = g.stage(dec).unwrap().outputs()[0];
    let other = g.add_stage(Role::Sink, Some(AUDIO), "fakesink", Some(3), Some(bin), sink());
    let other_in = g.stage(other).unwrap().input().unwrap();
    assert_eq!(g.link(out, other_in, None), Err(LinkError::AlreadyLinked(out)));
    let snk_in = g.stage(snk).unwrap().input().unwrap();
    assert_eq!(g.link(snk_in, other_in, None), Err(LinkError::WrongDirection));
}

#[test]
fn linking_into_a_bin_needs_the_ghost_port() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, _) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();

    assert_eq!(g.link(src, dec_in, Some(aac())), Err(LinkError::WrongHierarchy));

    let ghost = g.expose_ghost(bin, dec_in).unwrap();
    g.link(src, ghost, Some(aac())).unwrap();
    assert_eq!(g.port(dec_in).unwrap().format(), Some(aac()));
    assert!(g.port(ghost).unwrap().is_ghost());
    assert_eq!(g.branch_entry(AUDIO), Some(ghost));
}

#[test]
fn refused_formats_are_reported_before_hierarchy() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (_, dec, _) = branch(&mut g, Some(&[Codec::Aac]));
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();

    let err = g.link(src, dec_in, Some(Caps::compressed(Codec::Opus))).unwrap_err();
    assert!(matches!(err, LinkError::NoFormat(_)), "{err:?}");
    let err = g.link(src, dec_in, Some(Caps::compressed(Codec::H264))).unwrap_err();
    assert!(matches!(err, LinkError::NoFormat(_)), "{err:?}");
}

#[test]
fn formats_propagate_through_static_links() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, snk) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();
    let ghost = g.expose_ghost(bin, dec_in).unwrap();
    g.link(src, ghost, Some(aac())).unwrap();
    g.propagate_formats(ghost);

    let snk_in = g.stage(snk).unwrap().input().unwrap();
    assert_eq!(g.port(snk_in).unwrap().format(), Some(Caps::raw(AUDIO)));
}

#[test]
fn capsfilter_bridges_top_level_and_bin() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, snk) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();
    let ghost = g.expose_ghost(bin, dec_in).unwrap();

    let cf = g.add_capsfilter(aac());
    let cf_in = g.stage(cf).unwrap().input().unwrap();
    let cf_out = g.stage(cf).unwrap().outputs()[0];
    g.link(src, cf_in, Some(aac())).unwrap();
    g.link(cf_out, ghost, Some(aac())).unwrap();

    assert_eq!(g.downstream_of(src), vec![cf, dec, snk]);
    let order = g.transition_order(true);
    assert_eq!(order.first(), Some(&snk));
    assert!(order.iter().position(|s| *s == cf) < order.iter().position(|s| *s == d));
}

#[test]
fn replacing_a_sink_keeps_its_place() {
    let mut g = Graph::new("test://audio");
    let (bin, dec, snk) = branch(&mut g, None);
    let replacement = Box::new(Sink::new("pulsesink", AUDIO, SinkDevice::Shared));
    let (new, old) = g.replace_stage(snk, "pulsesink", 4, replacement).unwrap();

    assert!(matches!(old, StageBody::Element(_)));
    assert!(g.stage(snk).is_none());
    assert_eq!(g.bin(bin).unwrap().stages(), &[dec, new]);
    let out = g.stage(dec).unwrap().outputs()[0];
    assert_eq!(g.port(out).unwrap().peer(), g.stage(new).unwrap().input());
    assert_eq!(g.stage(new).unwrap().chain_index(), Some(4));
    assert_eq!(g.stage(new).unwrap().state(), StageState::Null);
}

#[test]
fn replacing_the_ghost_target_retargets_the_ghost() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, snk) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();
    let ghost = g.expose_ghost(bin, dec_in).unwrap();
    g.link(src, ghost, Some(aac())).unwrap();

    let (new, _) = g
        .replace_stage(dec, "avdec-audio", 1, Box::new(Decoder::new(AUDIO, None)))
        .unwrap();
    let new_in = g.stage(new).unwrap().input().unwrap();
    assert_eq!(g.port(ghost).unwrap().ghost_target(), Some(new_in));
    assert_eq!(g.port(ghost).unwrap().peer(), Some(src));
    assert_eq!(g.port(new_in).unwrap().format(), Some(aac()));
    assert_eq!(g.downstream_of(src), vec![new, snk]);
}

#[test]
fn replacement_must_accept_the_negotiated_format() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, _) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();
    let ghost = g.expose_ghost(bin, dec_in).unwrap();
    g.link(src, ghost, Some(aac())).unwrap();

    let picky = Decoder::new(AUDIO, Some([Codec::Opus].into_iter().collect()));
    let err = g.replace_stage(dec, "opusdec", 1, Box::new(picky)).unwrap_err();
    assert!(matches!(err, LinkError::NoFormat(_)));
}

#[test]
fn removing_a_bin_unlinks_the_demux_port() {
    let mut g = Graph::new("test://audio");
    let d = demux(&mut g);
    let (bin, dec, snk) = branch(&mut g, None);
    let src = g.add_output_port(d, CapsTemplate::Compressed(AUDIO)).unwrap();
    let dec_in = g.stage(dec).unwrap().input().unwrap();
    let ghost = g.expose_ghost(bin, dec_in).unwrap();
    g.link(src, ghost, Some(aac())).unwrap();

    let bodies = g.remove_bin(bin);
    assert_eq!(bodies.len(), 2);
    assert!(g.bin(bin).is_none());
    assert!(g.stage(dec).is_none() && g.stage(snk).is_none());
    assert_eq!(g.port(src).unwrap().peer(), None);
    assert_eq!(g.bin_for(AUDIO), None);
}

#[test]
fn detached_elements_come_back() {
    let mut g = Graph::new("test://audio");
    let (_, dec, _) = branch(&mut g, None);
    let element = g.detach(dec).unwrap();
    assert!(g.stage(dec).unwrap().element().is_none());
    assert!(g.detach(dec).is_none());
    g.attach(dec, element);
    assert!(g.stage(dec).unwrap().element().is_some());
}

#[test]
fn describe_lists_bins() {
    let mut g = Graph::new("test://audio");
    demux(&mut g);
    branch(&mut g, None);
    assert_eq!(g.describe(), "demux ! [audio: avdec-audio ! fakesink]");
}
