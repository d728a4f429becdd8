use super::*;

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::foundation::core::Codec;

fn aac() -> Caps {
    Caps::compressed(Codec::Aac)
}

fn data(ms: u64) -> PortEvent {
    PortEvent::Data(Buffer::audio(
        aac(),
        Duration::from_millis(ms),
        vec![0.0; 96],
        48_000,
        2,
    ))
}

fn negotiation() -> PortNegotiation {
    PortNegotiation::new(PortId(0), 0, MediaKind::Audio)
}

#[test]
fn stream_start_then_format_passes_straight_through() {
    let mut n = negotiation();
    assert_eq!(n.phase(), PortPhase::Discovered);
    assert_eq!(n.push(PortEvent::StreamStart), [PortEvent::StreamStart]);
    assert_eq!(n.phase(), PortPhase::AwaitingSequenceEvents);
    assert!(!n.ready_to_link());
    assert_eq!(n.push(PortEvent::Format(aac())), [PortEvent::Format(aac())]);
    assert!(n.ready_to_link());
}

#[test]
fn early_format_waits_for_stream_start() {
    let mut n = negotiation();
    assert!(n.push(PortEvent::Format(aac())).is_empty());
    assert!(!n.ready_to_link());
    assert_eq!(
        n.push(PortEvent::StreamStart),
        [PortEvent::StreamStart, PortEvent::Format(aac())]
    );
    assert_eq!(n.format(), Some(aac()));
}

#[test]
fn data_is_held_until_linked() {
    let mut n = negotiation();
    assert!(n.push(data(0)).is_empty());
    n.push(PortEvent::StreamStart);
    n.push(PortEvent::Format(aac()));
    assert!(n.push(data(2)).is_empty());
    assert_eq!(n.held(), 2);

    let held = n.mark_linked();
    assert_eq!(held.len(), 2);
    assert_eq!(held[0].pts, Duration::ZERO);
    assert_eq!(n.phase(), PortPhase::Linked);
    assert_eq!(n.push(data(4)).len(), 1);
}

#[test]
fn format_is_fixed_once_released() {
    let mut n = negotiation();
    n.push(PortEvent::StreamStart);
    n.push(PortEvent::Format(aac()));
    n.mark_linked();
    assert!(n.push(PortEvent::Format(Caps::compressed(Codec::Opus))).is_empty());
    assert_eq!(n.format(), Some(aac()));
    assert!(n.push(PortEvent::StreamStart).is_empty());
}

#[test]
fn rejected_port_swallows_everything() {
    let mut n = negotiation();
    n.push(data(0));
    n.reject("no branch");
    assert_eq!(n.held(), 0);
    assert!(n.push(PortEvent::StreamStart).is_empty());
    assert!(!n.ready_to_link());
    assert_eq!(n.rejection(), Some("no branch"));
}

#[test]
fn any_interleaving_is_observed_in_sequence_order() {
    for seed in 0..500u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let buffers = rng.random_range(0..5u64);
        let mut events = vec![PortEvent::StreamStart, PortEvent::Format(aac())];
        events.extend((0..buffers).map(|i| data(i * 2)));
        // Data keeps its relative order; only the sequence events move around it.
        let mut sequence = [PortEvent::StreamStart, PortEvent::Format(aac())];
        sequence.shuffle(&mut rng);
        let mut arrivals: Vec<PortEvent> = (0..buffers).map(|i| data(i * 2)).collect();
        for event in sequence {
            let at = rng.random_range(0..=arrivals.len());
            arrivals.insert(at, event);
        }

        let mut n = negotiation();
        let mut observed = Vec::new();
        for event in arrivals {
            observed.extend(n.push(event));
        }
        assert!(n.ready_to_link(), "seed {seed}");
        observed.extend(n.mark_linked().into_iter().map(PortEvent::Data));

        assert_eq!(observed.len(), events.len(), "seed {seed}");
        assert_eq!(observed[0], PortEvent::StreamStart, "seed {seed}");
        assert_eq!(observed[1], PortEvent::Format(aac()), "seed {seed}");
        let pts: Vec<Duration> = observed[2..]
            .iter()
            .map(|e| match e {
                PortEvent::Data(b) => b.pts,
                other => panic!("seed {seed}: unexpected {other:?}"),
            })
            .collect();
        assert!(pts.windows(2).all(|w| w[0] < w[1]), "seed {seed}");
    }
}
