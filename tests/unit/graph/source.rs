use super::*;

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::foundation::core::SessionId;
use crate::graph::arbiter::DeviceArbiter;

fn open(uri: &str) -> (UriSource, SourceInfo) {
    let config = PipelineConfig::software_only();
    let arbiter: Arc<DeviceArbiter> = DeviceArbiter::new();
    let ctx = StageContext {
        session: SessionId(1),
        config: &config,
        arbiter: &arbiter,
        surface: None,
    };
    let mut src = UriSource::new(uri).unwrap();
    let info = src.open(&ctx).unwrap();
    (src, info)
}

#[test]
fn synthetic_uri_parameters() {
    let spec = SyntheticSpec::parse(
        "test://av?duration_ms=1500&video=vp9&audio=opus&order=format-first&corrupt=audio:3&title=Night+Drive",
    )
    .unwrap();
    assert_eq!(
        spec.streams,
        vec![Caps::compressed(Codec::Vp9), Caps::compressed(Codec::Opus)]
    );
    assert_eq!(spec.duration, Duration::from_millis(1500));
    assert_eq!(spec.order, AnnounceOrder::FormatFirst);
    assert_eq!(spec.corrupt, Some((MediaKind::Audio, 3)));
    assert_eq!(spec.tags, vec![("title".to_owned(), "Night Drive".to_owned())]);

    assert!(SyntheticSpec::parse("test://av?bogus=1").is_err());
    assert!(SyntheticSpec::parse("test://av?video=aac").is_err());
    assert!(SyntheticSpec::parse("test://video?video=aac").is_err());
    assert!(SyntheticSpec::parse("test://audio?audio=h264").is_err());
    assert!(SyntheticSpec::parse("test://tracks").is_err());
    assert!(SyntheticSpec::parse("test://none").unwrap().streams.is_empty());
}

#[test]
fn unknown_schemes_are_missing_sources() {
    assert!(matches!(
        UriSource::new("rtsp://camera/1"),
        Err(StageFault::Missing(_))
    ));
    assert!(UriSourceFactory.handles("file:///tmp/a.wav"));
    assert!(!UriSourceFactory.handles("https://example.org/a.mp4"));
}

#[test]
fn announce_order_follows_the_uri() {
    let (mut src, info) = open("test://video?order=format-first");
    assert_eq!(info.tracks.len(), 1);
    let caps = info.tracks[0].caps;
    assert_eq!(
        src.announce(0),
        vec![PortEvent::Format(caps), PortEvent::StreamStart]
    );

    let (mut src, _) = open("test://audio?order=data-first");
    let events = src.announce(0);
    assert!(matches!(events[0], PortEvent::Data(_)));
    assert!(matches!(events[2], PortEvent::StreamStart));
    assert!(src.announce(5).is_empty());
}

#[test]
fn pulls_cover_the_duration_then_end() {
    let (mut src, info) = open("test://audio?duration_ms=100");
    assert_eq!(info.duration, Some(Duration::from_millis(100)));

    let mut covered = Duration::ZERO;
    while let Some(b) = src.pull(0, Duration::from_millis(30)) {
        assert_eq!(b.pts, covered);
        assert_eq!(b.rate, 48_000);
        covered += b.duration;
    }
    assert_eq!(covered, Duration::from_millis(100));

    src.seek(Duration::from_millis(90));
    let tail = src.pull(0, Duration::from_millis(30)).unwrap();
    assert_eq!(tail.pts, Duration::from_millis(90));
    assert_eq!(tail.samples.len(), 480 * 2);
}

#[test]
fn corrupt_buffers_are_flagged_periodically() {
    let (mut src, _) = open("test://av?corrupt=video:2");
    let flags: Vec<bool> = (0..4)
        .map(|_| src.pull(0, Duration::from_millis(10)).unwrap().corrupt)
        .collect();
    assert_eq!(flags, vec![false, true, false, true]);
    assert!(!src.pull(1, Duration::from_millis(10)).unwrap().corrupt);
}
