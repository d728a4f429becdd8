//! Sources: the stage that reads a URI and discovers its elementary streams.
//!
//! The built-in [`UriSourceFactory`] understands two schemes:
//!
//! - `file:///path/to/media` (or a bare absolute path): a local file, probed with
//!   `ffprobe` when the `media-ffmpeg` feature is on, from its extension otherwise.
//! - `test://<layout>?key=value&...`: a synthetic stream used by tests and demos.
//!   `layout` is `av`, `audio`, `video` or `none`; keys are `duration_ms`, `video`,
//!   `audio` (codec names), `order` (`stream-first`, `format-first`, `data-first`),
//!   `corrupt` (`<kind>:<every-nth-buffer>`) and free-form tags (`title`, `artist`,
//!   `album`, `genre`).

use std::path::PathBuf;
use std::time::Duration;

use crate::foundation::core::{Caps, Codec, MediaKind};
use crate::graph::media_file::{self, FILE_SAMPLE_RATE, FileMedia};
use crate::graph::stage::{Buffer, PortEvent, StageContext, StageFault};

/// One elementary stream of an opened source.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackInfo {
    /// Stream format.
    pub caps: Caps,
}

/// What opening a source revealed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceInfo {
    /// Total duration, if known.
    pub duration: Option<Duration>,
    /// Streams in discovery order.
    pub tracks: Vec<TrackInfo>,
    /// Container tags.
    pub tags: Vec<(String, String)>,
}

/// Reads media from a URI.
pub trait Source: Send {
    /// Open the URI and list its streams.
    fn open(&mut self, ctx: &StageContext<'_>) -> Result<SourceInfo, StageFault>;

    /// Events announced on the port of `track`, in the order they arrive.
    fn announce(&mut self, track: usize) -> Vec<PortEvent>;

    /// Next buffer of `track` covering at most `span`; `None` once the track ended.
    fn pull(&mut self, track: usize, span: Duration) -> Option<Buffer>;

    /// Reposition every track.
    fn seek(&mut self, position: Duration);

    /// Release whatever `open` acquired.
    fn close(&mut self) {}
}

/// Creates sources for URIs it recognises.
pub trait SourceFactory: Send + Sync {
    /// Name used in the source chain.
    fn name(&self) -> &str;

    /// Return `true` when this factory can read `uri`.
    fn handles(&self, uri: &str) -> bool;

    /// Create an unopened source.
    fn create(&self, uri: &str) -> Result<Box<dyn Source>, StageFault>;
}

/// Order in which a synthetic port announces itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnounceOrder {
    /// `stream-start`, then `format`.
    #[default]
    StreamFirst,
    /// `format` arrives before `stream-start`.
    FormatFirst,
    /// A data buffer, then `format`, then `stream-start`.
    DataFirst,
}

/// Parsed `test://` URI.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticSpec {
    /// Streams to expose, video first.
    pub streams: Vec<Caps>,
    /// Stream length.
    pub duration: Duration,
    /// Announce order of every port.
    pub order: AnnounceOrder,
    /// Every n-th buffer of the kind is corrupt.
    pub corrupt: Option<(MediaKind, u32)>,
    /// Container tags.
    pub tags: Vec<(String, String)>,
}

impl SyntheticSpec {
    /// Parse a `test://` URI.
    pub fn parse(uri: &str) -> Result<Self, StageFault> {
        let rest = uri
            .strip_prefix("test://")
            .ok_or_else(|| StageFault::Failed(format!("not a test uri: {uri}")))?;
        let (layout, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut video = Codec::H264;
        let mut audio = Codec::Aac;
        let mut spec = Self {
            streams: Vec::new(),
            duration: Duration::from_secs(10),
            order: AnnounceOrder::StreamFirst,
            corrupt: None,
            tags: Vec::new(),
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let invalid = || StageFault::Failed(format!("invalid test uri parameter '{pair}'"));
            match key {
                "duration_ms" => {
                    spec.duration = Duration::from_millis(value.parse().map_err(|_| invalid())?);
                }
                "video" => {
                    video = value.parse().map_err(|_| invalid())?;
                    if video.kind() != MediaKind::Video {
                        return Err(invalid());
                    }
                }
                "audio" => {
                    audio = value.parse().map_err(|_| invalid())?;
                    if audio.kind() != MediaKind::Audio {
                        return Err(invalid());
                    }
                }
                "order" => {
                    spec.order = match value {
                        "stream-first" => AnnounceOrder::StreamFirst,
                        "format-first" => AnnounceOrder::FormatFirst,
                        "data-first" => AnnounceOrder::DataFirst,
                        _ => return Err(invalid()),
                    }
                }
                "corrupt" => {
                    let (kind, every) = value.split_once(':').ok_or_else(invalid)?;
                    let kind = match kind {
                        "video" => MediaKind::Video,
                        "audio" => MediaKind::Audio,
                        _ => return Err(invalid()),
                    };
                    let every: u32 = every.parse().map_err(|_| invalid())?;
                    spec.corrupt = (every > 0).then_some((kind, every));
                }
                "title" | "artist" | "album" | "genre" => {
                    spec.tags.push((key.to_owned(), value.replace('+', " ")));
                }
                _ => return Err(invalid()),
            }
        }

        spec.streams = match layout.trim_end_matches('/') {
            "" | "av" => vec![Caps::compressed(video), Caps::compressed(audio)],
            "video" => vec![Caps::compressed(video)],
            "audio" => vec![Caps::compressed(audio)],
            "none" => Vec::new(),
            other => {
                return Err(StageFault::Failed(format!(
                    "unknown test layout '{other}'"
                )));
            }
        };
        Ok(spec)
    }
}

enum Origin {
    Synthetic(SyntheticSpec),
    File(PathBuf),
}

struct Track {
    caps: Caps,
    position: Duration,
    emitted: u64,
}

const VIDEO_FPS: f64 = 30.0;
const TONE_HZ: f64 = 440.0;

/// Source behind the `urisrc` factory.
pub struct UriSource {
    uri: String,
    origin: Origin,
    order: AnnounceOrder,
    corrupt: Option<(MediaKind, u32)>,
    duration: Option<Duration>,
    pcm: Option<Vec<f32>>,
    tracks: Vec<Track>,
}

impl UriSource {
    /// Unopened source for `uri`.
    pub fn new(uri: &str) -> Result<Self, StageFault> {
        let origin = if uri.starts_with("test://") {
            Origin::Synthetic(SyntheticSpec::parse(uri)?)
        } else if let Some(path) = uri.strip_prefix("file://") {
            Origin::File(PathBuf::from(path))
        } else if uri.starts_with('/') {
            Origin::File(PathBuf::from(uri))
        } else {
            return Err(StageFault::Missing(format!("no source handles '{uri}'")));
        };
        Ok(Self {
            uri: uri.to_owned(),
            origin,
            order: AnnounceOrder::StreamFirst,
            corrupt: None,
            duration: None,
            pcm: None,
            tracks: Vec::new(),
        })
    }

    fn track_mut(&mut self, track: usize) -> Option<&mut Track> {
        self.tracks.get_mut(track)
    }
}

impl Source for UriSource {
    fn open(&mut self, _ctx: &StageContext<'_>) -> Result<SourceInfo, StageFault> {
        let (streams, tags) = match &self.origin {
            Origin::Synthetic(spec) => {
                self.order = spec.order;
                self.corrupt = spec.corrupt;
                self.duration = Some(spec.duration);
                (spec.streams.clone(), spec.tags.clone())
            }
            Origin::File(path) => {
                if !path.is_file() {
                    return Err(StageFault::Failed(format!(
                        "no such file: {}",
                        path.display()
                    )));
                }
                let FileMedia {
                    streams,
                    duration,
                    tags,
                    pcm,
                } = media_file::load(path)?;
                self.duration = duration;
                self.pcm = pcm;
                (streams, tags)
            }
        };
        self.tracks = streams
            .iter()
            .map(|caps| Track {
                caps: *caps,
                position: Duration::ZERO,
                emitted: 0,
            })
            .collect();
        tracing::debug!(uri = %self.uri, tracks = self.tracks.len(), "source opened");
        Ok(SourceInfo {
            duration: self.duration,
            tracks: streams.into_iter().map(|caps| TrackInfo { caps }).collect(),
            tags,
        })
    }

    fn announce(&mut self, track: usize) -> Vec<PortEvent> {
        let Some(caps) = self.tracks.get(track).map(|t| t.caps) else {
            return Vec::new();
        };
        match self.order {
            AnnounceOrder::StreamFirst => vec![PortEvent::StreamStart, PortEvent::Format(caps)],
            AnnounceOrder::FormatFirst => vec![PortEvent::Format(caps), PortEvent::StreamStart],
            AnnounceOrder::DataFirst => {
                let early = self
                    .pull(track, Duration::from_millis(20))
                    .map(PortEvent::Data);
                early
                    .into_iter()
                    .chain([PortEvent::Format(caps), PortEvent::StreamStart])
                    .collect()
            }
        }
    }

    fn pull(&mut self, track: usize, span: Duration) -> Option<Buffer> {
        let duration = self.duration;
        let corrupt = self.corrupt;
        let pcm_len = self.pcm.as_ref().map(Vec::len);
        let synthetic = matches!(self.origin, Origin::Synthetic(_));
        let t = self.track_mut(track)?;

        let remaining = match duration {
            Some(total) => total.checked_sub(t.position).filter(|r| !r.is_zero())?,
            None => span,
        };
        let span = span.min(remaining);
        if span.is_zero() {
            return None;
        }
        let pts = t.position;
        let caps = t.caps;
        t.position += span;
        t.emitted += 1;
        let damaged = corrupt.is_some_and(|(kind, every)| {
            kind == caps.kind && t.emitted % u64::from(every) == 0
        });

        let mut buffer = match caps.kind {
            MediaKind::Video => {
                let first = (pts.as_secs_f64() * VIDEO_FPS).floor() as u64;
                let last = ((pts + span).as_secs_f64() * VIDEO_FPS).floor() as u64;
                Buffer::video(caps, pts, span, (last - first) as u32)
            }
            MediaKind::Audio => {
                let rate = FILE_SAMPLE_RATE;
                let start = (pts.as_secs_f64() * f64::from(rate)) as usize;
                let frames = (span.as_secs_f64() * f64::from(rate)).round() as usize;
                let samples = match (&self.pcm, pcm_len) {
                    (Some(pcm), Some(len)) => {
                        let from = (start * 2).min(len);
                        let to = ((start + frames) * 2).min(len);
                        if from == to {
                            return None;
                        }
                        pcm[from..to].to_vec()
                    }
                    _ if synthetic => tone(start, frames, rate, TONE_HZ * (track as f64 + 1.0)),
                    // A file without decoded audio has nothing to play.
                    _ => return None,
                };
                Buffer::audio(caps, pts, samples, rate, 2)
            }
        };
        buffer.corrupt = damaged;
        Some(buffer)
    }

    fn seek(&mut self, position: Duration) {
        let position = match self.duration {
            Some(total) => position.min(total),
            None => position,
        };
        for t in &mut self.tracks {
            t.position = position;
        }
    }

    fn close(&mut self) {
        self.pcm = None;
        self.tracks.clear();
    }
}

fn tone(start_frame: usize, frames: usize, rate: u32, hz: f64) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames * 2);
    let step = 2.0 * std::f64::consts::PI * hz / f64::from(rate);
    for n in start_frame..start_frame + frames {
        let v = ((n as f64) * step).sin() as f32 * 0.1;
        out.push(v);
        out.push(v);
    }
    out
}

/// Factory of [`UriSource`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UriSourceFactory;

impl SourceFactory for UriSourceFactory {
    fn name(&self) -> &str {
        crate::config::factories::URISRC
    }

    fn handles(&self, uri: &str) -> bool {
        uri.starts_with("test://") || uri.starts_with("file://") || uri.starts_with('/')
    }

    fn create(&self, uri: &str) -> Result<Box<dyn Source>, StageFault> {
        Ok(Box::new(UriSource::new(uri)?))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/source.rs"]
mod tests;
