use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Elementary stream kind. Each kind gets its own branch (bin) in a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Picture stream.
    Video,
    /// Sound stream.
    Audio,
}

impl MediaKind {
    /// Both kinds, video first (the order branches are built in).
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    /// Lowercase name used in logs, factory arguments and caps strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressed stream encodings the pipeline knows how to route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// MPEG-2 video.
    Mpeg2,
    /// AAC.
    Aac,
    /// MPEG-1 layer III.
    Mp3,
    /// Vorbis.
    Vorbis,
    /// Opus.
    Opus,
    /// FLAC.
    Flac,
    /// Uncompressed PCM inside a container (WAV and friends).
    Pcm,
}

impl Codec {
    /// Codecs a VA-API driver may advertise; the only ones eligible for accelerated decode.
    pub const ACCELERABLE: [Codec; 5] = [Codec::H264, Codec::H265, Codec::Vp8, Codec::Vp9, Codec::Av1];

    /// Media kind carried by this codec.
    pub fn kind(self) -> MediaKind {
        match self {
            Self::H264 | Self::H265 | Self::Vp8 | Self::Vp9 | Self::Av1 | Self::Mpeg2 => {
                MediaKind::Video
            }
            Self::Aac | Self::Mp3 | Self::Vorbis | Self::Opus | Self::Flac | Self::Pcm => {
                MediaKind::Audio
            }
        }
    }

    /// Return `true` when hardware decode of this codec is possible at all.
    pub fn is_accelerable(self) -> bool {
        Self::ACCELERABLE.contains(&self)
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Mpeg2 => "mpeg2",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Pcm => "pcm",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = String;

    /// Accepts canonical names plus the aliases tools commonly print (`avc`, `hevc`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codec = match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Self::H264,
            "h265" | "hevc" | "hvc1" => Self::H265,
            "vp8" => Self::Vp8,
            "vp9" => Self::Vp9,
            "av1" | "av01" => Self::Av1,
            "mpeg2" | "mpeg2video" => Self::Mpeg2,
            "aac" | "mp4a" => Self::Aac,
            "mp3" => Self::Mp3,
            "vorbis" => Self::Vorbis,
            "opus" => Self::Opus,
            "flac" => Self::Flac,
            "pcm" | "pcm_s16le" | "pcm_f32le" | "wav" => Self::Pcm,
            other => return Err(format!("unknown codec '{other}'")),
        };
        Ok(codec)
    }
}

/// Payload encoding of a stream: compressed with a known codec, or raw decoded data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Compressed elementary stream.
    Compressed(Codec),
    /// Decoded frames or samples.
    Raw,
}

/// A concrete data format flowing across a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caps {
    /// Stream kind.
    pub kind: MediaKind,
    /// Payload encoding.
    pub encoding: Encoding,
}

impl Caps {
    /// Compressed caps for `codec`; the kind follows from the codec.
    pub fn compressed(codec: Codec) -> Self {
        Self {
            kind: codec.kind(),
            encoding: Encoding::Compressed(codec),
        }
    }

    /// Raw (decoded) caps of `kind`.
    pub fn raw(kind: MediaKind) -> Self {
        Self {
            kind,
            encoding: Encoding::Raw,
        }
    }

    /// Return `true` for decoded data.
    pub fn is_raw(&self) -> bool {
        matches!(self.encoding, Encoding::Raw)
    }

    /// Codec of compressed caps.
    pub fn codec(&self) -> Option<Codec> {
        match self.encoding {
            Encoding::Compressed(c) => Some(c),
            Encoding::Raw => None,
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoding {
            Encoding::Compressed(codec) => write!(f, "{}/x-{}", self.kind, codec),
            Encoding::Raw => write!(f, "{}/x-raw", self.kind),
        }
    }
}

/// What a port is able to carry before a concrete format is negotiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapsTemplate {
    /// Any compressed stream of the kind.
    Compressed(MediaKind),
    /// Raw data of the kind.
    Raw(MediaKind),
    /// Exactly one format (used by capsfilters and discovered source ports).
    Exact(Caps),
}

impl CapsTemplate {
    /// Stream kind the template is restricted to.
    pub fn kind(&self) -> MediaKind {
        match *self {
            Self::Compressed(k) | Self::Raw(k) => k,
            Self::Exact(c) => c.kind,
        }
    }

    /// Return `true` when `caps` fits this template.
    pub fn accepts(&self, caps: &Caps) -> bool {
        match *self {
            Self::Compressed(k) => caps.kind == k && !caps.is_raw(),
            Self::Raw(k) => caps.kind == k && caps.is_raw(),
            Self::Exact(c) => c == *caps,
        }
    }
}

/// Functional role of a stage in a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reads the URI.
    Source,
    /// Splits the container into elementary streams.
    Demux,
    /// Turns compressed data into raw data.
    Decode,
    /// Converts raw data into something the sink accepts.
    Convert,
    /// Optional raw-to-raw processing (equalizer, capsfilter).
    Filter,
    /// Renders or plays out.
    Sink,
}

impl Role {
    /// Lowercase name used in logs and fault labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Demux => "demux",
            Self::Decode => "decode",
            Self::Convert => "convert",
            Self::Filter => "filter",
            Self::Sink => "sink",
        }
    }

    /// Return `true` for roles that exist once per media kind.
    pub fn is_per_branch(self) -> bool {
        !matches!(self, Self::Source | Self::Demux)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional processing a backend may carry between convert and sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Ten-band graphic equalizer on the audio branch.
    Equalizer,
}

impl FilterKind {
    /// Identifier accepted by `set_filter_parameter`.
    pub fn id(self) -> &'static str {
        match self {
            Self::Equalizer => "equalizer",
        }
    }

    /// Branch the filter is inserted into.
    pub fn kind(self) -> MediaKind {
        match self {
            Self::Equalizer => MediaKind::Audio,
        }
    }

    /// Reverse of [`FilterKind::id`].
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "equalizer" | "eq" => Some(Self::Equalizer),
            _ => None,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Arena index of a stage inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u32);

/// Arena index of a port inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// Arena index of a bin inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BinId(pub u32);

/// Process-unique playback session id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Opaque render surface handed in by the embedding environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
