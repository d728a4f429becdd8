use std::path::Path;
use std::time::Duration;

use crate::foundation::core::{Caps, Codec};
use crate::graph::stage::StageFault;

/// Sample rate every decoded file is brought to.
pub const FILE_SAMPLE_RATE: u32 = 48_000;

/// Sample rates a WAV header may declare.
pub const WAV_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=384_000;

/// What could be learned about a local media file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileMedia {
    /// Elementary streams, video first.
    pub streams: Vec<Caps>,
    /// Container duration, if known.
    pub duration: Option<Duration>,
    /// Container tags (title, artist, ...).
    pub tags: Vec<(String, String)>,
    /// Decoded interleaved stereo audio at [`FILE_SAMPLE_RATE`], when available.
    pub pcm: Option<Vec<f32>>,
}

/// Probe `path` and decode its audio.
#[cfg(feature = "media-ffmpeg")]
pub fn load(path: &Path) -> Result<FileMedia, StageFault> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        codec_name: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
        #[serde(default)]
        tags: std::collections::BTreeMap<String, String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| StageFault::Missing(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(StageFault::Failed(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| StageFault::Failed(format!("ffprobe json parse failed: {e}")))?;

    let mut streams: Vec<Caps> = parsed
        .streams
        .iter()
        .filter(|s| matches!(s.codec_type.as_deref(), Some("video" | "audio")))
        .filter_map(|s| s.codec_name.as_deref()?.parse::<Codec>().ok())
        .map(Caps::compressed)
        .collect();
    streams.sort_by_key(|c| c.kind);
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);
    let tags = parsed
        .format
        .map(|f| f.tags.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
        .unwrap_or_default();

    let pcm = if streams.iter().any(|c| c.kind == crate::MediaKind::Audio) {
        Some(decode_audio_f32_stereo(path)?)
    } else {
        None
    };

    Ok(FileMedia {
        streams,
        duration,
        tags,
        pcm,
    })
}

#[cfg(feature = "media-ffmpeg")]
fn decode_audio_f32_stereo(path: &Path) -> Result<Vec<f32>, StageFault> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &FILE_SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| StageFault::Missing(format!("failed to run ffmpeg for audio decode: {e}")))?;
    if !out.status.success() {
        return Err(StageFault::Decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Load a WAV file in-process. Every other container needs the `media-ffmpeg` feature.
#[cfg(not(feature = "media-ffmpeg"))]
pub fn load(path: &Path) -> Result<FileMedia, StageFault> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == "wav" || ext == "wave" {
        let bytes = std::fs::read(path)
            .map_err(|e| StageFault::Failed(format!("cannot read '{}': {e}", path.display())))?;
        let wav = parse_wav(&bytes)?;
        let duration = Duration::from_secs_f64(
            wav.samples.len() as f64 / 2.0 / f64::from(FILE_SAMPLE_RATE),
        );
        return Ok(FileMedia {
            streams: vec![Caps::compressed(Codec::Pcm)],
            duration: Some(duration),
            tags: Vec::new(),
            pcm: Some(wav.samples),
        });
    }

    match streams_for_extension(&ext) {
        Some(_) => Err(StageFault::Missing(format!(
            "decoding '{}' requires the media-ffmpeg feature",
            path.display()
        ))),
        None => Err(StageFault::Failed(format!(
            "cannot identify '{}' without the media-ffmpeg feature",
            path.display()
        ))),
    }
}

/// Streams usually found in a container with extension `ext`.
pub fn streams_for_extension(ext: &str) -> Option<Vec<Caps>> {
    let audio = |c| vec![Caps::compressed(c)];
    let av = |v, a| vec![Caps::compressed(v), Caps::compressed(a)];
    let streams = match ext {
        "mp3" => audio(Codec::Mp3),
        "ogg" | "oga" => audio(Codec::Vorbis),
        "opus" => audio(Codec::Opus),
        "flac" => audio(Codec::Flac),
        "m4a" | "aac" => audio(Codec::Aac),
        "wav" | "wave" => audio(Codec::Pcm),
        "mp4" | "m4v" | "mov" | "mkv" => av(Codec::H264, Codec::Aac),
        "webm" => av(Codec::Vp9, Codec::Opus),
        "mpg" | "mpeg" | "ts" => av(Codec::Mpeg2, Codec::Mp3),
        _ => return None,
    };
    Some(streams)
}

/// Decoded WAV payload, interleaved stereo at [`FILE_SAMPLE_RATE`].
#[derive(Clone, Debug, PartialEq)]
pub struct Wav {
    /// Samples.
    pub samples: Vec<f32>,
}

/// Parse a RIFF/WAVE file with 16-bit integer or 32-bit float PCM.
///
/// Mono is duplicated to stereo and other rates are resampled (nearest sample).
pub fn parse_wav(bytes: &[u8]) -> Result<Wav, StageFault> {
    let bad = |msg: &str| StageFault::Decode(format!("malformed wav: {msg}"));
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(bad("missing RIFF/WAVE header"));
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut data: Option<&[u8]> = None;
    let mut at = 12;
    while at + 8 <= bytes.len() {
        let id = &bytes[at..at + 4];
        let len = u32::from_le_bytes([bytes[at + 4], bytes[at + 5], bytes[at + 6], bytes[at + 7]])
            as usize;
        let body_start = at + 8;
        let body_end = body_start.saturating_add(len).min(bytes.len());
        let body = &bytes[body_start..body_end];
        match id {
            b"fmt " if body.len() >= 16 => {
                let format = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                fmt = Some((format, channels, rate, bits));
            }
            b"data" => data = Some(body),
            _ => {}
        }
        // Chunks are padded to an even size.
        at = body_start + len + (len & 1);
    }

    let (format, channels, rate, bits) = fmt.ok_or_else(|| bad("no fmt chunk"))?;
    let data = data.ok_or_else(|| bad("no data chunk"))?;
    if channels == 0 {
        return Err(bad("zero channels"));
    }
    if !WAV_RATE_RANGE.contains(&rate) {
        return Err(bad(&format!("sample rate {rate} Hz out of range")));
    }

    let decoded: Vec<f32> = match (format, bits) {
        (1, 16) => data
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32_768.0)
            .collect(),
        (3, 32) => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        _ => return Err(bad(&format!("unsupported encoding {format}/{bits}-bit"))),
    };

    let channels = usize::from(channels);
    let frames = decoded.len() / channels;
    let out_frames = (frames as u64 * u64::from(FILE_SAMPLE_RATE) / u64::from(rate)) as usize;
    let mut samples = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        let src = ((i as u64 * u64::from(rate)) / u64::from(FILE_SAMPLE_RATE)) as usize;
        let frame = &decoded[src * channels..src * channels + channels];
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        samples.push(left);
        samples.push(right);
    }
    Ok(Wav { samples })
}

#[cfg(test)]
#[path = "../../tests/unit/graph/media_file.rs"]
mod tests;
