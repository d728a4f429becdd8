use serde::{Deserialize, Serialize};

use crate::foundation::core::{MediaKind, Role};

/// Names of the built-in stage factories.
///
/// A chain entry is a factory name, optionally followed by `@argument` (for example
/// `alsasink@hw:1,0` selects an ALSA device).
pub mod factories {
    /// URI source (`test://`, `file://`, plain paths).
    pub const URISRC: &str = "urisrc";
    /// Container demuxer with dynamic output ports.
    pub const DEMUX: &str = "demux";
    /// VA-API video decoder.
    pub const VAAPI_DECODE: &str = "vaapidecode";
    /// Software video decoder.
    pub const AVDEC_VIDEO: &str = "avdec-video";
    /// Software audio decoder.
    pub const AVDEC_AUDIO: &str = "avdec-audio";
    /// VA-API post-processor (scaling/colour conversion on the GPU).
    pub const VAAPI_POSTPROC: &str = "vaapipostproc";
    /// Software video converter.
    pub const VIDEOCONVERT: &str = "videoconvert";
    /// Software audio converter/resampler.
    pub const AUDIOCONVERT: &str = "audioconvert";
    /// Ten-band equalizer.
    pub const EQUALIZER: &str = "equalizer-10bands";
    /// Pass-through stage pinned to one format.
    pub const CAPSFILTER: &str = "capsfilter";
    /// VA-API video sink (exclusive per output surface).
    pub const VAAPISINK: &str = "vaapisink";
    /// OpenGL video sink.
    pub const GLIMAGESINK: &str = "glimagesink";
    /// XVideo sink.
    pub const XVIMAGESINK: &str = "xvimagesink";
    /// Automatically chosen video sink.
    pub const AUTOVIDEOSINK: &str = "autovideosink";
    /// PulseAudio sink.
    pub const PULSESINK: &str = "pulsesink";
    /// Automatically chosen audio sink.
    pub const AUTOAUDIOSINK: &str = "autoaudiosink";
    /// ALSA sink; the argument names the PCM device.
    pub const ALSASINK: &str = "alsasink";
    /// Discards everything; last resort of every sink chain.
    pub const FAKESINK: &str = "fakesink";
}

use factories as f;

/// Ordered factory entries for one role (and media kind, for per-branch roles).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChain {
    /// Stage role.
    pub role: Role,
    /// Branch kind; `None` for source and demux.
    #[serde(default)]
    pub kind: Option<MediaKind>,
    /// Entries in preference order.
    pub entries: Vec<String>,
}

impl RoleChain {
    /// Build a chain from string literals.
    pub fn new(role: Role, kind: Option<MediaKind>, entries: &[&str]) -> Self {
        Self {
            role,
            kind,
            entries: entries.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// The role -> chain table of a configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackChains {
    chains: Vec<RoleChain>,
}

impl FallbackChains {
    /// Built-in chains for a host with (`accelerated = true`) or without VA-API.
    pub fn defaults(accelerated: bool) -> Self {
        use MediaKind::{Audio, Video};

        let decode_video: &[&str] = if accelerated {
            &[f::VAAPI_DECODE, f::AVDEC_VIDEO]
        } else {
            &[f::AVDEC_VIDEO]
        };
        let convert_video: &[&str] = if accelerated {
            &[f::VAAPI_POSTPROC, f::VIDEOCONVERT]
        } else {
            &[f::VIDEOCONVERT]
        };
        let sink_video: &[&str] = if accelerated {
            &[
                f::VAAPISINK,
                f::GLIMAGESINK,
                f::XVIMAGESINK,
                f::AUTOVIDEOSINK,
                f::FAKESINK,
            ]
        } else {
            &[f::GLIMAGESINK, f::XVIMAGESINK, f::AUTOVIDEOSINK, f::FAKESINK]
        };

        Self {
            chains: vec![
                RoleChain::new(Role::Source, None, &[f::URISRC]),
                RoleChain::new(Role::Demux, None, &[f::DEMUX]),
                RoleChain::new(Role::Decode, Some(Video), decode_video),
                RoleChain::new(Role::Decode, Some(Audio), &[f::AVDEC_AUDIO]),
                RoleChain::new(Role::Convert, Some(Video), convert_video),
                RoleChain::new(Role::Convert, Some(Audio), &[f::AUDIOCONVERT]),
                RoleChain::new(Role::Filter, Some(Audio), &[f::EQUALIZER]),
                RoleChain::new(Role::Sink, Some(Video), sink_video),
                RoleChain::new(
                    Role::Sink,
                    Some(Audio),
                    &[
                        f::PULSESINK,
                        f::AUTOAUDIOSINK,
                        "alsasink@default",
                        "alsasink@hw:1,0",
                        "alsasink@hw:0,0",
                        f::FAKESINK,
                    ],
                ),
            ],
        }
    }

    /// Entries for `(role, kind)`; empty when the table has no such chain.
    pub fn get(&self, role: Role, kind: Option<MediaKind>) -> &[String] {
        self.chains
            .iter()
            .find(|c| c.role == role && c.kind == kind)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Replace (or add) the chain for `chain.role`/`chain.kind`.
    pub fn set(&mut self, chain: RoleChain) {
        match self
            .chains
            .iter_mut()
            .find(|c| c.role == chain.role && c.kind == chain.kind)
        {
            Some(slot) => *slot = chain,
            None => self.chains.push(chain),
        }
    }

    /// Drop every entry naming one of `names` (matched on the factory part).
    pub fn remove_factories(&mut self, names: &[&str]) {
        for chain in &mut self.chains {
            chain
                .entries
                .retain(|e| !names.contains(&factory_name(e)));
        }
    }

    /// Every chain in table order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleChain> {
        self.chains.iter()
    }
}

/// Factory part of a chain entry (`alsasink@hw:0,0` -> `alsasink`).
pub fn factory_name(entry: &str) -> &str {
    entry.split_once('@').map_or(entry, |(name, _)| name)
}

/// Argument part of a chain entry, if any.
pub fn factory_arg(entry: &str) -> Option<&str> {
    entry.split_once('@').map(|(_, arg)| arg).filter(|a| !a.is_empty())
}
