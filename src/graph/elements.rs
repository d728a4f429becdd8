//! Built-in stage catalogue.
//!
//! Every factory here is a row in [`builtin_factories`]: a name, a role, the branch
//! kinds it serves, whether it needs VA-API, and a constructor. Decoders check codecs
//! and flag corrupt buffers, sinks take their device from the [`DeviceArbiter`] when it
//! is exclusive.
//!
//! [`DeviceArbiter`]: crate::graph::arbiter::DeviceArbiter

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{PipelineConfig, factories as f};
use crate::foundation::core::{Caps, Codec, MediaKind, Role};
use crate::graph::arbiter::{DeviceLease, alsa_key, surface_key};
use crate::graph::stage::{
    Buffer, Stage, StageContext, StageFactory, StageFault, StageState, StateChange,
};
use crate::reconfig::equalizer::{BAND_COUNT, EqualizerDsp, parse_band_param};

type Ctor = fn(MediaKind, Option<&str>, &PipelineConfig) -> Result<Box<dyn Stage>, StageFault>;

/// Table-driven factory used for every built-in stage.
pub struct BuiltinFactory {
    name: &'static str,
    role: Role,
    kinds: &'static [MediaKind],
    needs_acceleration: bool,
    ctor: Ctor,
}

impl StageFactory for BuiltinFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn supports(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn is_available(&self, config: &PipelineConfig) -> bool {
        !self.needs_acceleration || config.is_accelerated()
    }

    fn create(
        &self,
        kind: MediaKind,
        arg: Option<&str>,
        config: &PipelineConfig,
    ) -> Result<Box<dyn Stage>, StageFault> {
        if !self.supports(kind) {
            return Err(StageFault::Missing(format!(
                "{} cannot serve a {kind} branch",
                self.name
            )));
        }
        (self.ctor)(kind, arg, config)
    }
}

const BOTH: &[MediaKind] = &[MediaKind::Video, MediaKind::Audio];
const VIDEO: &[MediaKind] = &[MediaKind::Video];
const AUDIO: &[MediaKind] = &[MediaKind::Audio];

fn row(
    name: &'static str,
    role: Role,
    kinds: &'static [MediaKind],
    needs_acceleration: bool,
    ctor: Ctor,
) -> Arc<dyn StageFactory> {
    Arc::new(BuiltinFactory {
        name,
        role,
        kinds,
        needs_acceleration,
        ctor,
    })
}

/// Every built-in stage factory.
pub fn builtin_factories() -> Vec<Arc<dyn StageFactory>> {
    vec![
        row(f::DEMUX, Role::Demux, BOTH, false, |_, _, _| {
            Ok(Box::new(Passthrough))
        }),
        row(f::VAAPI_DECODE, Role::Decode, VIDEO, true, |kind, _, config| {
            Ok(Box::new(Decoder::new(kind, Some(config.codecs.clone()))))
        }),
        row(f::AVDEC_VIDEO, Role::Decode, VIDEO, false, |kind, _, _| {
            Ok(Box::new(Decoder::new(kind, None)))
        }),
        row(f::AVDEC_AUDIO, Role::Decode, AUDIO, false, |kind, _, _| {
            Ok(Box::new(Decoder::new(kind, None)))
        }),
        row(f::VAAPI_POSTPROC, Role::Convert, VIDEO, true, |_, _, _| {
            Ok(Box::new(Passthrough))
        }),
        row(f::VIDEOCONVERT, Role::Convert, VIDEO, false, |_, _, _| {
            Ok(Box::new(Passthrough))
        }),
        row(f::AUDIOCONVERT, Role::Convert, AUDIO, false, |_, _, _| {
            Ok(Box::new(AudioConvert))
        }),
        row(f::EQUALIZER, Role::Filter, AUDIO, false, |_, _, _| {
            Ok(Box::new(EqualizerStage::default()))
        }),
        row(f::VAAPISINK, Role::Sink, VIDEO, true, |kind, _, _| {
            Ok(Box::new(Sink::new(f::VAAPISINK, kind, SinkDevice::Surface)))
        }),
        row(f::GLIMAGESINK, Role::Sink, VIDEO, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::GLIMAGESINK, kind, SinkDevice::Shared)))
        }),
        row(f::XVIMAGESINK, Role::Sink, VIDEO, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::XVIMAGESINK, kind, SinkDevice::Shared)))
        }),
        row(f::AUTOVIDEOSINK, Role::Sink, VIDEO, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::AUTOVIDEOSINK, kind, SinkDevice::Shared)))
        }),
        row(f::PULSESINK, Role::Sink, AUDIO, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::PULSESINK, kind, SinkDevice::Shared)))
        }),
        row(f::AUTOAUDIOSINK, Role::Sink, AUDIO, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::AUTOAUDIOSINK, kind, SinkDevice::Shared)))
        }),
        row(f::ALSASINK, Role::Sink, AUDIO, false, |kind, arg, _| {
            let device = arg.unwrap_or("default").to_owned();
            Ok(Box::new(Sink::new(f::ALSASINK, kind, SinkDevice::Alsa(device))))
        }),
        row(f::FAKESINK, Role::Sink, BOTH, false, |kind, _, _| {
            Ok(Box::new(Sink::new(f::FAKESINK, kind, SinkDevice::Shared)))
        }),
    ]
}

/// Forwards buffers untouched (demux, video converters).
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Stage for Passthrough {}

/// Pass-through pinned to one format; inserted by the linker between ports that are
/// format-compatible but not adjacent.
#[derive(Clone, Copy, Debug)]
pub struct CapsFilter {
    caps: Caps,
}

impl CapsFilter {
    /// Filter letting only `caps` through.
    pub fn new(caps: Caps) -> Self {
        Self { caps }
    }
}

impl Stage for CapsFilter {
    fn accepts(&self, caps: &Caps) -> bool {
        *caps == self.caps
    }
}

/// Compressed -> raw decoder. `accepted = None` decodes every codec of its kind.
#[derive(Clone, Debug)]
pub struct Decoder {
    kind: MediaKind,
    accepted: Option<BTreeSet<Codec>>,
    decoded: u64,
}

impl Decoder {
    /// Decoder for `kind` limited to `accepted` codecs.
    pub fn new(kind: MediaKind, accepted: Option<BTreeSet<Codec>>) -> Self {
        Self {
            kind,
            accepted,
            decoded: 0,
        }
    }
}

impl Stage for Decoder {
    fn accepts(&self, caps: &Caps) -> bool {
        let Some(codec) = caps.codec() else {
            return false;
        };
        caps.kind == self.kind && self.accepted.as_ref().is_none_or(|set| set.contains(&codec))
    }

    fn output_caps(&self, input: &Caps) -> Caps {
        Caps::raw(input.kind)
    }

    fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>, StageFault> {
        if buffer.corrupt {
            return Err(StageFault::Decode(format!(
                "corrupt {} buffer at {:?}",
                buffer.caps, buffer.pts
            )));
        }
        buffer.caps = Caps::raw(buffer.caps.kind);
        self.decoded += 1;
        Ok(Some(buffer))
    }

    fn property(&self, name: &str) -> Option<f64> {
        (name == "decoded").then_some(self.decoded as f64)
    }
}

/// Brings raw audio to interleaved stereo.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioConvert;

impl Stage for AudioConvert {
    fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>, StageFault> {
        if buffer.channels == 1 {
            buffer.samples = buffer.samples.iter().flat_map(|s| [*s, *s]).collect();
            buffer.channels = 2;
        }
        Ok(Some(buffer))
    }
}

/// Ten-band equalizer stage; bands are the `band0`..`band9` properties in dB.
#[derive(Clone, Debug, Default)]
pub struct EqualizerStage {
    gains: [f64; BAND_COUNT],
    dsp: Option<EqualizerDsp>,
}

impl Stage for EqualizerStage {
    fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>, StageFault> {
        if buffer.rate == 0 || buffer.samples.is_empty() {
            return Ok(Some(buffer));
        }
        let rebuild = self.dsp.is_none();
        let gains = self.gains;
        let dsp = self
            .dsp
            .get_or_insert_with(|| EqualizerDsp::new(buffer.rate, buffer.channels));
        if rebuild {
            dsp.set_gains(&gains);
        }
        dsp.process(&mut buffer.samples);
        Ok(Some(buffer))
    }

    fn flush(&mut self) {
        if let Some(dsp) = self.dsp.as_mut() {
            dsp.reset();
        }
    }

    fn set_property(&mut self, name: &str, value: f64) -> bool {
        let Some(band) = parse_band_param(name) else {
            return false;
        };
        self.gains[band] = value;
        if let Some(dsp) = self.dsp.as_mut() {
            dsp.set_band(band, value);
        }
        true
    }

    fn property(&self, name: &str) -> Option<f64> {
        parse_band_param(name).map(|band| self.gains[band])
    }
}

/// How a sink reaches its output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkDevice {
    /// A shared server or window; never busy.
    Shared,
    /// An ALSA PCM device, exclusive.
    Alsa(String),
    /// The accelerated output surface (or the DRM device when no surface was given),
    /// exclusive.
    Surface,
}

/// Terminal stage: consumes buffers and keeps playout statistics.
#[derive(Debug)]
pub struct Sink {
    name: &'static str,
    kind: MediaKind,
    device: SinkDevice,
    lease: Option<DeviceLease>,
    volume: f64,
    rendered: Duration,
    buffers: u64,
}

impl Sink {
    /// Sink named `name` playing `kind` out of `device`.
    pub fn new(name: &'static str, kind: MediaKind, device: SinkDevice) -> Self {
        Self {
            name,
            kind,
            device,
            lease: None,
            volume: 1.0,
            rendered: Duration::ZERO,
            buffers: 0,
        }
    }

    fn device_key(&self, ctx: &StageContext<'_>) -> Option<String> {
        match &self.device {
            SinkDevice::Shared => None,
            SinkDevice::Alsa(dev) => Some(alsa_key(dev)),
            SinkDevice::Surface => Some(match (ctx.surface, ctx.config.device.as_ref()) {
                (Some(surface), _) => surface_key(surface),
                (None, Some(dev)) => format!("drm:{}", dev.display()),
                (None, None) => "drm:none".to_owned(),
            }),
        }
    }
}

impl Stage for Sink {
    fn change_state(
        &mut self,
        from: StageState,
        to: StageState,
        ctx: &StageContext<'_>,
    ) -> Result<StateChange, StageFault> {
        match (from, to) {
            (StageState::Ready, StageState::Paused) => {
                if let Some(key) = self.device_key(ctx) {
                    self.lease = Some(ctx.arbiter.acquire(&key, ctx.session)?);
                    debug!(sink = self.name, kind = %self.kind, key = %key, "sink opened device");
                }
            }
            (StageState::Paused, StageState::Ready) => self.lease = None,
            _ => {}
        }
        Ok(StateChange::Complete)
    }

    fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>, StageFault> {
        if self.volume < 1.0 {
            let v = self.volume as f32;
            for s in &mut buffer.samples {
                *s *= v;
            }
        }
        self.rendered += buffer.duration;
        self.buffers += 1;
        Ok(None)
    }

    fn set_property(&mut self, name: &str, value: f64) -> bool {
        match name {
            "volume" => {
                self.volume = value.clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }

    fn property(&self, name: &str) -> Option<f64> {
        match name {
            "volume" => Some(self.volume),
            "rendered_ms" => Some(self.rendered.as_millis() as f64),
            "buffers" => Some(self.buffers as f64),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/elements.rs"]
mod tests;
