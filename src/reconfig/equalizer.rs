use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{PlaybackError, PlaybackResult};

/// Number of equalizer bands.
pub const BAND_COUNT: usize = 10;

/// Centre frequency of each band in Hz.
pub const BAND_FREQUENCIES_HZ: [f64; BAND_COUNT] = [
    29.0, 59.0, 119.0, 237.0, 474.0, 947.0, 1889.0, 3770.0, 7523.0, 15005.0,
];

/// Lowest accepted band gain in dB.
pub const MIN_GAIN_DB: f64 = -24.0;
/// Highest accepted band gain in dB.
pub const MAX_GAIN_DB: f64 = 12.0;

/// Preset name reported after a band was edited by hand.
pub const CUSTOM_PRESET: &str = "Custom";

const PRESETS: &[(&str, [i8; BAND_COUNT])] = &[
    ("Flat", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
    ("Rock", [5, 4, 3, 1, 0, -1, -2, -3, -3, -4]),
    ("Pop", [-1, 2, 4, 4, 2, 0, -1, -1, -1, -1]),
    ("Jazz", [3, 2, 1, 2, -2, -1, 1, 2, 3, 4]),
    ("Classical", [0, 0, 0, 0, 0, 0, -1, -1, -1, -2]),
    ("Electronic", [4, 3, 1, 0, 1, 2, 4, 5, 6, 7]),
    ("Bass Boost", [7, 6, 5, 4, 3, 2, 0, 0, 0, 0]),
    ("Vocal", [-4, -2, 0, 2, 4, 4, 3, 2, 1, 0]),
    ("Dance", [6, 5, 3, 1, 0, 1, 3, 5, 6, 7]),
    ("Acoustic", [0, 1, 2, 2, 2, 0, -1, -2, -2, -2]),
    ("Metal", [7, 6, 5, 4, 3, 2, 1, 0, 0, 0]),
    ("Hip Hop", [5, 4, 3, 1, 0, -1, 1, 3, 4, 5]),
    ("Blues", [4, 3, 2, 1, 0, 1, 2, 3, 4, 4]),
    ("Country", [2, 1, 0, 1, 2, 3, 3, 2, 1, 0]),
    ("Reggae", [0, 0, 0, -2, 0, 2, 4, 4, 2, 0]),
    ("Live", [-2, -1, 0, 1, 2, 2, 1, 0, -1, -2]),
    ("Podcast", [-3, -2, -1, 0, 2, 3, 3, 2, 1, 0]),
    ("Loudness", [5, 4, 3, 2, 1, 0, -1, -2, -3, -4]),
    ("Club", [6, 5, 4, 2, 0, 1, 3, 5, 6, 7]),
    ("Party", [7, 6, 5, 3, 1, 0, 2, 4, 6, 8]),
    ("Soft Rock", [3, 2, 1, 0, -1, 0, 1, 2, 3, 3]),
    ("Hard Rock", [8, 7, 6, 4, 2, 0, -1, -2, -3, -4]),
    ("Punk", [8, 7, 6, 5, 4, 3, 2, 1, 0, 0]),
    ("Alternative", [4, 3, 2, 1, 0, 1, 2, 3, 4, 4]),
];

/// Names of the built-in presets, in menu order.
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Band gains of a built-in preset (case-insensitive lookup).
pub fn preset_gains(name: &str) -> Option<[f64; BAND_COUNT]> {
    PRESETS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, gains)| gains.map(f64::from))
}

/// Parse `band<N>` (0-based) into a band index.
pub fn parse_band_param(param: &str) -> Option<usize> {
    let idx: usize = param.strip_prefix("band")?.parse().ok()?;
    (idx < BAND_COUNT).then_some(idx)
}

/// Ten band gains plus the preset they came from.
///
/// Lives on the session, not on a graph, so it survives backend switches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EqualizerState {
    bands: [f64; BAND_COUNT],
    preset: String,
}

impl Default for EqualizerState {
    fn default() -> Self {
        Self::flat()
    }
}

impl EqualizerState {
    /// All bands at 0 dB.
    pub fn flat() -> Self {
        Self {
            bands: [0.0; BAND_COUNT],
            preset: "Flat".to_owned(),
        }
    }

    /// Current gains in dB.
    pub fn bands(&self) -> &[f64; BAND_COUNT] {
        &self.bands
    }

    /// Gain of one band.
    pub fn band(&self, band: usize) -> Option<f64> {
        self.bands.get(band).copied()
    }

    /// Preset name, or [`CUSTOM_PRESET`] after manual edits.
    pub fn preset(&self) -> &str {
        &self.preset
    }

    /// Set one band. Out-of-range bands or gains are rejected and leave the state unchanged.
    pub fn set_band(&mut self, band: usize, gain_db: f64) -> PlaybackResult<()> {
        if band >= BAND_COUNT {
            return Err(PlaybackError::validation(format!(
                "equalizer band {band} does not exist (0..{BAND_COUNT})"
            )));
        }
        if !gain_db.is_finite() || !(MIN_GAIN_DB..=MAX_GAIN_DB).contains(&gain_db) {
            return Err(PlaybackError::validation(format!(
                "equalizer gain {gain_db} dB outside [{MIN_GAIN_DB}, {MAX_GAIN_DB}]"
            )));
        }
        self.bands[band] = gain_db;
        self.preset = CUSTOM_PRESET.to_owned();
        Ok(())
    }

    /// Load a built-in preset.
    pub fn apply_preset(&mut self, name: &str) -> PlaybackResult<()> {
        let Some((canonical, gains)) = PRESETS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name))
        else {
            return Err(PlaybackError::validation(format!(
                "unknown equalizer preset '{name}'"
            )));
        };
        self.bands = gains.map(f64::from);
        self.preset = (*canonical).to_owned();
        Ok(())
    }

    /// Back to flat.
    pub fn reset(&mut self) {
        *self = Self::flat();
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    // Peaking EQ section from the RBJ audio EQ cookbook.
    fn peaking(sample_rate: f64, centre_hz: f64, q: f64, gain_db: f64) -> Self {
        let centre = centre_hz.min(sample_rate * 0.45);
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * centre / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct History {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

const BAND_Q: f64 = 1.41;

/// Cascade of ten peaking biquads over interleaved `f32` samples.
#[derive(Clone, Debug)]
pub struct EqualizerDsp {
    sample_rate: u32,
    channels: usize,
    gains: [f64; BAND_COUNT],
    sections: [Coefficients; BAND_COUNT],
    history: Vec<[History; BAND_COUNT]>,
}

impl EqualizerDsp {
    /// Flat equalizer for the given stream layout.
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let mut dsp = Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            gains: [0.0; BAND_COUNT],
            sections: [Coefficients::default(); BAND_COUNT],
            history: vec![[History::default(); BAND_COUNT]; channels.max(1)],
        };
        dsp.recompute();
        dsp
    }

    /// Current gains.
    pub fn gains(&self) -> &[f64; BAND_COUNT] {
        &self.gains
    }

    /// Replace every band gain. Filter history is kept so the change is click-free.
    pub fn set_gains(&mut self, gains: &[f64; BAND_COUNT]) {
        self.gains = gains.map(|g| g.clamp(MIN_GAIN_DB, MAX_GAIN_DB));
        self.recompute();
    }

    /// Change one band gain.
    pub fn set_band(&mut self, band: usize, gain_db: f64) {
        if band < BAND_COUNT {
            self.gains[band] = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
            self.recompute();
        }
    }

    /// Filter `samples` (interleaved) in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.gains.iter().all(|g| *g == 0.0) {
            return;
        }
        let channels = self.channels;
        for frame in samples.chunks_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let mut x = f64::from(*sample);
                for (c, h) in self.sections.iter().zip(self.history[ch].iter_mut()) {
                    let y = c.b0 * x + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;
                    h.x2 = h.x1;
                    h.x1 = x;
                    h.y2 = h.y1;
                    h.y1 = y;
                    x = y;
                }
                *sample = x as f32;
            }
        }
    }

    /// Forget filter history (after a seek).
    pub fn reset(&mut self) {
        for h in &mut self.history {
            *h = [History::default(); BAND_COUNT];
        }
    }

    fn recompute(&mut self) {
        let rate = f64::from(self.sample_rate);
        for (i, section) in self.sections.iter_mut().enumerate() {
            *section = Coefficients::peaking(rate, BAND_FREQUENCIES_HZ[i], BAND_Q, self.gains[i]);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/reconfig/equalizer.rs"]
mod tests;
