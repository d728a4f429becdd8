use super::*;

fn sine(freq: f64, rate: u32, frames: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames * 2);
    for n in 0..frames {
        let v = (2.0 * PI * freq * n as f64 / f64::from(rate)).sin() as f32 * 0.25;
        out.push(v);
        out.push(v);
    }
    out
}

fn rms(samples: &[f32]) -> f64 {
    let sum: f64 = samples.iter().map(|s| f64::from(*s).powi(2)).sum();
    (sum / samples.len() as f64).sqrt()
}

#[test]
fn presets_cover_the_known_names() {
    let names: Vec<_> = preset_names().collect();
    assert_eq!(names.len(), 24);
    assert_eq!(names[0], "Flat");
    assert_eq!(
        preset_gains("bass boost").unwrap(),
        [7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 0.0, 0.0, 0.0, 0.0]
    );
    assert!(preset_gains("Polka").is_none());
    for name in preset_names() {
        for g in preset_gains(name).unwrap() {
            assert!((MIN_GAIN_DB..=MAX_GAIN_DB).contains(&g), "{name}");
        }
    }
}

#[test]
fn out_of_range_values_are_rejected_without_side_effects() {
    let mut eq = EqualizerState::flat();
    eq.set_band(3, 6.0).unwrap();
    assert_eq!(eq.preset(), CUSTOM_PRESET);

    assert!(eq.set_band(3, 12.5).is_err());
    assert!(eq.set_band(3, -24.01).is_err());
    assert!(eq.set_band(3, f64::NAN).is_err());
    assert!(eq.set_band(10, 0.0).is_err());
    assert_eq!(eq.band(3), Some(6.0));

    eq.set_band(0, MIN_GAIN_DB).unwrap();
    eq.set_band(9, MAX_GAIN_DB).unwrap();
}

#[test]
fn preset_then_reset() {
    let mut eq = EqualizerState::default();
    eq.apply_preset("rock").unwrap();
    assert_eq!(eq.preset(), "Rock");
    assert_eq!(eq.band(0), Some(5.0));
    assert!(eq.apply_preset("nope").is_err());
    assert_eq!(eq.preset(), "Rock");
    eq.reset();
    assert_eq!(eq, EqualizerState::flat());
}

#[test]
fn band_params_parse() {
    assert_eq!(parse_band_param("band0"), Some(0));
    assert_eq!(parse_band_param("band9"), Some(9));
    assert_eq!(parse_band_param("band10"), None);
    assert_eq!(parse_band_param("gain"), None);
}

#[test]
fn flat_cascade_is_transparent() {
    let mut dsp = EqualizerDsp::new(48_000, 2);
    let input = sine(440.0, 48_000, 4_800);
    let mut out = input.clone();
    dsp.process(&mut out);
    assert_eq!(out, input);
}

#[test]
fn boosting_a_band_raises_its_centre_frequency() {
    let rate = 48_000;
    let input = sine(BAND_FREQUENCIES_HZ[5], rate, 24_000);

    let mut boosted = input.clone();
    let mut dsp = EqualizerDsp::new(rate, 2);
    dsp.set_band(5, 12.0);
    dsp.process(&mut boosted);

    let mut cut = input.clone();
    let mut dsp = EqualizerDsp::new(rate, 2);
    dsp.set_band(5, -12.0);
    dsp.process(&mut cut);

    // Skip the transient at the start.
    let tail = input.len() / 2;
    let base = rms(&input[tail..]);
    assert!(rms(&boosted[tail..]) > base * 2.5);
    assert!(rms(&cut[tail..]) < base * 0.5);
}

#[test]
fn far_bands_barely_touch_a_tone() {
    let rate = 48_000;
    let input = sine(BAND_FREQUENCIES_HZ[5], rate, 24_000);
    let mut out = input.clone();
    let mut dsp = EqualizerDsp::new(rate, 2);
    dsp.set_band(0, 12.0);
    dsp.process(&mut out);
    let tail = input.len() / 2;
    let ratio = rms(&out[tail..]) / rms(&input[tail..]);
    assert!((0.9..1.1).contains(&ratio), "ratio {ratio}");
}
