use super::*;

use crate::probe::{CodecSupport, DriverInfo};

fn intel_profile() -> HardwareProfile {
    let mut p = HardwareProfile::software_only(8);
    let h264_vp9 = CodecSupport {
        h264: true,
        vp9: true,
        ..CodecSupport::default()
    };
    let all = CodecSupport {
        h264: true,
        h265: true,
        vp8: true,
        vp9: true,
        av1: true,
    };
    p.drivers = vec![
        DriverInfo {
            name: "iHD".to_owned(),
            codecs: h264_vp9,
        },
        DriverInfo {
            name: "i965".to_owned(),
            codecs: all,
        },
    ];
    p.driver = Some("iHD".to_owned());
    p.codecs = h264_vp9;
    p.devices = vec![
        PathBuf::from("/dev/dri/renderD128"),
        PathBuf::from("/dev/dri/card0"),
    ];
    p.device = p.devices.first().cloned();
    p
}

fn every_chain_key() -> Vec<(Role, Option<MediaKind>)> {
    let mut keys = vec![(Role::Source, None), (Role::Demux, None)];
    for kind in MediaKind::ALL {
        for role in [Role::Decode, Role::Convert, Role::Sink] {
            keys.push((role, Some(kind)));
        }
    }
    keys.push((Role::Filter, Some(MediaKind::Audio)));
    keys
}

#[test]
fn software_profiles_never_enable_acceleration() {
    for cpus in [0usize, 1, 2, 7, 64] {
        let mut profile = HardwareProfile::software_only(cpus);
        // A driver without a device is still not acceleration.
        if cpus % 2 == 1 {
            profile.drivers.push(DriverInfo {
                name: "iHD".to_owned(),
                codecs: CodecSupport {
                    h264: true,
                    ..CodecSupport::default()
                },
            });
            profile.driver = Some("iHD".to_owned());
        }
        let config = resolve_config(&profile, &ConfigOverrides::default());

        assert!(!config.is_accelerated());
        for codec in Codec::ACCELERABLE {
            assert!(!config.accelerates(codec));
        }
        assert!(config.codecs.is_empty());
        for (role, kind) in every_chain_key() {
            let chain = config.chains.get(role, kind);
            assert!(!chain.is_empty(), "{role:?}/{kind:?} chain is empty");
            for entry in chain {
                assert!(
                    !ACCELERATED_FACTORIES.contains(&factory_name(entry)),
                    "{entry} in software chain"
                );
            }
        }
        assert!((2..=16).contains(&config.thread_pool_size));
    }
}

#[test]
fn accelerated_profile_prefers_first_driver_and_device() {
    let config = resolve_config(&intel_profile(), &ConfigOverrides::default());

    assert_eq!(config.driver.as_deref(), Some("iHD"));
    assert_eq!(config.device, Some(PathBuf::from("/dev/dri/renderD128")));
    assert!(config.accelerates(Codec::H264));
    assert!(config.accelerates(Codec::Vp9));
    assert!(!config.accelerates(Codec::H265));
    assert_eq!(
        config.chain(Role::Decode, MediaKind::Video)[0],
        factories::VAAPI_DECODE
    );
    assert_eq!(
        config.chain(Role::Sink, MediaKind::Video)[0],
        factories::VAAPISINK
    );
    assert_eq!(config.thread_pool_size, 8);
}

#[test]
fn resolution_is_deterministic() {
    let profile = intel_profile();
    let overrides = ConfigOverrides {
        thread_pool_size: Some(40),
        ..ConfigOverrides::default()
    };
    let a = resolve_config(&profile, &overrides);
    let b = resolve_config(&profile, &overrides);
    assert_eq!(a, b);
    assert_eq!(a.thread_pool_size, 16);
}

#[test]
fn overrides_force_driver_and_can_disable_acceleration() {
    let profile = intel_profile();

    let forced = resolve_config(
        &profile,
        &ConfigOverrides {
            driver: Some("i965".to_owned()),
            device: Some(PathBuf::from("/dev/dri/card0")),
            ..ConfigOverrides::default()
        },
    );
    assert_eq!(forced.driver.as_deref(), Some("i965"));
    assert_eq!(forced.device, Some(PathBuf::from("/dev/dri/card0")));
    assert!(forced.accelerates(Codec::Av1));

    let unknown = resolve_config(
        &profile,
        &ConfigOverrides {
            driver: Some("nvidia".to_owned()),
            ..ConfigOverrides::default()
        },
    );
    assert_eq!(unknown.driver.as_deref(), Some("iHD"));

    let off = resolve_config(
        &profile,
        &ConfigOverrides {
            disable_acceleration: true,
            ..ConfigOverrides::default()
        },
    );
    assert!(!off.is_accelerated());
    assert_eq!(
        off.chain(Role::Decode, MediaKind::Video),
        &[factories::AVDEC_VIDEO.to_owned()]
    );
}

#[test]
fn chain_overrides_replace_and_empty_ones_are_ignored() {
    let overrides = ConfigOverrides::from_json(
        r#"{
            "chains": [
                { "role": "sink", "kind": "audio", "entries": ["alsasink@hw:2,0", "fakesink"] },
                { "role": "sink", "kind": "video", "entries": ["vaapisink"] }
            ],
            "tunables": { "max_recovery_attempts": 5 },
            "equalizer_preset": "Rock"
        }"#,
    )
    .unwrap();
    let config = resolve_config(&HardwareProfile::software_only(4), &overrides);

    assert_eq!(
        config.chain(Role::Sink, MediaKind::Audio),
        &["alsasink@hw:2,0".to_owned(), "fakesink".to_owned()]
    );
    // Only an accelerated entry was given; without acceleration it falls back.
    assert!(!config.chain(Role::Sink, MediaKind::Video).is_empty());
    assert_eq!(config.tunables.max_recovery_attempts, 5);
    assert_eq!(config.tunables.decode_error_threshold, 8);
    assert_eq!(config.equalizer_preset.as_deref(), Some("Rock"));
}

#[test]
fn malformed_overrides_are_validation_errors() {
    let err = ConfigOverrides::from_json(r#"{ "no_such_knob": 1 }"#).unwrap_err();
    assert!(err.to_string().contains("validation error"));

    let config = resolve_config(
        &HardwareProfile::software_only(4),
        &ConfigOverrides {
            equalizer_preset: Some("Nope".to_owned()),
            ..ConfigOverrides::default()
        },
    );
    assert!(config.equalizer_preset.is_none());
}

#[test]
fn chain_entries_split_factory_and_argument() {
    assert_eq!(factory_name("alsasink@hw:1,0"), "alsasink");
    assert_eq!(factory_arg("alsasink@hw:1,0"), Some("hw:1,0"));
    assert_eq!(factory_name("pulsesink"), "pulsesink");
    assert_eq!(factory_arg("pulsesink"), None);
    assert_eq!(factory_arg("alsasink@"), None);
}

#[test]
fn eos_policy_defaults_to_stop_and_can_be_overridden() {
    let profile = HardwareProfile::software_only(4);
    assert_eq!(
        resolve_config(&profile, &ConfigOverrides::default()).eos_policy,
        EosPolicy::Stop
    );

    let overrides = ConfigOverrides::from_json(r#"{ "eos_policy": "loop" }"#).unwrap();
    assert_eq!(resolve_config(&profile, &overrides).eos_policy, EosPolicy::Loop);
}
