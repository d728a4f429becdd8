use super::*;

const INTEL_VAINFO: &str = "\
vainfo: VA-API version: 1.20 (libva 2.20.0)
vainfo: Driver version: Intel iHD driver for Intel(R) Gen Graphics - 24.1.0
vainfo: Supported profile and entrypoints
      VAProfileNone                   :	VAEntrypointVideoProc
      VAProfileH264Main               :	VAEntrypointVLD
      VAProfileH264Main               :	VAEntrypointEncSliceLP
      VAProfileHEVCMain               :	VAEntrypointVLD
      VAProfileVP9Profile0            :	VAEntrypointVLD
      VAProfileAV1Profile0            :	VAEntrypointEncSliceLP
";

#[test]
fn vainfo_decode_entrypoints_only() {
    let caps = CodecSupport::from_vainfo(INTEL_VAINFO);
    assert!(caps.h264);
    assert!(caps.h265);
    assert!(caps.vp9);
    assert!(!caps.vp8);
    // AV1 is listed for encode only.
    assert!(!caps.av1);
    assert_eq!(
        caps.codecs().into_iter().collect::<Vec<_>>(),
        vec![Codec::H264, Codec::H265, Codec::Vp9]
    );
}

#[test]
fn unstructured_output_falls_back_to_names() {
    let caps = CodecSupport::from_vainfo("supports: avc hevc vp8");
    assert!(caps.h264 && caps.h265 && caps.vp8);
    assert!(!caps.vp9 && !caps.av1);
}

#[test]
fn empty_output_supports_nothing() {
    assert!(CodecSupport::from_vainfo("").is_empty());
    assert!(!CodecSupport::default().supports(Codec::Aac));
}

#[test]
fn cpu_flags_come_from_first_flags_line() {
    let cpuinfo = "processor\t: 0\nvendor_id\t: GenuineIntel\nflags\t\t: fpu sse4_2 avx2\n\nprocessor\t: 1\nflags\t\t: fpu\n";
    let flags = parse_cpu_flags(cpuinfo);
    assert!(flags.contains("sse4_2"));
    assert!(flags.contains("avx2"));
    assert_eq!(flags.len(), 3);
    assert!(parse_cpu_flags("no flags here").is_empty());
}

#[test]
fn software_only_profile_has_no_acceleration() {
    let p = HardwareProfile::software_only(0);
    assert!(!p.has_acceleration());
    assert_eq!(p.cpu_count, 1);
    assert_eq!(p.thread_bounds.clamp(64), 16);
    assert_eq!(p.thread_bounds.clamp(1), 2);
}
