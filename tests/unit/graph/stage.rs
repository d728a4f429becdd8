use super::*;

use crate::foundation::core::Codec;

#[test]
fn states_step_one_level_at_a_time() {
    use StageState::*;
    assert_eq!(Null.step_towards(Playing), Some(Ready));
    assert_eq!(Ready.step_towards(Playing), Some(Paused));
    assert_eq!(Playing.step_towards(Null), Some(Paused));
    assert_eq!(Paused.step_towards(Paused), None);
}

#[test]
fn audio_buffer_duration_follows_frames() {
    let caps = Caps::raw(MediaKind::Audio);
    let b = Buffer::audio(caps, Duration::ZERO, vec![0.0; 4_800 * 2], 48_000, 2);
    assert_eq!(b.duration, Duration::from_millis(100));
    assert_eq!(b.kind(), MediaKind::Audio);
}

#[test]
fn decoder_templates_turn_compressed_into_raw() {
    let (input, output) = port_templates(Role::Decode, MediaKind::Video);
    assert!(input.unwrap().accepts(&Caps::compressed(Codec::H264)));
    assert!(output.unwrap().accepts(&Caps::raw(MediaKind::Video)));

    let (input, output) = port_templates(Role::Sink, MediaKind::Audio);
    assert!(input.unwrap().accepts(&Caps::raw(MediaKind::Audio)));
    assert!(output.is_none());
    assert_eq!(port_templates(Role::Demux, MediaKind::Audio), (None, None));
}

struct Passthrough;

impl Stage for Passthrough {}

struct PassthroughFactory;

impl StageFactory for PassthroughFactory {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn role(&self) -> Role {
        Role::Filter
    }

    fn create(
        &self,
        _kind: MediaKind,
        _arg: Option<&str>,
        _config: &PipelineConfig,
    ) -> Result<Box<dyn Stage>, StageFault> {
        Ok(Box::new(Passthrough))
    }
}

#[test]
fn default_stage_accepts_everything_and_has_no_properties() {
    let config = PipelineConfig::software_only();
    let arbiter: Arc<DeviceArbiter> = DeviceArbiter::new();
    let ctx = StageContext {
        session: SessionId(1),
        config: &config,
        arbiter: &arbiter,
        surface: None,
    };

    let factory = PassthroughFactory;
    assert!(factory.supports(MediaKind::Video));
    assert!(factory.is_available(&config));

    let mut stage = factory.create(MediaKind::Audio, None, &config).unwrap();
    assert_eq!(
        stage.change_state(StageState::Null, StageState::Ready, &ctx),
        Ok(StateChange::Complete)
    );
    assert!(stage.accepts(&Caps::compressed(Codec::Aac)));
    assert!(!stage.set_property("volume", 0.5));
    assert_eq!(stage.property("volume"), None);
}
