use super::*;

use crate::config::RoleChain;
use crate::recovery::fault::StageLabel;

fn sink_fault(kind: FaultKind) -> Fault {
    Fault {
        kind,
        stage: Some(StageId(7)),
        label: Some(StageLabel {
            role: Role::Sink,
            kind: Some(MediaKind::Audio),
            entry: "alsasink@hw:0,0".to_owned(),
        }),
        message: "busy".to_owned(),
    }
}

fn config_with_sinks(n: usize) -> PipelineConfig {
    let mut config = PipelineConfig::software_only();
    let entries: Vec<String> = (0..n).map(|i| format!("alsasink@hw:{i},0")).collect();
    let refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    config
        .chains
        .set(RoleChain::new(Role::Sink, Some(MediaKind::Audio), &refs));
    config
}

fn manager(max_attempts: u32) -> RecoveryManager {
    RecoveryManager::new(RecoveryPolicy {
        max_attempts,
        decode_error_threshold: 3,
    })
}

#[test]
fn busy_sink_is_substituted_with_the_next_entry() {
    let config = config_with_sinks(3);
    let mut m = manager(2);
    let action = m.on_fault(&sink_fault(FaultKind::ResourceBusy), Some(0), &config);
    assert_eq!(
        action,
        RecoveryAction::Substitute {
            stage: StageId(7),
            role: Role::Sink,
            kind: MediaKind::Audio,
            start: 1,
            attempt: 1,
        }
    );
    assert_eq!(m.attempts(), 1);
}

#[test]
fn all_busy_fails_after_n_minus_one_swaps() {
    for n in 1..=5usize {
        let config = config_with_sinks(n);
        let mut m = manager(n as u32);
        let mut swaps = 0;
        let mut index = 0;
        loop {
            match m.on_fault(&sink_fault(FaultKind::ResourceBusy), Some(index), &config) {
                RecoveryAction::Substitute { start, .. } => {
                    swaps += 1;
                    index = start;
                }
                RecoveryAction::Fatal(reason) => {
                    assert!(reason.contains("exhausted"), "{reason}");
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(swaps, n - 1, "n = {n}");
    }
}

#[test]
fn retry_cap_is_per_session() {
    let config = config_with_sinks(6);
    let mut m = manager(2);
    assert!(matches!(
        m.on_fault(&sink_fault(FaultKind::ResourceBusy), Some(0), &config),
        RecoveryAction::Substitute { .. }
    ));
    assert!(matches!(
        m.on_fault(&sink_fault(FaultKind::MissingStage), Some(1), &config),
        RecoveryAction::Substitute { .. }
    ));
    let RecoveryAction::Fatal(reason) =
        m.on_fault(&sink_fault(FaultKind::ResourceBusy), Some(2), &config)
    else {
        panic!("third substitution allowed");
    };
    assert!(reason.contains("budget"), "{reason}");
}

#[test]
fn decode_errors_are_tolerated_up_to_the_threshold() {
    let config = PipelineConfig::software_only();
    let mut m = manager(2);
    let mut fault = sink_fault(FaultKind::DecodeError);
    if let Some(label) = fault.label.as_mut() {
        label.role = Role::Decode;
    }
    for count in 1..=3 {
        assert_eq!(
            m.on_fault(&fault, Some(0), &config),
            RecoveryAction::Tolerate { count }
        );
    }
    assert_eq!(
        m.on_fault(&fault, Some(0), &config),
        RecoveryAction::TearDownBranch(MediaKind::Audio)
    );
    assert_eq!(m.decode_errors(MediaKind::Audio), 4);
    assert_eq!(m.decode_errors(MediaKind::Video), 0);
    m.reset_decode_errors();
    assert_eq!(m.decode_errors(MediaKind::Audio), 0);
}

#[test]
fn source_faults_have_no_substitute() {
    let config = PipelineConfig::software_only();
    let mut m = manager(2);
    let fault = Fault {
        kind: FaultKind::MissingStage,
        stage: Some(StageId(0)),
        label: Some(StageLabel {
            role: Role::Source,
            kind: None,
            entry: "urisrc".to_owned(),
        }),
        message: "gone".to_owned(),
    };
    assert!(matches!(m.on_fault(&fault, Some(0), &config), RecoveryAction::Fatal(_)));
    assert_eq!(m.attempts(), 0);
}

#[test]
fn warnings_and_timeouts() {
    let config = PipelineConfig::software_only();
    let mut m = manager(2);
    assert_eq!(
        m.on_fault(&Fault::session(FaultKind::Warning, "x"), None, &config),
        RecoveryAction::Report
    );
    assert!(matches!(
        m.on_fault(&Fault::session(FaultKind::TransitionTimeout, "x"), None, &config),
        RecoveryAction::Fatal(_)
    ));
}
