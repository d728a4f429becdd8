use super::*;

use std::time::Duration;

const ALL: [SessionState; 6] = [
    SessionState::Idle,
    SessionState::Ready,
    SessionState::Paused,
    SessionState::Playing,
    SessionState::Error,
    SessionState::Stopped,
];

#[test]
fn play_is_refused_only_before_the_graph_exists() {
    for state in ALL {
        assert_eq!(state.accepts(&Control::Play), state != SessionState::Idle, "{state}");
    }
}

#[test]
fn seek_requires_a_prerolled_graph() {
    let seek = Control::SeekTo(Duration::from_secs(1));
    let accepting: Vec<SessionState> = ALL.into_iter().filter(|s| s.accepts(&seek)).collect();
    assert_eq!(accepting, [SessionState::Paused, SessionState::Playing]);
}

#[test]
fn pause_needs_a_live_graph() {
    assert!(SessionState::Ready.accepts(&Control::Pause));
    assert!(SessionState::Playing.accepts(&Control::Pause));
    assert!(!SessionState::Stopped.accepts(&Control::Pause));
    assert!(!SessionState::Error.accepts(&Control::Pause));
    assert!(!SessionState::Idle.accepts(&Control::Pause));
}

#[test]
fn stop_is_refused_only_when_already_stopped() {
    assert!(SessionState::Error.accepts(&Control::Stop));
    assert!(SessionState::Idle.accepts(&Control::Stop));
    assert!(!SessionState::Stopped.accepts(&Control::Stop));
}

#[test]
fn terminal_states_drop_the_graph() {
    for state in ALL {
        assert_eq!(
            state.needs_rebuild(),
            matches!(state, SessionState::Error | SessionState::Stopped)
        );
        if state.needs_rebuild() {
            assert_eq!(state.stage_state(), StageState::Null);
        }
    }
    assert_eq!(SessionState::Playing.stage_state(), StageState::Playing);
    assert_eq!(SessionState::Paused.stage_state(), StageState::Paused);
}

#[test]
fn serializes_lowercase() {
    let json = serde_json::to_string(&SessionState::Playing).unwrap();
    assert_eq!(json, "\"playing\"");
    assert_eq!(SessionState::Stopped.to_string(), "stopped");
}
