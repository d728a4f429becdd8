use super::*;

#[test]
fn second_session_is_refused() {
    let arbiter = DeviceArbiter::new();
    let key = surface_key(SurfaceHandle(7));
    let lease = arbiter.acquire(&key, SessionId(1)).unwrap();
    assert_eq!(lease.key(), "surface:7");

    let err = arbiter.acquire(&key, SessionId(2)).unwrap_err();
    assert!(matches!(err, StageFault::ResourceBusy(_)));

    drop(lease);
    assert!(arbiter.holder(&key).is_none());
    arbiter.acquire(&key, SessionId(2)).unwrap();
}

#[test]
fn same_session_shares_until_last_lease_drops() {
    let arbiter = DeviceArbiter::new();
    let key = alsa_key("hw:0,0");
    let a = arbiter.acquire(&key, SessionId(1)).unwrap();
    let b = arbiter.acquire(&key, SessionId(1)).unwrap();
    drop(a);
    assert_eq!(arbiter.holder(&key), Some(Holder::Session(SessionId(1))));
    drop(b);
    assert!(arbiter.held_keys().is_empty());
}

#[test]
fn external_holders_block_everyone() {
    let arbiter = DeviceArbiter::new();
    let _busy = arbiter.occupy("alsa:default").unwrap();
    assert!(arbiter.occupy("alsa:default").is_err());
    assert!(arbiter.acquire("alsa:default", SessionId(3)).is_err());
    assert_eq!(arbiter.holder("alsa:default"), Some(Holder::External));
}
