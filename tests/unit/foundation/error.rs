use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(PlaybackError::probe("x").to_string().contains("probe failure:"));
    assert!(PlaybackError::build("x").to_string().contains("build failure:"));
    assert!(PlaybackError::link("x").to_string().contains("link failure:"));
    assert!(
        PlaybackError::resource_busy("x")
            .to_string()
            .contains("resource busy:")
    );
    assert!(PlaybackError::decode("x").to_string().contains("decode error:"));
    assert!(
        PlaybackError::timeout("x")
            .to_string()
            .contains("transition timeout:")
    );
    assert!(
        PlaybackError::validation("x")
            .to_string()
            .contains("validation error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = PlaybackError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
