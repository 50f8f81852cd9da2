//! TypeScript Generation Tests
//!
//! Validates that the session types a Tauri host hands to its webview can be
//! exported to TypeScript when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    fn assert_type<T: Type>() {}

    // Lifecycle
    assert_type::<sessionlink::ConnectionState>();
    assert_type::<sessionlink::LinkStatus>();
    assert_type::<sessionlink::ReconnectPolicy>();
    assert_type::<sessionlink::LinkConfig>();

    // Protocol
    assert_type::<sessionlink::ExerciseId>();
    assert_type::<sessionlink::ExerciseDescriptor>();
    assert_type::<sessionlink::PostureState>();
    assert_type::<sessionlink::FrameResult>();
    assert_type::<sessionlink::SessionMessage>();
    assert_type::<sessionlink::OutboundCommand>();
    assert_type::<sessionlink::Feedback>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still build without specta::Type.
    let _ = sessionlink::ConnectionState::Disconnected;
    let _ = sessionlink::PostureState::default();
}
