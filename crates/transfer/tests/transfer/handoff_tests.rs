use super::*;

fn session() -> SessionInfo {
    SessionInfo {
        host: "192.168.1.20".to_string(),
        port: 50123,
        session_token: "0123456789abcdef0123456789abcdef".to_string(),
        device_name: "Pixel".to_string(),
    }
}

#[test]
fn unsupported_handoff_should_accept_calls_without_events() {
    let handoff = UnsupportedTapHandoff;
    assert!(!handoff.is_supported());
    handoff
        .set_push_payload(Some(&session()))
        .expect("set payload");
    handoff.enable_foreground_dispatch().expect("enable");
    handoff.disable_foreground_dispatch().expect("disable");
    assert!(handoff.tap_events().is_none());
}
