//! Scenario tests for the session link
//!
//! These run the real driver task against the in-memory transport from
//! `test_utils`, on a paused tokio clock so reconnect delays and the frame
//! throttle are deterministic.

use super::*;
use crate::test_utils::{MockBackend, MockPeer, fixture_catalog_json, frame_data_json, mock_pair};
use crate::transport::CloseCode;
use crate::types::ReconnectPolicy;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tracing::info;

const STEP_TIMEOUT: Duration = Duration::from_secs(30);

fn test_config(max_attempts: u32, interval_ms: u64, throttle_ms: u64) -> LinkConfig {
    LinkConfig::new("ws://analysis.test:8001")
        .with_reconnect(ReconnectPolicy::new(max_attempts, Duration::from_millis(interval_ms)))
        .with_frame_throttle(Duration::from_millis(throttle_ms))
}

fn mock_link(config: LinkConfig) -> (SessionLink, MockBackend) {
    let (connector, backend) = mock_pair();
    let link = SessionLink::with_connector(config, connector).expect("valid config");
    (link, backend)
}

async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

fn record_states(link: &SessionLink) -> mpsc::UnboundedReceiver<LinkStatus> {
    let (tx, rx) = mpsc::unbounded_channel();
    link.on_state_change(move |status| {
        let _ = tx.send(status.clone());
    });
    rx
}

fn record_messages(link: &SessionLink) -> mpsc::UnboundedReceiver<SessionMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    link.on_message(move |message| {
        let _ = tx.send(message);
    });
    rx
}

fn drain_states(rx: &mut mpsc::UnboundedReceiver<LinkStatus>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(status) = rx.try_recv() {
        states.push(status.state);
    }
    states
}

async fn accept_next(backend: &mut MockBackend) -> MockPeer {
    within("transport open", backend.next_open()).await.expect("connector alive").accept()
}

async fn refuse_next(backend: &mut MockBackend, reason: &str) {
    within("transport open", backend.next_open()).await.expect("connector alive").refuse(reason);
}

async fn next_command(peer: &mut MockPeer) -> Value {
    within("outbound command", peer.next_command()).await.expect("command transmitted")
}

async fn command_type(peer: &mut MockPeer) -> String {
    next_command(peer).await["type"].as_str().unwrap_or_default().to_string()
}

/// Connect, accept the open and consume the initial `get_exercises`.
async fn connected(link: &SessionLink, backend: &mut MockBackend) -> MockPeer {
    link.connect();
    let mut peer = accept_next(backend).await;
    assert_eq!(command_type(&mut peer).await, "get_exercises");
    within("connected", link.wait_for_state(ConnectionState::Connected)).await.unwrap();
    peer
}

#[tokio::test(start_paused = true)]
async fn frames_inside_the_throttle_window_are_dropped() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 3000, 100));
    let mut peer = connected(&link, &mut backend).await;

    // 20 frames over 50ms against a 100ms window.
    for _ in 0..20 {
        link.process_frame("pushups", vec![0xFF, 0xD8, 0xFF, 0xE0]);
        tokio::time::advance(Duration::from_micros(2500)).await;
    }
    link.reset_counter();

    let first = next_command(&mut peer).await;
    assert_eq!(first["type"], "process_frame");
    assert_eq!(first["exercise_type"], "pushups");
    assert_eq!(first["frame"], "/9j/4A==");
    assert_eq!(command_type(&mut peer).await, "reset_counter");

    // Once the window has passed the next frame goes out.
    tokio::time::advance(Duration::from_millis(100)).await;
    link.process_frame("pushups", vec![0xFF, 0xD8]);
    assert_eq!(command_type(&mut peer).await, "process_frame");
}

#[tokio::test(start_paused = true)]
async fn commands_queued_while_disconnected_flush_in_order() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 3000, 100));
    link.start_session("bicep_curls");
    link.reset_counter();
    link.connect();

    let mut peer = accept_next(&mut backend).await;
    assert_eq!(
        next_command(&mut peer).await,
        json!({"type": "start_session", "exercise_type": "bicep_curls"})
    );
    assert_eq!(command_type(&mut peer).await, "reset_counter");
    assert_eq!(command_type(&mut peer).await, "get_exercises");

    link.ping();
    assert_eq!(command_type(&mut peer).await, "ping");
}

#[tokio::test(start_paused = true)]
async fn reconnects_are_bounded_by_max_attempts() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(3, 50, 100));
    let mut states = record_states(&link);
    let peer = connected(&link, &mut backend).await;

    peer.close(CloseCode::ABNORMAL, "network lost");
    for attempt in 1..=3 {
        info!("Refusing reconnect attempt {}", attempt);
        refuse_next(&mut backend, "connection refused").await;
    }

    let gave_up = |s: &LinkStatus| {
        s.state == ConnectionState::Disconnected && s.attempts_made == 3 && !s.reconnect_pending
    };
    within("give up", link.wait_for(gave_up)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(backend.try_next_open().is_none(), "no attempts after the budget is spent");

    let seen = drain_states(&mut states);
    let reentries = seen.iter().skip(1).filter(|s| **s == ConnectionState::Connecting).count();
    assert_eq!(reentries, 3, "{seen:?}");
    assert_eq!(seen.last(), Some(&ConnectionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn reconnect_waits_for_the_interval() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 3000, 100));
    let peer = connected(&link, &mut backend).await;

    peer.close(CloseCode::GOING_AWAY, "server restart");
    let pending = within("reconnect armed", link.wait_for(|s| s.reconnect_pending)).await.unwrap();
    assert_eq!(pending.state, ConnectionState::Disconnected);
    assert_eq!(pending.attempts_made, 1);

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert!(backend.try_next_open().is_none());

    let mut peer = accept_next(&mut backend).await;
    assert_eq!(command_type(&mut peer).await, "get_exercises");
    let status = within("reconnected", link.wait_for_state(ConnectionState::Connected)).await.unwrap();
    assert_eq!(status.attempts_made, 0);
}

#[tokio::test(start_paused = true)]
async fn normal_close_does_not_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let peer = connected(&link, &mut backend).await;

    peer.close(CloseCode::NORMAL, "session over");
    within("disconnected", link.wait_for_state(ConnectionState::Disconnected)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
    assert!(!link.status().reconnect_pending);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_normally_and_suppresses_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let mut peer = connected(&link, &mut backend).await;

    link.disconnect();
    // Arrives after the client already closed.
    peer.close(CloseCode::ABNORMAL, "late");

    assert_eq!(within("close frame", peer.closed_with()).await, Some(CloseCode::NORMAL));
    let status = within("disconnected", link.wait_for_state(ConnectionState::Disconnected)).await.unwrap();
    assert_eq!(status.attempts_made, 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_pending_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let peer = connected(&link, &mut backend).await;

    peer.close(CloseCode::ABNORMAL, "network lost");
    within("reconnect armed", link.wait_for(|s| s.reconnect_pending)).await.unwrap();

    link.disconnect();
    let status = within("cancelled", link.wait_for(|s| !s.reconnect_pending)).await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.attempts_made, 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
}

#[tokio::test(start_paused = true)]
async fn undecodable_and_unknown_messages_are_not_dispatched() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 3000, 100));
    let mut messages = record_messages(&link);
    let mut states = record_states(&link);
    let peer = connected(&link, &mut backend).await;
    drain_states(&mut states);

    peer.push_text("this is not json");
    peer.push_text(r#"{"reps": 4}"#);
    peer.push_json(&json!({"type": "heartbeat", "seq": 1}));
    peer.push_json(&json!({"type": "frame_data", "frame": "***"}));
    peer.push_json(&json!({"type": "pong"}));

    let first = within("first dispatched message", messages.recv()).await;
    assert_eq!(first, Some(SessionMessage::Pong));
    assert!(messages.try_recv().is_err());
    assert!(drain_states(&mut states).is_empty());
    assert_eq!(link.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn exercise_catalog_round_trip() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 3000, 100));
    let mut messages = record_messages(&link);
    let peer = connected(&link, &mut backend).await;

    peer.push_json(&fixture_catalog_json());
    peer.push_json(&frame_data_json("squats", 2, "down", 1_700_000_000.5));

    let Some(SessionMessage::Exercises { catalog }) = within("catalog", messages.recv()).await else {
        panic!("expected the catalog first");
    };
    let ids: Vec<&str> = catalog.keys().map(ExerciseId::as_str).collect();
    assert_eq!(ids, ["bicep_curls", "pushups", "situps", "squats"]);
    assert_eq!(catalog["pushups"].display_name, "Push-ups");

    let Some(SessionMessage::FrameResult(frame)) = within("frame", messages.recv()).await else {
        panic!("expected a frame result");
    };
    assert_eq!(frame.rep_count, 2);
    assert_eq!(frame.stage, "down");
    assert_eq!(frame.timestamp_ms, 1_700_000_000_500);
}

#[tokio::test(start_paused = true)]
async fn refused_manual_connect_stays_in_error() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    link.connect();
    refuse_next(&mut backend, "connection refused").await;

    let status = within("error", link.wait_for_state(ConnectionState::Error)).await.unwrap();
    assert!(status.last_error.as_deref().is_some_and(|e| e.contains("connection refused")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
    assert_eq!(link.state(), ConnectionState::Error);

    // Only the caller leaves Error.
    link.connect();
    let _peer = accept_next(&mut backend).await;
    let status = within("connected", link.wait_for_state(ConnectionState::Connected)).await.unwrap();
    assert!(status.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn manual_connect_after_giving_up_stays_in_error() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(1, 50, 100));
    let peer = connected(&link, &mut backend).await;

    peer.close(CloseCode::ABNORMAL, "network lost");
    refuse_next(&mut backend, "connection refused").await;
    let gave_up = |s: &LinkStatus| {
        s.state == ConnectionState::Disconnected && s.attempts_made == 1 && !s.reconnect_pending
    };
    within("give up", link.wait_for(gave_up)).await.unwrap();

    link.connect();
    refuse_next(&mut backend, "still refused").await;
    let status = within("error", link.wait_for_state(ConnectionState::Error)).await.unwrap();
    assert!(!status.reconnect_pending);
    assert!(status.last_error.as_deref().is_some_and(|e| e.contains("still refused")));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
    assert_eq!(link.state(), ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_keeps_unsent_commands_for_the_next_connect() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let mut states = record_states(&link);
    link.start_session("squats");
    link.reset_counter();
    link.connect();

    // The first queued command goes out, the write of the second one fails.
    let pending = within("transport open", backend.next_open()).await.expect("connector alive");
    let mut peer = pending.accept_with_send_budget(1);
    assert_eq!(command_type(&mut peer).await, "start_session");

    let status = within("error", link.wait_for_state(ConnectionState::Error)).await.unwrap();
    assert!(status.last_error.as_deref().is_some_and(|e| e.contains("mock write failed")));
    assert_eq!(
        drain_states(&mut states),
        [ConnectionState::Connecting, ConnectionState::Error],
        "Connected must not be reported for a flush that failed"
    );

    link.connect();
    let mut peer = accept_next(&mut backend).await;
    assert_eq!(command_type(&mut peer).await, "reset_counter");
    assert_eq!(command_type(&mut peer).await, "get_exercises");
}

#[tokio::test(start_paused = true)]
async fn transport_failure_while_connected_enters_error() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let mut messages = record_messages(&link);
    let peer = connected(&link, &mut backend).await;

    peer.fail("TLS alert");
    let status = within("error", link.wait_for_state(ConnectionState::Error)).await.unwrap();
    assert_eq!(status.last_error.as_deref(), Some("TLS alert"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());
    // Transport failures are state changes, not messages.
    assert!(messages.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn connect_while_connecting_opens_one_transport() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    link.connect();
    link.connect();
    let _peer = accept_next(&mut backend).await;
    within("connected", link.wait_for_state(ConnectionState::Connected)).await.unwrap();
    link.connect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(backend.try_next_open().is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_link_closes_the_transport() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let mut peer = connected(&link, &mut backend).await;

    drop(link);
    assert_eq!(within("close frame", peer.closed_with()).await, Some(CloseCode::NORMAL));
}

#[tokio::test(start_paused = true)]
async fn state_changes_stream_starts_with_current_status() {
    use futures::StreamExt;

    let (link, mut backend) = mock_link(test_config(5, 50, 100));
    let mut changes = Box::pin(link.state_changes());
    let initial = within("initial", changes.next()).await.map(|s| s.state);
    assert_eq!(initial, Some(ConnectionState::Disconnected));

    let _peer = connected(&link, &mut backend).await;
    let update = within("update", changes.next()).await.map(|s| s.state);
    assert_eq!(update, Some(ConnectionState::Connected));
}

#[tokio::test(start_paused = true)]
async fn endpoint_placeholder_must_be_resolved() {
    let template = LinkConfig::new("ws://analysis.test/ws/exercise/{exercise}");
    let (connector, _backend) = mock_pair();
    assert!(matches!(
        SessionLink::with_connector(template.clone(), connector),
        Err(LinkError::Config { .. })
    ));

    let (link, mut backend) = mock_link(template.for_exercise(&ExerciseId::from("situps")));
    link.connect();
    let pending = within("open", backend.next_open()).await.unwrap();
    assert_eq!(pending.endpoint(), "ws://analysis.test/ws/exercise/situps");
}

#[tokio::test(start_paused = true)]
async fn end_to_end_session_with_bounded_reconnect() {
    let _ = tracing_subscriber::fmt::try_init();

    let (link, mut backend) = mock_link(test_config(2, 50, 10));
    let mut states = record_states(&link);

    link.start_session("bicep_curls");
    link.connect();

    let pending = within("open", backend.next_open()).await.unwrap();
    assert_eq!(link.state(), ConnectionState::Connecting);
    let mut peer = pending.accept();

    assert_eq!(command_type(&mut peer).await, "start_session");
    assert_eq!(command_type(&mut peer).await, "get_exercises");

    peer.close(CloseCode::ABNORMAL, "network lost");
    refuse_next(&mut backend, "connection refused").await;
    refuse_next(&mut backend, "connection refused").await;

    let gave_up = |s: &LinkStatus| {
        s.state == ConnectionState::Disconnected && s.attempts_made == 2 && !s.reconnect_pending
    };
    within("give up", link.wait_for(gave_up)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(backend.try_next_open().is_none());

    let seen = drain_states(&mut states);
    let reentries = seen.iter().skip(1).filter(|s| **s == ConnectionState::Connecting).count();
    assert_eq!(reentries, 2, "{seen:?}");
}
