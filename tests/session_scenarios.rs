//! End-to-end session scenarios over scripted serial and automation fakes.

use std::sync::Arc;
use std::time::Duration;

use mes_bridge::automation::fake::{FakeAction, FakeAutomationPort, FakeControl, FakeWindow};
use mes_bridge::config::BridgeConfig;
use mes_bridge::serial::FakeLink;
use mes_bridge::session::{BridgeError, BridgeSnapshot, SessionState};
use mes_bridge::BridgeSession;

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.target_app_title = "Pack Station".to_string();
    config.textbox_auto_id = "SCAN_INPUT".to_string();
    config
}

fn target_window() -> FakeWindow {
    FakeWindow::new("Pack Station").with_child(FakeControl::new("SCAN_INPUT"))
}

/// Poll published snapshots until the predicate holds. Time is paused in
/// these tests, so the sleeps only advance the virtual clock.
async fn wait_until(
    session: &BridgeSession,
    pred: impl Fn(&BridgeSnapshot) -> bool,
) -> BridgeSnapshot {
    for _ in 0..400 {
        let snap = session.snapshot();
        if pred(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached, last snapshot: {:?}", session.snapshot());
}

#[tokio::test(start_paused = true)]
async fn test_framed_message_is_forwarded_and_acknowledged() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    let (link, recorder) = FakeLink::new(vec!["STXA01;A02ETX"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    let snap = wait_until(&session, |s| s.counters.ok_sent == 1).await;
    assert_eq!(snap.counters.messages, 1);
    assert_eq!(snap.counters.errors, 0);
    assert_eq!(snap.state, SessionState::Running);

    session.stop().await.unwrap();

    assert_eq!(recorder.tokens(), vec!["OK\n"]);
    let actions = port.actions();
    assert!(actions.contains(&FakeAction::SetText {
        auto_id: "SCAN_INPUT".to_string(),
        text: "A01;A02".to_string(),
    }));
    assert!(actions.contains(&FakeAction::KeysToControl {
        auto_id: "SCAN_INPUT".to_string(),
        keys: "{ENTER}".to_string(),
    }));
    assert_eq!(session.snapshot().state, SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_unframed_message_passes_through() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    let (link, recorder) = FakeLink::new(vec!["B-7731"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    wait_until(&session, |s| s.counters.ok_sent == 1).await;
    session.stop().await.unwrap();

    assert_eq!(recorder.tokens(), vec!["OK\n"]);
    assert!(port.actions().contains(&FakeAction::SetText {
        auto_id: "SCAN_INPUT".to_string(),
        text: "B-7731".to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn test_reset_command_drives_shortcuts_without_reply() {
    let port = Arc::new(FakeAutomationPort::new());
    let handle = port.add_window(target_window());
    let (link, recorder) = FakeLink::new(vec!["reset"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    wait_until(&session, |s| s.counters.messages == 1).await;
    session.stop().await.unwrap();

    let actions = port.actions();
    assert!(actions.contains(&FakeAction::FocusWindow(handle)));
    assert!(actions.contains(&FakeAction::KeysToWindow {
        handle,
        keys: "%c".to_string(),
    }));
    assert!(actions.contains(&FakeAction::KeysToWindow {
        handle,
        keys: "%r".to_string(),
    }));
    // No verdict and no text input for a reset command.
    assert!(recorder.tokens().is_empty());
    assert!(!actions
        .iter()
        .any(|a| matches!(a, FakeAction::SetText { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_auto_reset_runs_before_forwarding() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    let (link, _recorder) = FakeLink::new(vec!["B99"]);

    let mut config = test_config();
    config.auto_reset = true;
    let session = BridgeSession::new(config, port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    wait_until(&session, |s| s.counters.ok_sent == 1).await;
    session.stop().await.unwrap();

    let actions = port.actions();
    let first_keys = actions
        .iter()
        .position(|a| matches!(a, FakeAction::KeysToWindow { .. }))
        .expect("reset shortcuts should have been sent");
    let set_text = actions
        .iter()
        .position(|a| matches!(a, FakeAction::SetText { .. }))
        .expect("payload should have been forwarded");
    assert!(first_keys < set_text, "reset must precede forwarding");
}

#[tokio::test(start_paused = true)]
async fn test_ng_verdict_on_visible_error_label() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window().with_child(FakeControl::new("lblError").with_text("!")));
    let (link, recorder) = FakeLink::new(vec!["C42"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    let snap = wait_until(&session, |s| s.counters.messages == 1 && !recorder.tokens().is_empty())
        .await;
    session.stop().await.unwrap();

    assert_eq!(recorder.tokens(), vec!["NG\n"]);
    assert_eq!(snap.counters.ok_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_without_serial_link() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(None).await.unwrap();

    let snap = wait_until(&session, |s| s.state == SessionState::Degraded).await;
    assert!(!snap.serial_connected);
    assert!(snap.target_connected);

    session.stop().await.unwrap();
    assert_eq!(session.snapshot().state, SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_forwarding_failures_are_counted_without_reply() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    port.fail_set_text("set_text timed out");
    port.fail_keystrokes("keystroke injection rejected");
    let (link, recorder) = FakeLink::new(vec!["M1", "M2", "M3"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    let snap = wait_until(&session, |s| s.counters.consecutive_errors == 3).await;
    assert_eq!(snap.counters.messages, 3);
    assert_eq!(snap.counters.errors, 3);
    assert_eq!(snap.counters.ok_sent, 0);
    // The outcome is unknown, so nothing is echoed back.
    assert!(recorder.tokens().is_empty());
    assert!(!snap.privilege_warning);
    assert_eq!(snap.state, SessionState::Running);

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_error_run_resets_only_after_a_delivered_verdict() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    port.fail_set_text("set_text timed out");
    port.fail_keystrokes("keystroke injection rejected");
    let (link, recorder) = FakeLink::new(vec!["M1", "M2"]);
    let feeder = link.feeder();

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    // The run length accumulates across failed forwards.
    let snap = wait_until(&session, |s| s.counters.consecutive_errors == 2).await;
    assert_eq!(snap.counters.errors, 2);

    // Once the target recovers and a verdict is delivered, the run is over.
    port.clear_failures();
    feeder.push("M3");
    let snap = wait_until(&session, |s| s.counters.ok_sent == 1).await;
    assert_eq!(snap.counters.consecutive_errors, 0);
    assert_eq!(snap.counters.errors, 2);
    assert_eq!(recorder.tokens(), vec!["OK\n"]);

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_access_denied_failure_raises_privilege_warning() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    port.fail_set_text("[WinError 5] Access is denied.");
    port.fail_keystrokes("[WinError 5] Access is denied.");
    let (link, _recorder) = FakeLink::new(vec!["D17"]);

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    let snap = wait_until(&session, |s| s.privilege_warning).await;
    assert_eq!(snap.counters.errors, 1);

    session.stop().await.unwrap();
    // The warning survives into the terminal snapshot.
    assert!(session.snapshot().privilege_warning);
}

#[tokio::test(start_paused = true)]
async fn test_verdict_write_failure_is_counted() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    let (link, recorder) = FakeLink::new(vec!["E5"]);
    let link = link.fail_writes();

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();

    let snap = wait_until(&session, |s| s.counters.errors == 1).await;
    assert_eq!(snap.counters.messages, 1);
    assert_eq!(snap.counters.ok_sent, 0);
    assert!(recorder.tokens().is_empty());

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_lifecycle() {
    let port = Arc::new(FakeAutomationPort::new());
    port.add_window(target_window());
    let (link, _recorder) = FakeLink::new(Vec::<String>::new());

    let session = BridgeSession::new(test_config(), port.clone());
    session.start_with_link(Some(Box::new(link))).await.unwrap();
    assert!(session.is_running().await);

    // A second start while running is rejected.
    let err = session.start_with_link(None).await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyRunning));

    session.stop().await.unwrap();
    assert!(!session.is_running().await);
    assert_eq!(session.snapshot().state, SessionState::Stopped);

    let err = session.stop().await.unwrap_err();
    assert!(matches!(err, BridgeError::NotRunning));
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_target_is_missing() {
    let port = Arc::new(FakeAutomationPort::new());
    let (link, _recorder) = FakeLink::new(Vec::<String>::new());

    let session = BridgeSession::new(test_config(), port.clone());
    let err = session.start_with_link(Some(Box::new(link))).await.unwrap_err();
    assert!(matches!(err, BridgeError::Resolve(_)));
    assert!(!session.is_running().await);
    assert_eq!(session.snapshot().state, SessionState::Stopped);
}
