use mes_bridge::automation::fake::{FakeAutomationPort, FakeControl, FakeWindow};
use mes_bridge::automation::{resolve_target, ResolveError, ResolveStrategy};
use mes_bridge::config::BridgeConfig;

fn config_for(title: &str) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.target_app_title = title.to_string();
    config.textbox_auto_id = "SCAN_INPUT".to_string();
    config
}

fn window_with_input(title: &str) -> FakeWindow {
    FakeWindow::new(title).with_child(FakeControl::new("SCAN_INPUT"))
}

#[test]
fn test_exact_title_wins() {
    let port = FakeAutomationPort::new();
    port.add_window(window_with_input("Pack Station"));

    let target = resolve_target(&port, &config_for("Pack Station")).expect("should resolve");
    assert_eq!(target.strategy, ResolveStrategy::ExactTitle);
    assert_eq!(target.window.title, "Pack Station");
    assert_eq!(target.input.auto_id, "SCAN_INPUT");
}

#[test]
fn test_title_pattern_fallback() {
    let port = FakeAutomationPort::new();
    port.add_window(window_with_input("Pack Station - build 1.4.2"));

    let mut config = config_for("Pack Station");
    config.target_title_pattern = Some(r"Pack Station.*build".to_string());

    let target = resolve_target(&port, &config).expect("should resolve via pattern");
    assert_eq!(target.strategy, ResolveStrategy::TitlePattern);
}

#[test]
fn test_process_path_fallback() {
    let port = FakeAutomationPort::new();
    port.add_window(window_with_input("(untitled)").with_process_path("C:\\MES\\PackStation.exe"));

    let mut config = config_for("Pack Station");
    config.target_process_path = Some("C:\\MES\\PackStation.exe".to_string());

    let target = resolve_target(&port, &config).expect("should resolve via process path");
    assert_eq!(target.strategy, ResolveStrategy::ProcessPath);
}

#[test]
fn test_window_scan_fallback() {
    let port = FakeAutomationPort::new();
    port.add_window(FakeWindow::new("Notepad"));
    port.add_window(window_with_input("PACK STATION v2 (line 3)"));

    // Exact title differs, no pattern or path configured: the token scan
    // should still land on the right window.
    let target = resolve_target(&port, &config_for("Pack Station")).expect("should resolve");
    assert_eq!(target.strategy, ResolveStrategy::TitleScan);
    assert_eq!(target.window.title, "PACK STATION v2 (line 3)");
}

#[test]
fn test_exhausted_strategies_report_attempts() {
    let port = FakeAutomationPort::new();
    port.add_window(FakeWindow::new("Notepad"));

    let err = resolve_target(&port, &config_for("Pack Station")).unwrap_err();
    match err {
        ResolveError::WindowNotFound { title, attempted } => {
            assert_eq!(title, "Pack Station");
            assert!(attempted.contains("exact title match"));
            assert!(attempted.contains("top-level window scan"));
        }
        other => panic!("expected WindowNotFound, got {other:?}"),
    }
}

#[test]
fn test_missing_input_control_is_fatal() {
    let port = FakeAutomationPort::new();
    port.add_window(FakeWindow::new("Pack Station"));

    let err = resolve_target(&port, &config_for("Pack Station")).unwrap_err();
    assert!(matches!(err, ResolveError::ControlNotFound { .. }));
}

#[test]
fn test_bad_pattern_is_reported() {
    let port = FakeAutomationPort::new();
    port.add_window(window_with_input("Pack Station"));

    let mut config = config_for("Something Else Entirely XYZZY");
    config.target_title_pattern = Some("(unclosed".to_string());

    let err = resolve_target(&port, &config).unwrap_err();
    assert!(matches!(err, ResolveError::BadPattern(_)));
}
