//! Input-forwarding actions over the automation port.

use std::time::{Duration, Instant};

use super::{AutomationError, AutomationPort, ControlRef, Result, WindowRef};

const FOCUS_SETTLE: Duration = Duration::from_millis(100);
const TEXT_SETTLE: Duration = Duration::from_millis(200);

/// Put `text` into the input control and confirm it with Enter.
///
/// Primary strategy sets the control's text value directly; if anything in
/// that path fails, the fallback re-focuses the control and types the text
/// plus Enter as raw keystrokes. Only both failing is an error.
pub async fn set_text_and_confirm(
    port: &dyn AutomationPort,
    window: &WindowRef,
    control: &ControlRef,
    text: &str,
) -> Result<()> {
    let start = Instant::now();

    match set_text_primary(port, window, control, text).await {
        Ok(()) => {
            log::info!(
                "Data input successful to '{}': {} ({:.3}s)",
                control.auto_id,
                text,
                start.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(e1) => {
            log::error!("set_text() method failed: {}, trying raw keystrokes...", e1);
            match type_keys_fallback(port, window, control, text).await {
                Ok(()) => {
                    log::info!(
                        "Keystroke fallback successful: {} ({:.3}s)",
                        text,
                        start.elapsed().as_secs_f64()
                    );
                    Ok(())
                }
                Err(e2) => {
                    log::error!("Keystroke fallback also failed: {}", e2);
                    Err(AutomationError::CallFailed(format!(
                        "set_text failed ({e1}); keystroke fallback failed ({e2})"
                    )))
                }
            }
        }
    }
}

async fn set_text_primary(
    port: &dyn AutomationPort,
    window: &WindowRef,
    control: &ControlRef,
    text: &str,
) -> Result<()> {
    port.focus_window(window)?;
    tokio::time::sleep(FOCUS_SETTLE).await;
    port.set_text(control, text)?;
    tokio::time::sleep(TEXT_SETTLE).await;
    port.send_keys_to_control(control, "{ENTER}")?;
    Ok(())
}

async fn type_keys_fallback(
    port: &dyn AutomationPort,
    window: &WindowRef,
    control: &ControlRef,
    text: &str,
) -> Result<()> {
    port.focus_window(window)?;
    port.focus_control(control)?;
    tokio::time::sleep(FOCUS_SETTLE).await;
    port.send_keys_to_control(control, &format!("{text}{{ENTER}}"))?;
    Ok(())
}
