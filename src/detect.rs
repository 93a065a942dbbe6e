//! Result detection: decide OK/NG by inspecting the target's UI after a
//! forwarded message.
//!
//! This is a heuristic over foreign, unowned UI state. Strategies run top to
//! bottom and the first positive match wins; no match anywhere reads as OK.

use serde::{Deserialize, Serialize};

use crate::automation::{AutomationError, AutomationPort, TargetHandle};

/// Accept/reject classification echoed back over the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Ok,
    Ng,
}

/// Detection heuristics are coupled to one application's visual layout, so
/// they are configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Well-known error-label control; visible means NG.
    #[serde(default = "default_error_label_id")]
    pub error_label_id: String,

    /// Substring that marks a reject indicator.
    #[serde(default = "default_ng_token")]
    pub ng_token: String,

    /// Minimum size for a child control to count as the reject popup. Filters
    /// out incidental token substrings in small unrelated labels.
    #[serde(default = "default_min_popup_width")]
    pub min_popup_width: u32,

    #[serde(default = "default_min_popup_height")]
    pub min_popup_height: u32,
}

fn default_error_label_id() -> String {
    "lblError".to_string()
}

fn default_ng_token() -> String {
    "NG".to_string()
}

fn default_min_popup_width() -> u32 {
    200
}

fn default_min_popup_height() -> u32 {
    200
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            error_label_id: default_error_label_id(),
            ng_token: default_ng_token(),
            min_popup_width: default_min_popup_width(),
            min_popup_height: default_min_popup_height(),
        }
    }
}

pub struct ResultDetector {
    config: DetectorConfig,
}

impl ResultDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Inspect the target for a reject indicator. Never errors: if the
    /// inspection itself fails, the failure text is classified by keyword.
    pub fn detect(&self, port: &dyn AutomationPort, target: &TargetHandle) -> Verdict {
        let mut probe_error: Option<AutomationError> = None;

        match self.error_label_visible(port, target) {
            Ok(true) => {
                log::warn!(
                    "{} popup detected - sending NG",
                    self.config.error_label_id
                );
                return Verdict::Ng;
            }
            Ok(false) => {}
            Err(e) => probe_error = Some(e),
        }

        match self.large_child_with_token(port, target) {
            Ok(Some((text, bounds))) => {
                log::warn!(
                    "NG popup detected (text='{}', size={}x{}) - sending NG",
                    text,
                    bounds.0,
                    bounds.1
                );
                return Verdict::Ng;
            }
            Ok(None) => {}
            Err(e) => probe_error = Some(e),
        }

        match self.descendant_with_token(port, target) {
            Ok(Some(text)) => {
                log::warn!("NG control detected: {}", text);
                return Verdict::Ng;
            }
            Ok(None) => {}
            Err(e) => probe_error = Some(e),
        }

        match probe_error {
            Some(e) => classify_probe_failure(&e),
            None => {
                log::info!("No NG indicators found - sending OK");
                Verdict::Ok
            }
        }
    }

    fn error_label_visible(
        &self,
        port: &dyn AutomationPort,
        target: &TargetHandle,
    ) -> Result<bool, AutomationError> {
        match port.find_child(&target.window, &self.config.error_label_id)? {
            Some(control) => port.is_control_visible(&control),
            None => Ok(false),
        }
    }

    fn large_child_with_token(
        &self,
        port: &dyn AutomationPort,
        target: &TargetHandle,
    ) -> Result<Option<(String, (u32, u32))>, AutomationError> {
        let children = port.child_controls(&target.window)?;
        for child in children {
            if child.visible
                && child.text.contains(&self.config.ng_token)
                && child.bounds.width > self.config.min_popup_width
                && child.bounds.height > self.config.min_popup_height
            {
                return Ok(Some((
                    child.text,
                    (child.bounds.width, child.bounds.height),
                )));
            }
        }
        Ok(None)
    }

    fn descendant_with_token(
        &self,
        port: &dyn AutomationPort,
        target: &TargetHandle,
    ) -> Result<Option<String>, AutomationError> {
        let descendants = port.descendant_controls(&target.window)?;
        Ok(descendants
            .into_iter()
            .find(|c| c.visible && c.text.contains(&self.config.ng_token))
            .map(|c| c.text))
    }
}

/// Last resort: the probe itself failed, so read the failure message for
/// reject keywords instead of guessing blindly.
fn classify_probe_failure(err: &AutomationError) -> Verdict {
    let message = err.message().to_lowercase();
    if ["ng", "error", "fail"].iter().any(|kw| message.contains(kw)) {
        log::warn!("Inspection failure suggests NG: {}", err);
        Verdict::Ng
    } else {
        log::info!("Cannot determine status (assuming OK): {}", err);
        Verdict::Ok
    }
}
