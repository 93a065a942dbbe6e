pub mod runner;

pub use runner::BridgeSession;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::automation::{AutomationError, ResolveError};
use crate::config::ConfigError;
use crate::serial::SerialError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Target resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Stopped,
    Starting,
    /// Serial link and target both live; messages flow.
    Running,
    /// Target resolved but the serial link is absent or lost. The automation
    /// side keeps working for diagnosis; verdicts cannot be delivered.
    Degraded,
    /// Terminal variant of Stopped, reached only via supervisor action.
    StoppedByWatchdog,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Degraded)
    }
}

/// Why the worker was asked to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Watchdog,
}

/// Message counters, owned exclusively by the read-loop worker and reset on
/// every (re)start. Supervisors only ever see cloned snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub messages: u64,
    pub ok_sent: u64,
    pub errors: u64,
    pub consecutive_errors: u32,
}

/// Externally observable session status, published over a watch channel.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeSnapshot {
    pub state: SessionState,
    pub serial_connected: bool,
    pub target_connected: bool,
    pub counters: Counters,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Set when an automation failure carried a platform access-denied
    /// signature; the operator should rerun with elevated privileges.
    pub privilege_warning: bool,
}

impl Default for BridgeSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Stopped,
            serial_connected: false,
            target_connected: false,
            counters: Counters::default(),
            last_message_at: None,
            privilege_warning: false,
        }
    }
}

/// Platform "access denied" signature inside an automation failure message.
/// Distinguished so the session can recommend privilege elevation without
/// terminating.
pub fn is_access_denied_signature(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("access is denied")
        || lower.contains("access denied")
        || lower.contains("winerror 5")
}
