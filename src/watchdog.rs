//! Auto-stop supervisor.
//!
//! Polls session snapshots on a fixed interval and forces teardown on
//! prolonged inactivity, repeated errors, or sustained loss of either side of
//! the bridge. It never touches live counters; it only reads published
//! snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::session::{BridgeSession, SessionState};

/// Thresholds are owned by the hosting caller, not by the session; they are
/// ordinary configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Disconnects are not counted during the first seconds after start, to
    /// allow connections to settle.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Stop when no data has arrived for this long.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,

    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Consecutive disconnect observations tolerated per side before
    /// stopping.
    #[serde(default = "default_max_disconnect_tolerance")]
    pub max_disconnect_tolerance: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_idle_timeout_minutes() -> u64 {
    30
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_max_disconnect_tolerance() -> u32 {
    20
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_secs: default_grace_period_secs(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_disconnect_tolerance: default_max_disconnect_tolerance(),
        }
    }
}

impl WatchdogConfig {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes * 60)
    }
}

/// Why the watchdog run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The session stopped on its own (or was stopped externally).
    SessionEnded,
    Idle,
    ConsecutiveErrors,
    SerialLost,
    TargetLost,
}

pub struct Watchdog {
    session: Arc<BridgeSession>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(session: Arc<BridgeSession>, config: WatchdogConfig) -> Self {
        Self { session, config }
    }

    /// Spawn the polling loop on its own task.
    pub fn spawn(self) -> tokio::task::JoinHandle<StopCause> {
        tokio::spawn(self.run())
    }

    /// Poll until the session ends or a threshold trips. On a trip the
    /// session is stopped with the watchdog-distinguished terminal state.
    pub async fn run(self) -> StopCause {
        let started = Instant::now();
        let mut serial_disconnects: u32 = 0;
        let mut target_disconnects: u32 = 0;

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;

            let snap = self.session.snapshot();
            // The worker may not have published its first status yet.
            if snap.state == SessionState::Starting {
                continue;
            }
            if !snap.state.is_active() {
                return StopCause::SessionEnded;
            }

            if snap.counters.consecutive_errors >= self.config.max_consecutive_errors {
                log::error!(
                    "AUTO-STOP: too many consecutive errors ({})",
                    snap.counters.consecutive_errors
                );
                let _ = self.session.stop_for_watchdog().await;
                return StopCause::ConsecutiveErrors;
            }

            if started.elapsed() < self.config.grace_period() {
                continue;
            }

            match self.count_disconnect(
                "Serial port",
                snap.serial_connected,
                &mut serial_disconnects,
            ) {
                Escalation::Stop => {
                    let _ = self.session.stop_for_watchdog().await;
                    return StopCause::SerialLost;
                }
                Escalation::None => {}
            }

            match self.count_disconnect(
                "Target application",
                snap.target_connected,
                &mut target_disconnects,
            ) {
                Escalation::Stop => {
                    let _ = self.session.stop_for_watchdog().await;
                    return StopCause::TargetLost;
                }
                Escalation::None => {}
            }

            if let Some(last) = snap.last_message_at {
                let idle = elapsed_since(last);
                if idle > self.config.idle_timeout() {
                    log::warn!(
                        "AUTO-STOP: no data received for {} minutes",
                        self.config.idle_timeout_minutes
                    );
                    let _ = self.session.stop_for_watchdog().await;
                    return StopCause::Idle;
                }
            }
        }
    }

    fn count_disconnect(&self, side: &str, connected: bool, count: &mut u32) -> Escalation {
        if connected {
            if *count > 0 {
                log::info!("{} reconnected (reset counter)", side);
            }
            *count = 0;
            return Escalation::None;
        }

        *count += 1;
        if *count >= self.config.max_disconnect_tolerance {
            log::error!(
                "{} disconnected ({} times) - stopping session",
                side,
                count
            );
            Escalation::Stop
        } else {
            log::warn!(
                "{} disconnect detected ({}/{})",
                side,
                count,
                self.config.max_disconnect_tolerance
            );
            Escalation::None
        }
    }
}

enum Escalation {
    None,
    Stop,
}

fn elapsed_since(since: chrono::DateTime<chrono::Utc>) -> Duration {
    (chrono::Utc::now() - since).to_std().unwrap_or_default()
}
