//! The bridge session state machine and its read-loop worker.
//!
//! Exactly one worker task runs per session. It exclusively owns the serial
//! link, the resolved target and the counters, and publishes immutable
//! `BridgeSnapshot`s over a watch channel. The hosting caller only issues
//! `start()`/`stop()` and reads snapshots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};

use super::{
    is_access_denied_signature, BridgeError, BridgeSnapshot, Counters, Result, SessionState,
    StopReason,
};
use crate::automation::{resolve_target, set_text_and_confirm, AutomationPort, TargetHandle};
use crate::config::BridgeConfig;
use crate::detect::{ResultDetector, Verdict};
use crate::serial::{unwrap_frame, SerialLink, TransportLink};

/// Reserved payload that triggers the reset sequence instead of forwarding.
/// No OK/NG reply is sent for it.
const RESET_COMMAND: &str = "RESET";

/// Blocking-read budget per loop iteration; also bounds stop latency.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait after an auto-reset before forwarding the pending payload.
const AUTO_RESET_SETTLE: Duration = Duration::from_millis(500);

/// Wait after forwarding so the target can process the input before the
/// verdict is read.
const FORWARD_SETTLE: Duration = Duration::from_millis(1000);

/// Gap between the two reset shortcuts.
const RESET_KEY_GAP: Duration = Duration::from_secs(1);

const RESET_FOCUS_SETTLE: Duration = Duration::from_millis(200);

/// Budget for the per-iteration target liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Bound on waiting for the worker to exit after the stop signal.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct WorkerHandle {
    task: tokio::task::JoinHandle<()>,
    stop_tx: mpsc::Sender<StopReason>,
}

/// Bridges a serial line stream into the target application's input control
/// and echoes the OK/NG verdict back over the link.
pub struct BridgeSession {
    config: BridgeConfig,
    automation: Arc<dyn AutomationPort>,
    publisher: Arc<watch::Sender<BridgeSnapshot>>,
    snapshot_rx: watch::Receiver<BridgeSnapshot>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl BridgeSession {
    pub fn new(config: BridgeConfig, automation: Arc<dyn AutomationPort>) -> Self {
        let (publisher, snapshot_rx) = watch::channel(BridgeSnapshot::default());
        Self {
            config,
            automation,
            publisher: Arc::new(publisher),
            snapshot_rx,
            worker: Mutex::new(None),
        }
    }

    /// Open the serial link from config and start the session.
    ///
    /// A link open failure is logged but does not abort: the session
    /// continues link-less so the operator can still observe target
    /// resolution diagnostics. Target resolution failure does abort.
    pub async fn start(&self) -> Result<()> {
        self.config.validate()?;

        let link: Option<Box<dyn TransportLink>> =
            match SerialLink::open(&self.config.port, self.config.baudrate) {
                Ok(link) => Some(Box::new(link)),
                Err(e) => {
                    log::warn!(
                        "Serial connection failed ({}), continuing without serial to test target connection",
                        e
                    );
                    None
                }
            };

        self.start_with_link(link).await
    }

    /// Start the session over an already-constructed transport (or none).
    pub async fn start_with_link(&self, link: Option<Box<dyn TransportLink>>) -> Result<()> {
        let mut worker_guard = self.worker.lock().await;
        if worker_guard.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }

        let _ = self.publisher.send(BridgeSnapshot {
            state: SessionState::Starting,
            serial_connected: link.as_ref().map(|l| l.is_open()).unwrap_or(false),
            ..BridgeSnapshot::default()
        });

        log::info!(
            "Trying to connect to application with title: '{}'",
            self.config.target_app_title
        );
        let target = match resolve_target(self.automation.as_ref(), &self.config) {
            Ok(target) => target,
            Err(e) => {
                log::error!("Target connection failed: {}", e);
                let _ = self.publisher.send(BridgeSnapshot::default());
                return Err(e.into());
            }
        };

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let worker = Worker {
            link,
            target,
            automation: Arc::clone(&self.automation),
            detector: ResultDetector::new(self.config.detector.clone()),
            auto_reset: self.config.auto_reset,
            reset_primary: self.config.reset_shortcut_primary.clone(),
            reset_secondary: self.config.reset_shortcut_secondary.clone(),
            publisher: Arc::clone(&self.publisher),
        };
        let task = tokio::spawn(worker.run(stop_rx));

        *worker_guard = Some(WorkerHandle { task, stop_tx });
        log::info!("Background read loop started");
        Ok(())
    }

    /// Stop the session cooperatively. Returns within roughly one read
    /// timeout plus the join bound.
    pub async fn stop(&self) -> Result<()> {
        self.stop_with(StopReason::Requested).await
    }

    /// Supervisor-initiated stop; the terminal state records the escalation.
    pub async fn stop_for_watchdog(&self) -> Result<()> {
        self.stop_with(StopReason::Watchdog).await
    }

    async fn stop_with(&self, reason: StopReason) -> Result<()> {
        let handle = {
            let mut worker_guard = self.worker.lock().await;
            worker_guard.take().ok_or(BridgeError::NotRunning)?
        };

        let _ = handle.stop_tx.send(reason).await;
        if tokio::time::timeout(STOP_JOIN_TIMEOUT, handle.task)
            .await
            .is_err()
        {
            log::warn!("Read loop did not exit within {:?}", STOP_JOIN_TIMEOUT);
        }
        log::info!("Session stopped ({:?})", reason);
        Ok(())
    }

    /// Latest published status.
    pub fn snapshot(&self) -> BridgeSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver for status-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<BridgeSnapshot> {
        self.snapshot_rx.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

/// Everything the read-loop worker exclusively owns.
struct Worker {
    link: Option<Box<dyn TransportLink>>,
    target: TargetHandle,
    automation: Arc<dyn AutomationPort>,
    detector: ResultDetector,
    auto_reset: bool,
    reset_primary: String,
    reset_secondary: String,
    publisher: Arc<watch::Sender<BridgeSnapshot>>,
}

impl Worker {
    async fn run(mut self, mut stop_rx: mpsc::Receiver<StopReason>) {
        let mut counters = Counters::default();
        // Idle time counts from session start until the first message.
        let mut last_message_at: Option<DateTime<Utc>> = Some(Utc::now());
        let mut privilege_warning = false;

        if self.link.is_none() {
            log::warn!("Running degraded: no serial link, verdicts cannot be delivered");
        }

        let reason = loop {
            self.publish(&counters, last_message_at, privilege_warning);

            tokio::select! {
                maybe_reason = stop_rx.recv() => {
                    break maybe_reason.unwrap_or(StopReason::Requested);
                }
                read_result = Self::read_step(&mut self.link) => {
                    match read_result {
                        Ok(Some(line)) => {
                            counters.messages += 1;
                            last_message_at = Some(Utc::now());
                            log::info!("Raw serial data received: {}", line);
                            self.handle_line(&line, &mut counters, &mut privilege_warning)
                                .await;
                        }
                        Ok(None) => log::debug!("No data, timeout"),
                        Err(e) => {
                            log::error!("Data read error: {}", e);
                            counters.errors += 1;
                            counters.consecutive_errors += 1;
                            // Avoid a tight error loop if the device vanished.
                            tokio::time::sleep(READ_TIMEOUT).await;
                        }
                    }
                }
            }
        };

        if let Some(link) = self.link.as_mut() {
            link.close();
        }

        let final_state = match reason {
            StopReason::Requested => SessionState::Stopped,
            StopReason::Watchdog => SessionState::StoppedByWatchdog,
        };
        let _ = self.publisher.send(BridgeSnapshot {
            state: final_state,
            serial_connected: false,
            target_connected: false,
            counters,
            last_message_at,
            privilege_warning,
        });
        log::info!("Read loop exited ({:?})", final_state);
    }

    /// One bounded read. With no link the iteration just sleeps so liveness
    /// probing and stop handling keep their cadence.
    async fn read_step(
        link: &mut Option<Box<dyn TransportLink>>,
    ) -> crate::serial::Result<Option<String>> {
        match link {
            Some(link) => link.read_line(READ_TIMEOUT).await,
            None => {
                tokio::time::sleep(READ_TIMEOUT).await;
                Ok(None)
            }
        }
    }

    fn publish(
        &self,
        counters: &Counters,
        last_message_at: Option<DateTime<Utc>>,
        privilege_warning: bool,
    ) {
        let serial_connected = self.link.as_ref().map(|l| l.is_open()).unwrap_or(false);
        let target_connected = self
            .automation
            .window_exists(&self.target.window, PROBE_TIMEOUT);
        let state = if serial_connected {
            SessionState::Running
        } else {
            SessionState::Degraded
        };

        let _ = self.publisher.send(BridgeSnapshot {
            state,
            serial_connected,
            target_connected,
            counters: counters.clone(),
            last_message_at,
            privilege_warning,
        });
    }

    async fn handle_line(
        &mut self,
        line: &str,
        counters: &mut Counters,
        privilege_warning: &mut bool,
    ) {
        let payload = unwrap_frame(line).to_string();

        if payload.eq_ignore_ascii_case(RESET_COMMAND) {
            log::info!("RESET command received from serial");
            let start = Instant::now();
            if let Err(e) = self.perform_reset().await {
                log::error!("Reset sequence error: {}", e);
            } else {
                log::info!(
                    "Reset completed (time: {:.3}s)",
                    start.elapsed().as_secs_f64()
                );
            }
            return;
        }

        self.forward(&payload, counters, privilege_warning).await;
    }

    async fn forward(
        &mut self,
        payload: &str,
        counters: &mut Counters,
        privilege_warning: &mut bool,
    ) {
        if self.auto_reset {
            log::info!("Auto reset enabled - resetting before sending data");
            if let Err(e) = self.perform_reset().await {
                log::error!("Auto reset error: {}", e);
            }
            tokio::time::sleep(AUTO_RESET_SETTLE).await;
        }

        let start = Instant::now();
        match set_text_and_confirm(
            self.automation.as_ref(),
            &self.target.window,
            &self.target.input,
            payload,
        )
        .await
        {
            Ok(()) => {
                log::info!(
                    "Input completed (input time: {:.3}s)",
                    start.elapsed().as_secs_f64()
                );
                // Give the target time to process before reading the verdict.
                tokio::time::sleep(FORWARD_SETTLE).await;
                let verdict = self.detector.detect(self.automation.as_ref(), &self.target);
                self.send_verdict(verdict, counters).await;
            }
            Err(e) => {
                log::error!("Input forwarding error: {}", e);
                if is_access_denied_signature(e.message()) {
                    log::error!("Automation access denied - please run with elevated privileges");
                    *privilege_warning = true;
                }
                counters.errors += 1;
                counters.consecutive_errors += 1;
                // Outcome is ambiguous; send nothing rather than guess.
            }
        }
    }

    async fn send_verdict(&mut self, verdict: Verdict, counters: &mut Counters) {
        let token: &[u8] = match verdict {
            Verdict::Ok => b"OK\n",
            Verdict::Ng => b"NG\n",
        };
        let name = if verdict == Verdict::Ok { "OK" } else { "NG" };

        match self.link.as_mut() {
            Some(link) => match link.write_token(token).await {
                Ok(_) => {
                    if verdict == Verdict::Ok {
                        counters.ok_sent += 1;
                    }
                    // The message made it all the way through; the error run
                    // is over.
                    counters.consecutive_errors = 0;
                }
                Err(e) => {
                    log::error!("{} transmission error: {}", name, e);
                    counters.errors += 1;
                    counters.consecutive_errors += 1;
                }
            },
            None => log::error!("{} transmission failed - no serial connection", name),
        }
    }

    /// Reset the target screen with the two configured shortcuts. Failures
    /// are propagated to the caller for logging but never crash the loop.
    async fn perform_reset(&mut self) -> crate::automation::Result<()> {
        self.automation.focus_window(&self.target.window)?;
        tokio::time::sleep(RESET_FOCUS_SETTLE).await;

        log::info!("Pressing {}...", self.reset_primary);
        self.automation
            .send_keys_to_window(&self.target.window, &self.reset_primary)?;
        tokio::time::sleep(RESET_KEY_GAP).await;

        log::info!("Pressing {}...", self.reset_secondary);
        self.automation
            .send_keys_to_window(&self.target.window, &self.reset_secondary)?;
        Ok(())
    }
}
