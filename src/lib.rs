//! Serial-to-MES bridge core.
//!
//! Reads line-oriented messages from a serial device, forwards them into the
//! input field of a running desktop MES application via a UI-automation
//! capability, inspects the application's visual state for a reject
//! indicator, and echoes `OK`/`NG` back over the serial link. A hosting
//! control panel drives it through [`session::BridgeSession`] and
//! [`watchdog::Watchdog`] and observes it through published snapshots.

pub mod automation;
pub mod config;
pub mod detect;
pub mod serial;
pub mod session;
pub mod watchdog;

pub use config::BridgeConfig;
pub use detect::Verdict;
pub use session::{BridgeSession, BridgeSnapshot, SessionState};
pub use watchdog::Watchdog;
