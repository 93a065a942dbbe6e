pub mod actions;
pub mod fake;
pub mod resolve;

pub use actions::set_text_and_confirm;
pub use fake::FakeAutomationPort;
pub use resolve::{resolve_target, ResolveError, ResolveStrategy, TargetHandle};

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("Automation call failed: {0}")]
    CallFailed(String),

    #[error("Control not available: {0}")]
    ControlUnavailable(String),
}

impl AutomationError {
    /// The backend's own failure text, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            AutomationError::CallFailed(m) | AutomationError::ControlUnavailable(m) => m,
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;

/// Opaque reference to a top-level window of the target application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    pub handle: u64,
    pub title: String,
}

/// Opaque reference to a control inside a resolved window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRef {
    pub window: u64,
    pub auto_id: String,
}

/// Pixel bounds of a control, as reported by the automation backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

/// Snapshot of one child control, taken for error-indicator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildControl {
    pub text: String,
    pub visible: bool,
    pub bounds: Bounds,
}

/// Capability for driving the foreign application's UI.
///
/// Implementations wrap a platform automation technology (Win32/UIA, …); the
/// bridge depends only on this contract so the target can be faked in tests.
/// Calls are synchronous; the underlying technology is blocking anyway and
/// every call is expected to be short.
pub trait AutomationPort: Send + Sync {
    /// Titles and handles of all top-level windows.
    fn list_windows(&self) -> Result<Vec<WindowRef>>;

    /// Exact title match.
    fn find_window_by_title(&self, title: &str) -> Result<Option<WindowRef>>;

    /// Window owned by the process launched from `path`.
    fn find_window_by_process_path(&self, path: &str) -> Result<Option<WindowRef>>;

    /// Named control scoped to `window`; `None` if absent.
    fn find_child(&self, window: &WindowRef, auto_id: &str) -> Result<Option<ControlRef>>;

    fn focus_window(&self, window: &WindowRef) -> Result<()>;

    fn focus_control(&self, control: &ControlRef) -> Result<()>;

    fn set_text(&self, control: &ControlRef, text: &str) -> Result<()>;

    fn send_keys_to_control(&self, control: &ControlRef, keys: &str) -> Result<()>;

    fn send_keys_to_window(&self, window: &WindowRef, keys: &str) -> Result<()>;

    /// Lightweight existence probe, bounded by `timeout`. Never errors; an
    /// inaccessible window simply reads as gone.
    fn window_exists(&self, window: &WindowRef, timeout: Duration) -> bool;

    fn is_control_visible(&self, control: &ControlRef) -> Result<bool>;

    /// Immediate children of `window` with text, visibility and bounds.
    fn child_controls(&self, window: &WindowRef) -> Result<Vec<ChildControl>>;

    /// All descendant controls of `window`.
    fn descendant_controls(&self, window: &WindowRef) -> Result<Vec<ChildControl>>;
}
