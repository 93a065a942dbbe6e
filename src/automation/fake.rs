//! Scriptable automation port for tests.
//!
//! Holds an in-memory window/control tree, records every driving action in
//! order, and lets tests inject failures into the forwarding and inspection
//! paths.

use std::sync::Mutex;
use std::time::Duration;

use super::{
    AutomationError, AutomationPort, Bounds, ChildControl, ControlRef, Result, WindowRef,
};

#[derive(Debug, Clone)]
pub struct FakeControl {
    pub auto_id: String,
    pub text: String,
    pub visible: bool,
    pub bounds: Bounds,
}

impl FakeControl {
    pub fn new(auto_id: &str) -> Self {
        Self {
            auto_id: auto_id.to_string(),
            text: String::new(),
            visible: true,
            bounds: Bounds::default(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_bounds(mut self, width: u32, height: u32) -> Self {
        self.bounds = Bounds { width, height };
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn snapshot(&self) -> ChildControl {
        ChildControl {
            text: self.text.clone(),
            visible: self.visible,
            bounds: self.bounds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub title: String,
    pub process_path: Option<String>,
    pub children: Vec<FakeControl>,
    pub descendants: Vec<FakeControl>,
}

impl FakeWindow {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            process_path: None,
            children: Vec::new(),
            descendants: Vec::new(),
        }
    }

    pub fn with_process_path(mut self, path: &str) -> Self {
        self.process_path = Some(path.to_string());
        self
    }

    pub fn with_child(mut self, control: FakeControl) -> Self {
        self.children.push(control);
        self
    }

    pub fn with_descendant(mut self, control: FakeControl) -> Self {
        self.descendants.push(control);
        self
    }
}

/// One recorded driving action, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeAction {
    FocusWindow(u64),
    FocusControl(String),
    SetText { auto_id: String, text: String },
    KeysToControl { auto_id: String, keys: String },
    KeysToWindow { handle: u64, keys: String },
}

#[derive(Default)]
struct FailureInjection {
    set_text: Option<String>,
    keystrokes: Option<String>,
    inspection: Option<String>,
}

#[derive(Default)]
pub struct FakeAutomationPort {
    windows: Mutex<Vec<(u64, FakeWindow)>>,
    actions: Mutex<Vec<FakeAction>>,
    failures: Mutex<FailureInjection>,
    next_handle: Mutex<u64>,
}

impl FakeAutomationPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&self, window: FakeWindow) -> u64 {
        let mut next = self.next_handle.lock().unwrap();
        *next += 1;
        let handle = *next;
        self.windows.lock().unwrap().push((handle, window));
        handle
    }

    /// Simulate the foreign window closing.
    pub fn remove_window(&self, handle: u64) {
        self.windows.lock().unwrap().retain(|(h, _)| *h != handle);
    }

    pub fn actions(&self) -> Vec<FakeAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn fail_set_text(&self, message: &str) {
        self.failures.lock().unwrap().set_text = Some(message.to_string());
    }

    pub fn fail_keystrokes(&self, message: &str) {
        self.failures.lock().unwrap().keystrokes = Some(message.to_string());
    }

    pub fn fail_inspection(&self, message: &str) {
        self.failures.lock().unwrap().inspection = Some(message.to_string());
    }

    /// Let subsequent calls succeed again, simulating a recovered target.
    pub fn clear_failures(&self) {
        *self.failures.lock().unwrap() = FailureInjection::default();
    }

    fn record(&self, action: FakeAction) {
        self.actions.lock().unwrap().push(action);
    }

    fn with_window<T>(
        &self,
        handle: u64,
        f: impl FnOnce(&FakeWindow) -> T,
    ) -> Result<T> {
        let windows = self.windows.lock().unwrap();
        windows
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, w)| f(w))
            .ok_or_else(|| AutomationError::ControlUnavailable(format!("window {handle} gone")))
    }

    fn find_control(&self, control: &ControlRef) -> Result<FakeControl> {
        self.with_window(control.window, |w| {
            w.children
                .iter()
                .chain(w.descendants.iter())
                .find(|c| c.auto_id == control.auto_id)
                .cloned()
        })?
        .ok_or_else(|| AutomationError::ControlUnavailable(control.auto_id.clone()))
    }
}

impl AutomationPort for FakeAutomationPort {
    fn list_windows(&self) -> Result<Vec<WindowRef>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .map(|(h, w)| WindowRef {
                handle: *h,
                title: w.title.clone(),
            })
            .collect())
    }

    fn find_window_by_title(&self, title: &str) -> Result<Option<WindowRef>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, w)| w.title == title)
            .map(|(h, w)| WindowRef {
                handle: *h,
                title: w.title.clone(),
            }))
    }

    fn find_window_by_process_path(&self, path: &str) -> Result<Option<WindowRef>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, w)| w.process_path.as_deref() == Some(path))
            .map(|(h, w)| WindowRef {
                handle: *h,
                title: w.title.clone(),
            }))
    }

    fn find_child(&self, window: &WindowRef, auto_id: &str) -> Result<Option<ControlRef>> {
        self.with_window(window.handle, |w| {
            w.children
                .iter()
                .chain(w.descendants.iter())
                .find(|c| c.auto_id == auto_id)
                .map(|c| ControlRef {
                    window: window.handle,
                    auto_id: c.auto_id.clone(),
                })
        })
    }

    fn focus_window(&self, window: &WindowRef) -> Result<()> {
        self.with_window(window.handle, |_| ())?;
        self.record(FakeAction::FocusWindow(window.handle));
        Ok(())
    }

    fn focus_control(&self, control: &ControlRef) -> Result<()> {
        self.find_control(control)?;
        self.record(FakeAction::FocusControl(control.auto_id.clone()));
        Ok(())
    }

    fn set_text(&self, control: &ControlRef, text: &str) -> Result<()> {
        if let Some(msg) = self.failures.lock().unwrap().set_text.clone() {
            return Err(AutomationError::CallFailed(msg));
        }
        self.find_control(control)?;
        self.record(FakeAction::SetText {
            auto_id: control.auto_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn send_keys_to_control(&self, control: &ControlRef, keys: &str) -> Result<()> {
        if let Some(msg) = self.failures.lock().unwrap().keystrokes.clone() {
            return Err(AutomationError::CallFailed(msg));
        }
        self.find_control(control)?;
        self.record(FakeAction::KeysToControl {
            auto_id: control.auto_id.clone(),
            keys: keys.to_string(),
        });
        Ok(())
    }

    fn send_keys_to_window(&self, window: &WindowRef, keys: &str) -> Result<()> {
        self.with_window(window.handle, |_| ())?;
        self.record(FakeAction::KeysToWindow {
            handle: window.handle,
            keys: keys.to_string(),
        });
        Ok(())
    }

    fn window_exists(&self, window: &WindowRef, _timeout: Duration) -> bool {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .any(|(h, _)| *h == window.handle)
    }

    fn is_control_visible(&self, control: &ControlRef) -> Result<bool> {
        Ok(self.find_control(control)?.visible)
    }

    fn child_controls(&self, window: &WindowRef) -> Result<Vec<ChildControl>> {
        if let Some(msg) = self.failures.lock().unwrap().inspection.clone() {
            return Err(AutomationError::CallFailed(msg));
        }
        self.with_window(window.handle, |w| {
            w.children.iter().map(FakeControl::snapshot).collect()
        })
    }

    fn descendant_controls(&self, window: &WindowRef) -> Result<Vec<ChildControl>> {
        if let Some(msg) = self.failures.lock().unwrap().inspection.clone() {
            return Err(AutomationError::CallFailed(msg));
        }
        // Models the backend's container-type descendant scan; plain labels
        // registered as children are not part of it.
        self.with_window(window.handle, |w| {
            w.descendants.iter().map(FakeControl::snapshot).collect()
        })
    }
}
