//! Multi-strategy target resolution.
//!
//! The target application may present its title slightly differently between
//! versions, so resolution tries a cascade of strategies in order and takes
//! the first hit.

use super::{AutomationError, AutomationPort, ControlRef, WindowRef};
use crate::config::BridgeConfig;

/// Minimum length for a title token to participate in the scan strategy;
/// shorter tokens match too much.
const SCAN_TOKEN_MIN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    ExactTitle,
    TitlePattern,
    ProcessPath,
    TitleScan,
}

impl ResolveStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveStrategy::ExactTitle => "exact title match",
            ResolveStrategy::TitlePattern => "title pattern match",
            ResolveStrategy::ProcessPath => "process path match",
            ResolveStrategy::TitleScan => "top-level window scan",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Target window '{title}' not found (attempted: {attempted})")]
    WindowNotFound { title: String, attempted: String },

    #[error("Input control '{auto_id}' not found in window '{title}'")]
    ControlNotFound { auto_id: String, title: String },

    #[error("Invalid title pattern: {0}")]
    BadPattern(#[from] regex::Error),

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Resolved window plus its input control. Becomes stale if the foreign
/// window closes; staleness is detected by the session's liveness probe.
#[derive(Debug, Clone)]
pub struct TargetHandle {
    pub window: WindowRef,
    pub input: ControlRef,
    pub strategy: ResolveStrategy,
}

/// Resolve the target window and its input control.
///
/// Strategies run in order: exact title, regex pattern, process path, then a
/// scan of all top-level windows for a title-token substring. First success
/// wins; exhausting all of them is `WindowNotFound`.
pub fn resolve_target(
    port: &dyn AutomationPort,
    config: &BridgeConfig,
) -> Result<TargetHandle, ResolveError> {
    let mut attempted: Vec<&'static str> = Vec::new();

    let window = match try_strategies(port, config, &mut attempted)? {
        Some(found) => found,
        None => {
            return Err(ResolveError::WindowNotFound {
                title: config.target_app_title.clone(),
                attempted: attempted.join(", "),
            })
        }
    };

    log::info!(
        "Connected to window '{}' using {}",
        window.0.title,
        window.1.as_str()
    );

    let input = port
        .find_child(&window.0, &config.textbox_auto_id)?
        .ok_or_else(|| ResolveError::ControlNotFound {
            auto_id: config.textbox_auto_id.clone(),
            title: window.0.title.clone(),
        })?;
    log::info!("Input control '{}' resolved", config.textbox_auto_id);

    Ok(TargetHandle {
        window: window.0,
        input,
        strategy: window.1,
    })
}

fn try_strategies(
    port: &dyn AutomationPort,
    config: &BridgeConfig,
    attempted: &mut Vec<&'static str>,
) -> Result<Option<(WindowRef, ResolveStrategy)>, ResolveError> {
    attempted.push(ResolveStrategy::ExactTitle.as_str());
    if let Some(w) = find_by_exact_title(port, &config.target_app_title)? {
        return Ok(Some((w, ResolveStrategy::ExactTitle)));
    }

    if let Some(pattern) = &config.target_title_pattern {
        attempted.push(ResolveStrategy::TitlePattern.as_str());
        if let Some(w) = find_by_title_pattern(port, pattern)? {
            return Ok(Some((w, ResolveStrategy::TitlePattern)));
        }
    }

    if let Some(path) = &config.target_process_path {
        attempted.push(ResolveStrategy::ProcessPath.as_str());
        if let Some(w) = find_by_process_path(port, path)? {
            return Ok(Some((w, ResolveStrategy::ProcessPath)));
        }
    }

    attempted.push(ResolveStrategy::TitleScan.as_str());
    if let Some(w) = find_by_title_scan(port, &config.target_app_title)? {
        return Ok(Some((w, ResolveStrategy::TitleScan)));
    }

    Ok(None)
}

fn find_by_exact_title(
    port: &dyn AutomationPort,
    title: &str,
) -> Result<Option<WindowRef>, ResolveError> {
    if title.is_empty() {
        return Ok(None);
    }
    Ok(port.find_window_by_title(title)?)
}

fn find_by_title_pattern(
    port: &dyn AutomationPort,
    pattern: &str,
) -> Result<Option<WindowRef>, ResolveError> {
    let re = regex::Regex::new(pattern)?;
    let windows = port.list_windows()?;
    Ok(windows.into_iter().find(|w| re.is_match(&w.title)))
}

fn find_by_process_path(
    port: &dyn AutomationPort,
    path: &str,
) -> Result<Option<WindowRef>, ResolveError> {
    Ok(port.find_window_by_process_path(path)?)
}

/// Scan every top-level window for a case-insensitive substring match on any
/// significant token of the configured title.
fn find_by_title_scan(
    port: &dyn AutomationPort,
    title: &str,
) -> Result<Option<WindowRef>, ResolveError> {
    let tokens = scan_tokens(title);
    if tokens.is_empty() {
        return Ok(None);
    }

    let windows = port.list_windows()?;
    log::debug!("Scanning {} top-level windows for {:?}", windows.len(), tokens);
    for window in windows {
        if window.title.is_empty() {
            continue;
        }
        let lower = window.title.to_lowercase();
        if tokens.iter().any(|t| lower.contains(t)) {
            log::info!("Found potential window: '{}'", window.title);
            return Ok(Some(window));
        }
    }
    Ok(None)
}

fn scan_tokens(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .filter(|t| t.len() >= SCAN_TOKEN_MIN_LEN)
        .map(|t| t.to_lowercase())
        .collect()
}
