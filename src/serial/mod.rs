pub mod fake;
pub mod frame;
pub mod link;

pub use fake::{FakeLink, LineFeeder, WriteRecorder};
pub use frame::unwrap_frame;
pub use link::SerialLink;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Access denied opening {0} (port already claimed?)")]
    AccessDenied(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Line-oriented transport owned by the bridge session.
///
/// `read_line` returns `Ok(None)` on timeout, since a quiet link is not a
/// failure.
#[async_trait::async_trait]
pub trait TransportLink: Send {
    /// Block up to `timeout` for the next newline-terminated message.
    /// The trailing terminator is stripped; undecodable bytes are replaced.
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Write a short status token and flush immediately.
    async fn write_token(&mut self, token: &[u8]) -> Result<usize>;

    /// Release the underlying device. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn port_name(&self) -> &str;
}
