use std::time::{Duration, Instant};

use serialport::SerialPort;

use super::{Result, SerialError, TransportLink};

/// Poll interval while waiting for bytes. The port itself is opened with a
/// short blocking timeout; pacing happens here so the async runtime stays
/// responsive.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serial transport over a blocking `serialport` handle.
///
/// Partial lines survive timeouts: bytes accumulate in an internal buffer
/// until a newline arrives, so slow senders are never truncated.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open `port_name` at `baud`.
    ///
    /// The port is checked against the enumerated available ports first so a
    /// missing device yields `PortNotFound` with the alternatives logged,
    /// rather than an opaque open failure.
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let available = Self::list_available_ports()?;
        if !available.iter().any(|p| p == port_name) {
            log::error!(
                "Port {} not found. Available ports: {:?}",
                port_name,
                available
            );
            return Err(SerialError::PortNotFound(port_name.to_string()));
        }

        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| classify_open_error(port_name, &e))?;

        log::info!("Serial port {} connected at {} baud", port_name, baud);
        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            pending: Vec::new(),
        })
    }

    /// Enumerate available serial port names.
    pub fn list_available_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
        log::info!("Available serial ports: {:?}", names);
        Ok(names)
    }

    /// Pop a complete line from the pending buffer, if one has arrived.
    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop(); // the newline itself
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Map an open failure onto the error taxonomy. Permission failures get
/// their own variant so the caller can suggest freeing the port.
fn classify_open_error(port_name: &str, err: &serialport::Error) -> SerialError {
    let description = err.to_string();
    let denied = matches!(
        err.kind(),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
    ) || description.contains("Access is denied")
        || description.contains("Permission denied");

    if denied {
        log::error!("Serial port {} open denied: {}", port_name, description);
        SerialError::AccessDenied(port_name.to_string())
    } else {
        log::error!("Serial port {} open failed: {}", port_name, description);
        SerialError::ConnectionFailed(description)
    }
}

#[async_trait::async_trait]
impl TransportLink for SerialLink {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let start = Instant::now();
        let deadline = start + timeout;

        loop {
            if let Some(line) = self.take_buffered_line() {
                log::debug!(
                    "Serial line received ({} chars, read time {:.3}s)",
                    line.len(),
                    start.elapsed().as_secs_f64()
                );
                return Ok(Some(line));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| SerialError::ConnectionFailed("link is closed".to_string()))?;

            match port.bytes_to_read() {
                Ok(0) => tokio::time::sleep(POLL_INTERVAL).await,
                Ok(n) => {
                    let mut buf = vec![0u8; (n as usize).min(512)];
                    match port.read(&mut buf) {
                        Ok(read) => self.pending.extend_from_slice(&buf[..read]),
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            tokio::time::sleep(POLL_INTERVAL).await;
                        }
                        Err(e) => return Err(SerialError::IoError(e)),
                    }
                }
                Err(e) => return Err(SerialError::SerialportError(e)),
            }
        }
    }

    async fn write_token(&mut self, token: &[u8]) -> Result<usize> {
        let start = Instant::now();
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SerialError::ConnectionFailed("link is closed".to_string()))?;

        let bytes_written = port.write(token).map_err(SerialError::IoError)?;
        port.flush().map_err(SerialError::IoError)?;

        log::info!(
            "Serial transmission successful ({} bytes, {:.3}s)",
            bytes_written,
            start.elapsed().as_secs_f64()
        );
        Ok(bytes_written)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Serial port {} closed", self.port_name);
        }
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
