//! Scripted in-memory transport for exercising the session without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Result, SerialError, TransportLink};

/// Shared view of everything a `FakeLink` has written.
#[derive(Clone, Default)]
pub struct WriteRecorder {
    written: Arc<Mutex<Vec<String>>>,
}

impl WriteRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    fn record(&self, token: &[u8]) {
        self.written
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(token).into_owned());
    }
}

/// Handle for feeding further lines into a `FakeLink` after it has been
/// handed to the session.
#[derive(Clone)]
pub struct LineFeeder {
    inbound: Arc<Mutex<VecDeque<String>>>,
}

impl LineFeeder {
    pub fn push(&self, line: &str) {
        self.inbound.lock().unwrap().push_back(line.to_string());
    }
}

/// Transport that replays a scripted sequence of inbound lines, then stays
/// quiet. Outbound tokens are captured through the recorder.
pub struct FakeLink {
    inbound: Arc<Mutex<VecDeque<String>>>,
    recorder: WriteRecorder,
    open: bool,
    fail_writes: bool,
}

impl FakeLink {
    pub fn new<I, S>(lines: I) -> (Self, WriteRecorder)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let recorder = WriteRecorder::new();
        let link = Self {
            inbound: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
            recorder: recorder.clone(),
            open: true,
            fail_writes: false,
        };
        (link, recorder)
    }

    /// Make every `write_token` fail, simulating a vanished device.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn feeder(&self) -> LineFeeder {
        LineFeeder {
            inbound: Arc::clone(&self.inbound),
        }
    }
}

#[async_trait::async_trait]
impl TransportLink for FakeLink {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        if !self.open {
            return Err(SerialError::ConnectionFailed("link is closed".to_string()));
        }
        let next = self.inbound.lock().unwrap().pop_front();
        match next {
            Some(line) => Ok(Some(line)),
            None => {
                // Idle link: model the timeout without burning a full second
                // of test wall clock.
                tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
                Ok(None)
            }
        }
    }

    async fn write_token(&mut self, token: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(SerialError::ConnectionFailed("link is closed".to_string()));
        }
        if self.fail_writes {
            return Err(SerialError::ConnectionFailed("device vanished".to_string()));
        }
        self.recorder.record(token);
        Ok(token.len())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn port_name(&self) -> &str {
        "FAKE"
    }
}
