use crate::core::Payload;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Destination for assembled payloads
///
/// Calls arrive in decode order from a single consumer. There is no
/// acknowledgment; a sink that cannot deliver logs and moves on.
pub trait IngestSink: Send + Sync {
    fn ingest(&self, payload: Payload);
}

/// Writes each payload as one line of JSON
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> IngestSink for JsonLinesSink<W> {
    fn ingest(&self, payload: Payload) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *writer, &payload)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            warn!(error = %e, readings = payload.len(), "failed to write payload");
        }
    }
}

/// Keeps every payload in memory
#[derive(Default)]
pub struct MemorySink {
    payloads: Mutex<Vec<Payload>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn payloads(&self) -> Vec<Payload> {
        self.lock().clone()
    }

    /// Drain received payloads
    pub fn take(&self) -> Vec<Payload> {
        std::mem::take(&mut *self.lock())
    }

    pub fn reading_count(&self) -> usize {
        self.lock().iter().map(Payload::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Payload>> {
        self.payloads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IngestSink for MemorySink {
    fn ingest(&self, payload: Payload) {
        self.lock().push(payload);
    }
}
