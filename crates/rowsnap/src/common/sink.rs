//! Destination contract
//!
//! The writer loop hands every non-empty batch to a [`Sink`]. Destinations
//! are out of scope for this crate; only the interface plus two small
//! built-ins (an in-memory sink for tests, a JSON-lines stdout sink) live
//! here. Ordering is preserved per table; sinks may buffer.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::common::envelope::RawMessage;
use crate::common::error::{Error, Result};

/// A destination for raw messages.
#[async_trait]
pub trait Sink: Send {
    /// Deliver a batch. Errors are fatal for the per-table run.
    async fn write_raw_messages(&mut self, messages: Vec<RawMessage>) -> Result<()>;

    /// Flush any buffered output after all tables finished.
    async fn on_finish(&mut self) -> Result<()>;
}

/// Collects messages in memory. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub messages: Vec<RawMessage>,
    pub finished: bool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write_raw_messages(&mut self, mut messages: Vec<RawMessage>) -> Result<()> {
        self.messages.append(&mut messages);
        Ok(())
    }

    async fn on_finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Writes one JSON document per message to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink {
    out: Vec<u8>,
}

impl StdoutSink {
    /// Create a stdout sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn write_raw_messages(&mut self, messages: Vec<RawMessage>) -> Result<()> {
        self.out.clear();
        for message in &messages {
            serde_json::to_writer(&mut self.out, message)?;
            self.out.push(b'\n');
        }
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&self.out)
            .await
            .map_err(|e| Error::sink(format!("stdout write failed: {e}")))?;
        Ok(())
    }

    async fn on_finish(&mut self) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .flush()
            .await
            .map_err(|e| Error::sink(format!("stdout flush failed: {e}")))?;
        Ok(())
    }
}
