//! Output streaming - drains a PTY reader into client events
//!
//! Each non-empty read becomes one [`OutputEvent::Output`] with the raw bytes
//! base64 encoded, so control sequences survive a text transport. The drain
//! runs on a blocking thread and reports how it ended through a oneshot.

use crate::state::TaskStatus;
use crate::task::TaskId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Stream label carried on every output event
pub const PTY_STREAM_LABEL: &str = "pty";

/// Largest chunk read from the PTY at once
pub const READ_CHUNK_SIZE: usize = 4096;

/// Event delivered to the client watching an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputEvent {
    /// A chunk of terminal output
    Output { stream: String, data_b64: String },

    /// Final status, sent once after the task is finalized
    Status { status: TaskStatus },
}

impl OutputEvent {
    pub fn output(bytes: &[u8]) -> Self {
        OutputEvent::Output {
            stream: PTY_STREAM_LABEL.to_string(),
            data_b64: STANDARD.encode(bytes),
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        OutputEvent::Status { status }
    }

    /// Raw bytes of an output event; `None` for other events or bad payloads
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        match self {
            OutputEvent::Output { data_b64, .. } => STANDARD.decode(data_b64).ok(),
            OutputEvent::Status { .. } => None,
        }
    }
}

/// Why the drain loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    Eof,
    ReadError,
    ClientGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub chunks: usize,
    pub bytes: usize,
    pub end: DrainEnd,
}

/// Copies PTY output into an event sink
#[derive(Debug, Clone)]
pub struct OutputStreamer {
    task_id: TaskId,
    sink: mpsc::Sender<OutputEvent>,
}

impl OutputStreamer {
    pub fn new(task_id: TaskId, sink: mpsc::Sender<OutputEvent>) -> Self {
        Self { task_id, sink }
    }

    /// Read until end-of-stream, a read error or the client going away.
    ///
    /// Blocking: must not be called from an async context.
    pub fn drain(&self, reader: &mut dyn Read) -> DrainSummary {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut chunks = 0;
        let mut bytes = 0;

        let end = loop {
            match reader.read(&mut buf) {
                Ok(0) => break DrainEnd::Eof,
                Ok(n) => {
                    if self.sink.blocking_send(OutputEvent::output(&buf[..n])).is_err() {
                        debug!(task_id = %self.task_id, "Client went away, stopping drain");
                        break DrainEnd::ClientGone;
                    }
                    chunks += 1;
                    bytes += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_pty_closed(&e) => break DrainEnd::Eof,
                Err(e) => {
                    warn!(task_id = %self.task_id, "PTY read failed: {}", e);
                    break DrainEnd::ReadError;
                }
            }
        };

        debug!(task_id = %self.task_id, chunks, bytes, end = ?end, "Drain finished");
        DrainSummary { chunks, bytes, end }
    }

    /// Drain on the blocking pool; the receiver resolves exactly once
    pub fn spawn(self, mut reader: Box<dyn Read + Send>) -> oneshot::Receiver<DrainSummary> {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let summary = self.drain(&mut *reader);
            let _ = done_tx.send(summary);
        });
        done_rx
    }
}

/// Linux reports EIO on the master once the slave side is fully closed
fn is_pty_closed(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(5)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::new(ErrorKind::BrokenPipe, "boom"));
            }
            self.served = true;
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        }
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&OutputEvent::output(b"hi\x1b[0m")).unwrap();
        assert_eq!(
            json,
            r#"{"type":"output","stream":"pty","data_b64":"aGkbWzBt"}"#
        );

        let json = serde_json::to_string(&OutputEvent::status(TaskStatus::Succeeded)).unwrap();
        assert_eq!(json, r#"{"type":"status","status":2}"#);
    }

    #[test]
    fn test_decode_data() {
        let bytes = vec![0u8, 255, 10, 13, 27];
        assert_eq!(OutputEvent::output(&bytes).decode_data(), Some(bytes));
        assert_eq!(OutputEvent::status(TaskStatus::Failed).decode_data(), None);
    }

    #[test]
    fn test_drain_splits_into_chunks() {
        let (tx, mut rx) = mpsc::channel(16);
        let streamer = OutputStreamer::new(TaskId::from("t"), tx);

        let payload = vec![b'x'; READ_CHUNK_SIZE + 10];
        let summary = streamer.drain(&mut Cursor::new(payload.clone()));
        drop(streamer);

        assert_eq!(summary.end, DrainEnd::Eof);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.bytes, payload.len());

        let mut collected = Vec::new();
        while let Ok(event) = rx.try_recv() {
            collected.extend(event.decode_data().unwrap());
        }
        assert_eq!(collected, payload);
    }

    #[test]
    fn test_drain_stops_when_client_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let streamer = OutputStreamer::new(TaskId::from("t"), tx);
        let summary = streamer.drain(&mut Cursor::new(b"data".to_vec()));
        assert_eq!(summary.end, DrainEnd::ClientGone);
        assert_eq!(summary.chunks, 0);
    }

    #[test]
    fn test_drain_read_error_ends_loop() {
        let (tx, mut rx) = mpsc::channel(4);
        let streamer = OutputStreamer::new(TaskId::from("t"), tx);
        let summary = streamer.drain(&mut FailingReader { served: false });
        assert_eq!(summary.end, DrainEnd::ReadError);
        assert_eq!(summary.chunks, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_spawn_signals_completion_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let done = OutputStreamer::new(TaskId::from("t"), tx)
            .spawn(Box::new(Cursor::new(b"hello".to_vec())));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.decode_data().unwrap(), b"hello");

        let summary = done.await.unwrap();
        assert_eq!(summary.end, DrainEnd::Eof);
        assert!(rx.recv().await.is_none());
    }
}
