/// Bounded incremental output capture
///
/// One reader thread per pipe forwards chunks to the supervisor over a
/// channel; the supervisor appends them to per-stream bounded buffers.
use crate::config::types::OutputIntegrity;
use crossbeam_channel::Sender;
use std::io::{ErrorKind, Read};
use std::thread::{self, JoinHandle};

const CHUNK_SIZE: usize = 4096;

/// Which captured stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Message from a reader thread
#[derive(Debug)]
pub enum StreamEvent {
    Data(StreamKind, Vec<u8>),
    /// End of stream; carries the read error if the stream did not end cleanly
    Closed(StreamKind, Option<String>),
}

/// Spawn a reader thread forwarding `stream` until EOF or receiver drop
pub fn spawn_reader<R: Read + Send + 'static>(
    kind: StreamKind,
    mut stream: R,
    tx: Sender<StreamEvent>,
) -> std::io::Result<JoinHandle<()>> {
    let name = match kind {
        StreamKind::Stdout => "gradebox-stdout",
        StreamKind::Stderr => "gradebox-stderr",
    };

    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    let _ = tx.send(StreamEvent::Closed(kind, None));
                    break;
                }
                Ok(n) => {
                    if tx.send(StreamEvent::Data(kind, chunk[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Closed(kind, Some(e.to_string())));
                    break;
                }
            }
        }
    })
}

/// Byte buffer that keeps at most `limit` bytes
#[derive(Debug)]
pub struct BoundedBuffer {
    data: Vec<u8>,
    limit: usize,
    integrity: OutputIntegrity,
}

impl BoundedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            integrity: OutputIntegrity::Complete,
        }
    }

    /// Append `bytes`, discarding whatever does not fit.
    pub fn push(&mut self, bytes: &[u8]) {
        let remaining = self.limit.saturating_sub(self.data.len());
        if bytes.len() > remaining {
            self.data.extend_from_slice(&bytes[..remaining]);
            self.integrity = OutputIntegrity::TruncatedByLimit;
        } else {
            self.data.extend_from_slice(bytes);
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn integrity(&self) -> OutputIntegrity {
        self.integrity.clone()
    }

    /// Lossy UTF-8 view of the captured bytes
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Combined integrity of two streams
pub fn combine_integrity(a: OutputIntegrity, b: OutputIntegrity) -> OutputIntegrity {
    if a == OutputIntegrity::TruncatedByLimit || b == OutputIntegrity::TruncatedByLimit {
        OutputIntegrity::TruncatedByLimit
    } else {
        OutputIntegrity::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn bounded_buffer_truncates_at_limit() {
        let mut buffer = BoundedBuffer::new(5);
        buffer.push(b"abc");
        assert_eq!(buffer.integrity(), OutputIntegrity::Complete);
        buffer.push(b"defg");
        assert_eq!(buffer.to_text(), "abcde");
        assert_eq!(buffer.integrity(), OutputIntegrity::TruncatedByLimit);
        buffer.push(b"h");
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buffer = BoundedBuffer::new(16);
        buffer.push(&[b'o', b'k', 0xff]);
        assert_eq!(buffer.to_text(), "ok\u{fffd}");
    }

    #[test]
    fn reader_forwards_data_then_close() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn_reader(StreamKind::Stdout, Cursor::new(b"hello".to_vec()), tx)
            .expect("spawn reader");

        let mut collected = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("reader event") {
                StreamEvent::Data(StreamKind::Stdout, bytes) => collected.extend(bytes),
                StreamEvent::Closed(StreamKind::Stdout, error) => {
                    assert!(error.is_none());
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        handle.join().expect("join reader");
        assert_eq!(collected, b"hello");
    }

    #[test]
    fn integrity_combination() {
        assert_eq!(
            combine_integrity(OutputIntegrity::Complete, OutputIntegrity::TruncatedByLimit),
            OutputIntegrity::TruncatedByLimit
        );
        assert_eq!(
            combine_integrity(OutputIntegrity::Complete, OutputIntegrity::Complete),
            OutputIntegrity::Complete
        );
    }
}
