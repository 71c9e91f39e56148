//! JSON-lines framing for watch event streams.
//!
//! Each event is one `serde_json` document followed by `\n`. Lines are capped
//! at [`MAX_EVENT_BYTES`] so a misbehaving peer cannot grow the buffer without
//! bound.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, warn};

use federation_types::WatchEvent;

use super::SERVER_TARGET;

pub(crate) const MAX_EVENT_BYTES: usize = 64 * 1024;
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Live events queued per consumer before it is treated as lagging.
pub(crate) const CONSUMER_BACKLOG: usize = 256;
/// Longest a single write to a consumer socket may block.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a single [`LineReader::next_line`] call.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// A complete line without its terminator.
    Line(Vec<u8>),
    /// The peer closed the stream.
    Eof,
    /// The read timed out before a full line arrived; partial input is kept.
    Idle,
}

/// Bounded line reader that survives read timeouts.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    pub(crate) fn next_line(&mut self) -> io::Result<LineRead> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(LineRead::Idle);
                }
                Err(error) => return Err(error),
            };

            if available.is_empty() {
                if self.pending.is_empty() {
                    return Ok(LineRead::Eof);
                }
                return Ok(LineRead::Line(mem::take(&mut self.pending)));
            }

            if let Some(position) = available.iter().position(|byte| *byte == b'\n') {
                self.pending.extend_from_slice(&available[..position]);
                self.inner.consume(position + 1);
                enforce_limit(self.pending.len())?;
                return Ok(LineRead::Line(mem::take(&mut self.pending)));
            }

            let consumed = available.len();
            self.pending.extend_from_slice(available);
            self.inner.consume(consumed);
            enforce_limit(self.pending.len())?;
        }
    }
}

fn enforce_limit(length: usize) -> io::Result<()> {
    if length > MAX_EVENT_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("event line exceeds {MAX_EVENT_BYTES} bytes"),
        ));
    }
    Ok(())
}

/// Decodes one line. Blank lines decode to `None`.
pub(crate) fn decode_event(line: &[u8]) -> Result<Option<WatchEvent>, serde_json::Error> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(line).map(Some)
}

pub(crate) fn write_event<W: Write>(writer: &mut W, event: &WatchEvent) -> io::Result<()> {
    let mut payload = serde_json::to_vec(event).map_err(io::Error::other)?;
    payload.push(b'\n');
    writer.write_all(&payload)?;
    writer.flush()
}

/// Streams `snapshot` and then every live event to one consumer.
///
/// Returns when the consumer disconnects or stops reading, the hub drops the
/// sender, or `stopped` is raised.
pub(crate) fn stream_to_consumer<W: Write>(
    writer: &mut W,
    snapshot: Vec<WatchEvent>,
    events: &Receiver<WatchEvent>,
    stopped: &AtomicBool,
) {
    for event in &snapshot {
        if let Err(error) = write_event(writer, event) {
            debug!(target: SERVER_TARGET, error = %error, "consumer went away during snapshot");
            return;
        }
    }
    while !stopped.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if let Err(error) = write_event(writer, &event) {
                    match error.kind() {
                        io::ErrorKind::BrokenPipe => {}
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => warn!(
                            target: SERVER_TARGET,
                            "consumer stopped reading; disconnecting"
                        ),
                        _ => warn!(target: SERVER_TARGET, error = %error, "failed to write event"),
                    }
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
