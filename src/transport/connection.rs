//! A live link to the peripheral.
//!
//! A [`Connection`] owns exactly one [`TransportEndpoint`] together with its
//! output (flushed after every frame) and its line-buffered input. It is not
//! synchronized itself; the connection manager keeps it behind a single lock
//! so a write, a query, and a liveness check never interleave mid-frame.
//!
//! # Liveness
//!
//! The connection is considered alive until any of these happen:
//!
//! - a write or flush fails
//! - a read returns EOF or an error
//! - the endpoint's out-of-band probe (when supported) reports the peer gone
//! - [`Connection::close`] is called

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::endpoint::{BoxedReader, BoxedWriter, TransportEndpoint};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on bytes discarded by a single inbound flush.
///
/// Far larger than the radio module's own buffer.
const MAX_FLUSH_BYTES: usize = 64 * 1024;

/// Line terminator of inbound replies.
const LINE_TERMINATOR: u8 = b'\n';

// ============================================================================
// Connection
// ============================================================================

/// An open link to the peripheral.
pub struct Connection {
    /// Peer description, kept for logs after close.
    peer: String,
    /// Owned endpoint.
    endpoint: Box<dyn TransportEndpoint>,
    /// Output half; `None` once closed.
    writer: Option<BoxedWriter>,
    /// Line-buffered input half; `None` once closed.
    reader: Option<BufReader<BoxedReader>>,
    /// Cleared by the first failed or EOF I/O.
    alive: bool,
    /// Set by `close`.
    closed: bool,
    /// When the link was opened.
    opened_at: Instant,
    /// Frames successfully written.
    frames_written: u64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("alive", &self.alive)
            .field("closed", &self.closed)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Takes ownership of an endpoint and opens both directions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if either direction is unavailable. The
    /// endpoint is closed before the error is returned.
    pub async fn open(mut endpoint: Box<dyn TransportEndpoint>) -> Result<Self> {
        let peer = endpoint.peer();

        let halves = endpoint
            .open_output()
            .and_then(|writer| endpoint.open_input().map(|reader| (writer, reader)));

        let (writer, reader) = match halves {
            Ok(halves) => halves,
            Err(e) => {
                if let Err(close_err) = endpoint.close().await {
                    debug!(peer = %peer, error = %close_err, "Endpoint close after failed open");
                }
                return Err(Error::transport(format!("cannot open streams to {peer}: {e}")));
            }
        };

        debug!(peer = %peer, "Connection streams opened");

        Ok(Self {
            peer,
            endpoint,
            writer: Some(writer),
            reader: Some(BufReader::new(reader)),
            alive: true,
            closed: false,
            opened_at: Instant::now(),
            frames_written: 0,
        })
    }

    /// Closes writer, reader, and endpoint.
    ///
    /// Each is released independently: a failure closing one never skips the
    /// others. Calling this again is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.alive = false;

        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.shutdown().await
        {
            debug!(peer = %self.peer, error = %e, "Writer shutdown failed");
        }

        drop(self.reader.take());

        if let Err(e) = self.endpoint.close().await {
            debug!(peer = %self.peer, error = %e, "Endpoint close failed");
        }

        debug!(
            peer = %self.peer,
            frames = self.frames_written,
            uptime_ms = u64::try_from(self.uptime().as_millis()).unwrap_or(u64::MAX),
            "Connection closed"
        );
    }
}

// ============================================================================
// Connection - I/O
// ============================================================================

impl Connection {
    /// Writes one frame and flushes it onto the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the connection is closed or the write
    /// fails; a failed write also marks the connection dead.
    pub async fn write(&mut self, frame: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::transport("connection is closed"))?;

        let result = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                self.frames_written += 1;
                trace!(peer = %self.peer, frame, "Frame written");
                Ok(())
            }
            Err(e) => {
                self.alive = false;
                warn!(peer = %self.peer, frame, error = %e, "Frame write failed");
                Err(Error::transport(format!("write to {} failed: {e}", self.peer)))
            }
        }
    }

    /// Discards whatever input is already available, without waiting.
    ///
    /// Best effort; returns the number of bytes dropped. Seeing EOF here
    /// marks the connection dead.
    pub fn flush_inbound(&mut self) -> usize {
        let Some(reader) = self.reader.as_mut() else {
            return 0;
        };

        let mut discarded = 0;
        while discarded < MAX_FLUSH_BYTES {
            match reader.fill_buf().now_or_never() {
                Some(Ok(buf)) if buf.is_empty() => {
                    self.alive = false;
                    break;
                }
                Some(Ok(buf)) => {
                    let n = buf.len();
                    reader.consume(n);
                    discarded += n;
                }
                Some(Err(e)) => {
                    debug!(peer = %self.peer, error = %e, "Inbound flush read failed");
                    self.alive = false;
                    break;
                }
                None => break,
            }
        }

        if discarded > 0 {
            trace!(peer = %self.peer, discarded, "Stale input discarded");
        }
        discarded
    }

    /// Reads one line, without its terminator.
    ///
    /// Returns `None` when the peer closed the stream or the read failed;
    /// both mark the connection dead. Invalid UTF-8 is replaced rather than
    /// treated as a link failure.
    pub async fn read_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;

        let mut buf = Vec::new();
        match reader.read_until(LINE_TERMINATOR, &mut buf).await {
            Ok(0) => {
                self.alive = false;
                debug!(peer = %self.peer, "Peer closed the stream");
                None
            }
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                trace!(peer = %self.peer, line = %line, "Line received");
                Some(line)
            }
            Err(e) => {
                self.alive = false;
                debug!(peer = %self.peer, error = %e, "Line read failed");
                None
            }
        }
    }
}

// ============================================================================
// Connection - Liveness
// ============================================================================

impl Connection {
    /// Checks whether the link is still usable.
    ///
    /// Uses the endpoint's out-of-band probe when it has one, then drains
    /// whatever input is pending until the stream would block or reports EOF.
    ///
    /// Unsolicited input is discarded. Must not be called while a reply is
    /// awaited; queries flush inbound before writing anyway.
    pub async fn is_alive(&mut self) -> bool {
        if !self.alive || self.closed {
            return false;
        }

        if self.endpoint.supports_liveness_probe() && !self.endpoint.probe_liveness().await {
            debug!(peer = %self.peer, "Liveness probe failed");
            self.alive = false;
            return false;
        }

        let discarded = self.flush_inbound();
        if !self.alive {
            debug!(peer = %self.peer, "EOF observed by liveness check");
        } else if discarded > 0 {
            debug!(peer = %self.peer, discarded, "Unsolicited input dropped by liveness check");
        }

        self.alive
    }

    /// Liveness as of the last I/O, without probing.
    #[inline]
    #[must_use]
    pub fn last_known_alive(&self) -> bool {
        self.alive && !self.closed
    }

    /// Returns `true` once [`close`](Self::close) ran.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// Connection - Diagnostics
// ============================================================================

impl Connection {
    /// Peer description.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// When the connection was opened.
    #[inline]
    #[must_use]
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Time since the connection was opened.
    #[inline]
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Frames successfully written.
    #[inline]
    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use async_trait::async_trait;

    use crate::transport::MemoryEndpoint;

    /// Endpoint that can never hand out its input.
    struct OutputOnly {
        inner: MemoryEndpoint,
    }

    #[async_trait]
    impl TransportEndpoint for OutputOnly {
        fn peer(&self) -> String {
            "output-only".into()
        }

        fn open_output(&mut self) -> io::Result<BoxedWriter> {
            self.inner.open_output()
        }

        fn open_input(&mut self) -> io::Result<BoxedReader> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no input"))
        }

        async fn close(&mut self) -> io::Result<()> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_open_fails_without_input_and_closes_endpoint() {
        let (inner, peer) = MemoryEndpoint::pair("bar");
        let result = Connection::open(Box::new(OutputOnly { inner })).await;

        assert!(matches!(result, Err(Error::Transport { .. })));
        assert!(peer.endpoint_closed());
    }

    #[tokio::test]
    async fn test_write_is_flushed_immediately() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        conn.write("S2128M").await.unwrap();

        assert_eq!(peer.read_frame().await.unwrap().as_deref(), Some("S2128M"));
        assert_eq!(conn.frames_written(), 1);
        assert_eq!(conn.peer(), "bar");
    }

    #[tokio::test]
    async fn test_flush_inbound_drops_stale_lines() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.send_line("VAL:1").await.unwrap();
        peer.send_line("noise").await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(conn.flush_inbound(), "VAL:1\nnoise\n".len());
        assert_eq!(conn.flush_inbound(), 0);
        assert!(conn.is_alive().await);

        peer.send_line("VAL:2").await.unwrap();
        assert_eq!(conn.read_line().await.as_deref(), Some("VAL:2"));
    }

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.send_raw(b"VAL:700\r\n").await.unwrap();
        assert_eq!(conn.read_line().await.as_deref(), Some("VAL:700"));
    }

    #[tokio::test]
    async fn test_eof_marks_dead() {
        let (endpoint, peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();
        assert!(conn.is_alive().await);

        peer.hang_up();

        assert!(conn.read_line().await.is_none());
        assert!(!conn.last_known_alive());
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_liveness_peek_detects_eof_without_read() {
        let (endpoint, peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.hang_up();

        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_liveness_check_drains_unsolicited_input() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.send_line("OK").await.unwrap();
        assert!(conn.is_alive().await);
        assert_eq!(conn.flush_inbound(), 0);

        peer.send_line("VAL:9").await.unwrap();
        assert_eq!(conn.read_line().await.as_deref(), Some("VAL:9"));
    }

    #[tokio::test]
    async fn test_liveness_sees_eof_behind_unsolicited_line() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.send_line("OK").await.unwrap();
        assert!(conn.is_alive().await);

        peer.send_line("OK").await.unwrap();
        peer.hang_up();

        assert!(!conn.is_alive().await);
        assert!(!conn.last_known_alive());
    }

    #[tokio::test]
    async fn test_probe_failure_marks_dead() {
        let (endpoint, peer) = MemoryEndpoint::pair_with_probe("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();
        assert!(conn.is_alive().await);

        peer.set_reachable(false);
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_write_after_hang_up_fails() {
        let (endpoint, peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        peer.hang_up();

        let err = conn.write("BM").await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert!(!conn.last_known_alive());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (endpoint, peer) = MemoryEndpoint::pair("bar");
        let mut conn = Connection::open(Box::new(endpoint)).await.unwrap();

        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert!(peer.endpoint_closed());
        assert!(!conn.is_alive().await);
        assert!(conn.write("BM").await.is_err());
        assert!(conn.read_line().await.is_none());
    }
}
