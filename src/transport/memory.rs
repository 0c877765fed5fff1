//! In-memory endpoint for simulation and tests.
//!
//! [`MemoryEndpoint::pair`] returns the local endpoint together with a
//! [`MemoryPeer`] playing the LED bar: it reads outbound frames, writes reply
//! lines, and can hang up or become unreachable.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

use crate::protocol::FRAME_TERMINATOR;

use super::endpoint::{BoxedReader, BoxedWriter, StreamEndpoint, TransportEndpoint};

// ============================================================================
// Constants
// ============================================================================

/// Per-direction buffer of the in-memory pipe.
const PIPE_CAPACITY: usize = 4096;

// ============================================================================
// Types
// ============================================================================

/// State both sides observe.
#[derive(Debug)]
struct Shared {
    /// Set once the local side closed the endpoint.
    closed: AtomicBool,
    /// Result of the out-of-band probe.
    reachable: AtomicBool,
    /// Whether the endpoint advertises a probe at all.
    probe: bool,
}

// ============================================================================
// MemoryEndpoint
// ============================================================================

/// Local side of an in-memory link.
pub struct MemoryEndpoint {
    /// Underlying duplex pipe.
    inner: StreamEndpoint<DuplexStream>,
    /// State shared with the peer.
    shared: Arc<Shared>,
}

impl MemoryEndpoint {
    /// Creates a connected endpoint/peer pair without an out-of-band probe.
    #[must_use]
    pub fn pair(peer: impl Into<String>) -> (Self, MemoryPeer) {
        Self::build(peer.into(), false)
    }

    /// Creates a pair whose endpoint supports the liveness probe.
    #[must_use]
    pub fn pair_with_probe(peer: impl Into<String>) -> (Self, MemoryPeer) {
        Self::build(peer.into(), true)
    }

    fn build(peer: String, probe: bool) -> (Self, MemoryPeer) {
        let (local, remote) = duplex(PIPE_CAPACITY);
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            probe,
        });

        let endpoint = Self {
            inner: StreamEndpoint::new(peer, local),
            shared: Arc::clone(&shared),
        };
        let peer = MemoryPeer {
            stream: BufReader::new(remote),
            shared,
        };
        (endpoint, peer)
    }
}

#[async_trait]
impl TransportEndpoint for MemoryEndpoint {
    fn peer(&self) -> String {
        self.inner.peer()
    }

    fn open_output(&mut self) -> io::Result<BoxedWriter> {
        self.inner.open_output()
    }

    fn open_input(&mut self) -> io::Result<BoxedReader> {
        self.inner.open_input()
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.inner.close().await
    }

    fn supports_liveness_probe(&self) -> bool {
        self.shared.probe
    }

    async fn probe_liveness(&mut self) -> bool {
        self.shared.reachable.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Remote side of an in-memory link.
pub struct MemoryPeer {
    /// Remote end of the pipe.
    stream: BufReader<DuplexStream>,
    /// State shared with the endpoint.
    shared: Arc<Shared>,
}

impl MemoryPeer {
    /// Reads one outbound frame, terminator included.
    ///
    /// Returns `None` once the local side has gone away.
    ///
    /// # Errors
    ///
    /// Propagates pipe I/O errors.
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self
            .stream
            .read_until(FRAME_TERMINATOR as u8, &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Sends one reply line.
    ///
    /// # Errors
    ///
    /// Fails if the local side has gone away.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await
    }

    /// Sends bytes without a line terminator.
    ///
    /// # Errors
    ///
    /// Fails if the local side has gone away.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    /// Makes the out-of-band probe report the link as up or down.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Returns `true` once the local side closed its endpoint.
    #[must_use]
    pub fn endpoint_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Drops the link; the local side reads EOF and writes fail.
    pub fn hang_up(self) {
        drop(self);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_peer_reads_frames() {
        let (mut endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut writer = endpoint.open_output().unwrap();

        writer.write_all(b"S2128MS00M").await.unwrap();

        assert_eq!(peer.read_frame().await.unwrap().as_deref(), Some("S2128M"));
        assert_eq!(peer.read_frame().await.unwrap().as_deref(), Some("S00M"));
    }

    #[tokio::test]
    async fn test_peer_sends_line() {
        let (mut endpoint, mut peer) = MemoryEndpoint::pair("bar");
        let mut reader = endpoint.open_input().unwrap();

        peer.send_line("VAL:700").await.unwrap();

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"VAL:700\n");
    }

    #[tokio::test]
    async fn test_hang_up_gives_eof() {
        let (mut endpoint, peer) = MemoryEndpoint::pair("bar");
        let mut reader = endpoint.open_input().unwrap();

        peer.hang_up();

        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_is_visible_to_peer() {
        let (mut endpoint, peer) = MemoryEndpoint::pair_with_probe("bar");
        assert!(endpoint.supports_liveness_probe());
        assert!(endpoint.probe_liveness().await);

        peer.set_reachable(false);
        assert!(!endpoint.probe_liveness().await);

        endpoint.close().await.unwrap();
        assert!(peer.endpoint_closed());
    }
}
