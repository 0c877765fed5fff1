//! Transport endpoint contract.
//!
//! An endpoint is an opened duplex byte stream to a discovered peer. The
//! discovery collaborator creates it; the [`Connection`](super::Connection)
//! that accepts it becomes its sole owner and is responsible for closing it.

// ============================================================================
// Imports
// ============================================================================

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf, split};
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// Boxed input half of an endpoint.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed output half of an endpoint.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// TransportEndpoint
// ============================================================================

/// A duplex byte stream to the peripheral.
///
/// Each direction is handed out once. Implementations that can check the
/// radio link without touching the stream (an RSSI read, for instance)
/// advertise it through [`supports_liveness_probe`](Self::supports_liveness_probe).
#[async_trait]
pub trait TransportEndpoint: Send {
    /// Human-readable peer description for logs.
    fn peer(&self) -> String;

    /// Takes the output direction.
    ///
    /// # Errors
    ///
    /// Fails if the direction is unavailable or was already taken.
    fn open_output(&mut self) -> io::Result<BoxedWriter>;

    /// Takes the input direction.
    ///
    /// # Errors
    ///
    /// Fails if the direction is unavailable or was already taken.
    fn open_input(&mut self) -> io::Result<BoxedReader>;

    /// Releases the underlying link.
    async fn close(&mut self) -> io::Result<()>;

    /// Returns `true` if [`probe_liveness`](Self::probe_liveness) is meaningful.
    fn supports_liveness_probe(&self) -> bool {
        false
    }

    /// Out-of-band liveness check.
    async fn probe_liveness(&mut self) -> bool {
        true
    }
}

// ============================================================================
// StreamEndpoint
// ============================================================================

/// Adapts any duplex stream (an RFCOMM socket, a tty, a TCP bridge) into an
/// endpoint by splitting it on first use.
pub struct StreamEndpoint<S> {
    /// Peer description.
    peer: String,
    /// Stream before it is split.
    stream: Option<S>,
    /// Input half awaiting `open_input`.
    read_half: Option<ReadHalf<S>>,
    /// Output half awaiting `open_output`.
    write_half: Option<WriteHalf<S>>,
}

impl<S> StreamEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps a connected stream.
    #[must_use]
    pub fn new(peer: impl Into<String>, stream: S) -> Self {
        Self {
            peer: peer.into(),
            stream: Some(stream),
            read_half: None,
            write_half: None,
        }
    }

    /// Splits the stream the first time either direction is requested.
    fn split_once(&mut self) {
        if let Some(stream) = self.stream.take() {
            let (read_half, write_half) = split(stream);
            self.read_half = Some(read_half);
            self.write_half = Some(write_half);
        }
    }
}

#[async_trait]
impl<S> TransportEndpoint for StreamEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn peer(&self) -> String {
        self.peer.clone()
    }

    fn open_output(&mut self) -> io::Result<BoxedWriter> {
        self.split_once();
        self.write_half
            .take()
            .map(|w| Box::new(w) as BoxedWriter)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "output already taken"))
    }

    fn open_input(&mut self) -> io::Result<BoxedReader> {
        self.split_once();
        self.read_half
            .take()
            .map(|r| Box::new(r) as BoxedReader)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "input already taken"))
    }

    async fn close(&mut self) -> io::Result<()> {
        trace!(peer = %self.peer, "Closing stream endpoint");
        self.read_half = None;
        if let Some(mut write_half) = self.write_half.take() {
            write_half.shutdown().await?;
        }
        self.stream = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn test_stream_endpoint_hands_out_each_half_once() {
        let (local, _remote) = duplex(64);
        let mut endpoint = StreamEndpoint::new("test", local);

        assert!(endpoint.open_output().is_ok());
        assert!(endpoint.open_input().is_ok());
        assert!(endpoint.open_output().is_err());
        assert!(endpoint.open_input().is_err());
    }

    #[tokio::test]
    async fn test_stream_endpoint_round_trip() {
        let (local, mut remote) = duplex(64);
        let mut endpoint = StreamEndpoint::new("test", local);

        let mut writer = endpoint.open_output().unwrap();
        writer.write_all(b"BM").await.unwrap();

        let mut buf = [0u8; 2];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"BM");
    }

    #[tokio::test]
    async fn test_close_unsplit_stream() {
        let (local, mut remote) = duplex(64);
        let mut endpoint = StreamEndpoint::new("test", local);

        endpoint.close().await.unwrap();

        let mut buf = Vec::new();
        let n = remote.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(!endpoint.supports_liveness_probe());
    }
}
