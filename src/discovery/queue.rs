//! A provider that hands out endpoints fed to it.
//!
//! Useful for simulation: feed [`MemoryEndpoint`](crate::transport::MemoryEndpoint)s
//! and drive the matching peers. Every `resolve` consumes one endpoint, or
//! fails once the timeout passes with none available.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TargetId;
use crate::transport::TransportEndpoint;

use super::DiscoveryProvider;

// ============================================================================
// Types
// ============================================================================

/// Endpoint plus optional artificial resolve latency.
type Queued = (Box<dyn TransportEndpoint>, Duration);

// ============================================================================
// QueueDiscovery
// ============================================================================

/// Provider backed by a queue of ready-made endpoints.
pub struct QueueDiscovery {
    /// Pending endpoints.
    queue: AsyncMutex<mpsc::UnboundedReceiver<Queued>>,
    /// Reported by `adapter_available`.
    adapter: Arc<AtomicBool>,
    /// Number of `resolve` calls so far.
    attempts: Arc<AtomicU32>,
}

/// Producer side of a [`QueueDiscovery`].
#[derive(Clone)]
pub struct EndpointFeed {
    /// Queue sender.
    tx: mpsc::UnboundedSender<Queued>,
    /// Shared adapter flag.
    adapter: Arc<AtomicBool>,
    /// Shared attempt counter.
    attempts: Arc<AtomicU32>,
}

impl QueueDiscovery {
    /// Creates an empty provider and its feed.
    #[must_use]
    pub fn new() -> (Self, EndpointFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = Arc::new(AtomicBool::new(true));
        let attempts = Arc::new(AtomicU32::new(0));

        let provider = Self {
            queue: AsyncMutex::new(rx),
            adapter: Arc::clone(&adapter),
            attempts: Arc::clone(&attempts),
        };
        let feed = EndpointFeed {
            tx,
            adapter,
            attempts,
        };
        (provider, feed)
    }
}

impl EndpointFeed {
    /// Queues an endpoint for the next resolve.
    pub fn push(&self, endpoint: impl TransportEndpoint + 'static) {
        self.push_delayed(endpoint, Duration::ZERO);
    }

    /// Queues an endpoint that takes `delay` to resolve.
    pub fn push_delayed(&self, endpoint: impl TransportEndpoint + 'static, delay: Duration) {
        // The provider may already be gone; nothing to deliver to then.
        let _ = self.tx.send((Box::new(endpoint), delay));
    }

    /// Simulates the radio appearing or disappearing.
    pub fn set_adapter_available(&self, available: bool) {
        self.adapter.store(available, Ordering::SeqCst);
    }

    /// Number of resolve attempts the provider has seen.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryProvider for QueueDiscovery {
    fn adapter_available(&self) -> bool {
        self.adapter.load(Ordering::SeqCst)
    }

    async fn resolve(
        &self,
        target: &TargetId,
        resolve_timeout: Duration,
    ) -> Result<Box<dyn TransportEndpoint>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target = %target, attempt, "Resolving from endpoint queue");

        let mut queue = self.queue.lock().await;
        let next = timeout(resolve_timeout, async {
            let (endpoint, delay) = queue.recv().await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some(endpoint)
        })
        .await;

        match next {
            Ok(Some(endpoint)) => Ok(endpoint),
            Ok(None) => Err(Error::discovery(target, "endpoint feed closed")),
            Err(_) => Err(Error::discovery(
                target,
                format!("not found within {}ms", resolve_timeout.as_millis()),
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
