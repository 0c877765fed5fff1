//! Background session task.
//!
//! One task runs per `connect()` call. It owns the retry loop:
//!
//! 1. Resolve the target through the discovery provider
//! 2. Open a [`Connection`] and install it in the shared slot
//! 3. Poll liveness every poll interval until the link drops
//! 4. Close the link, wait the retry delay, go back to 1
//!
//! Every wait is raced against the session's stop signal. The task always
//! releases its connection before it exits, so once it has been joined the
//! slot is empty.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TargetId;
use crate::transport::Connection;

use super::core::Shared;
use super::options::as_millis;
use super::state::ConnectionState;

// ============================================================================
// SessionHandle
// ============================================================================

/// Control side of a running session.
pub(crate) struct SessionHandle {
    /// Target the session was started for.
    target: TargetId,
    /// Set to `true` to stop the task.
    stop: watch::Sender<bool>,
    /// The session task.
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawns the session task.
    pub(crate) fn spawn(shared: Arc<Shared>, target: TargetId) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(shared, target.clone(), stop_rx));
        Self { target, stop, task }
    }

    /// Target of this session.
    #[inline]
    pub(crate) fn target(&self) -> &TargetId {
        &self.target
    }

    /// Signals the task and waits for it to exit.
    pub(crate) async fn stop(self) {
        self.stop.send_replace(true);

        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!(target = %self.target, error = %e, "Session task panicked");
        }
    }
}

// ============================================================================
// Session Loop
// ============================================================================

/// Why keepalive returned.
enum Keepalive {
    /// The stop signal fired.
    Stopped,
    /// The link is gone.
    Lost,
}

/// Resolves once the stop signal fires or its sender is dropped.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A dropped sender means the manager itself is gone.
    let _ = stop.wait_for(|&stopping| stopping).await;
}

/// The session task body.
async fn run(shared: Arc<Shared>, target: TargetId, mut stop: watch::Receiver<bool>) {
    let policy = &shared.options.reconnect;
    let mut failures: u32 = 0;

    shared.redial.store(false, Ordering::SeqCst);
    info!(target = %target, "Session started");

    loop {
        shared.set_state(ConnectionState::Discovering);
        debug!(target = %target, attempt = failures + 1, "Discovery attempt");

        let outcome = tokio::select! {
            biased;
            () = stopped(&mut stop) => break,
            outcome = establish(&shared, &target) => outcome,
        };

        match outcome {
            Ok(connection) => {
                failures = 0;
                install(&shared, &target, connection).await;

                match keepalive(&shared, &mut stop).await {
                    Keepalive::Stopped => break,
                    Keepalive::Lost => {
                        let peer = shared.take_link().await;
                        shared.set_state(ConnectionState::Discovering);
                        warn!(target = %target, peer = ?peer, "Connection lost");

                        if shared.redial.swap(false, Ordering::SeqCst) {
                            debug!(target = %target, "Redialing immediately");
                            continue;
                        }
                    }
                }
            }
            Err(e) => {
                failures += 1;
                debug!(target = %target, attempt = failures, error = %e, "Connection attempt failed");

                if policy.is_exhausted(failures) {
                    warn!(target = %target, attempts = failures, "Reconnect attempts exhausted");
                    break;
                }
            }
        }

        let delay = policy.delay_for(failures.saturating_sub(1));
        debug!(target = %target, delay_ms = as_millis(delay), "Retrying after delay");

        tokio::select! {
            biased;
            () = stopped(&mut stop) => break,
            () = sleep(delay) => {}
        }
    }

    if let Some(peer) = shared.take_link().await {
        debug!(target = %target, peer = %peer, "Connection released");
    }
    shared.set_state(ConnectionState::Idle);
    info!(target = %target, "Session stopped");
}

/// One discovery plus open.
async fn establish(shared: &Shared, target: &TargetId) -> Result<Connection> {
    if !shared.provider.adapter_available() {
        return Err(Error::NoAdapter);
    }

    let endpoint = shared
        .provider
        .resolve(target, shared.options.discovery_timeout)
        .await?;

    Connection::open(endpoint).await
}

/// Puts a fresh connection in the slot, then publishes `Connected`.
async fn install(shared: &Shared, target: &TargetId, connection: Connection) {
    let peer = connection.peer().to_string();

    {
        let mut slot = shared.link.lock().await;
        if let Some(mut stale) = slot.replace(connection) {
            warn!(peer = %stale.peer(), "Replacing a connection that was never released");
            stale.close().await;
        }
    }

    shared.set_state(ConnectionState::Connected);
    info!(target = %target, peer = %peer, "Connected");
}

/// Polls liveness until the link drops or the session stops.
///
/// The sleep never holds the link lock; only the check itself does. Waiting
/// for the lock is raced against the stop signal as well.
async fn keepalive(shared: &Shared, stop: &mut watch::Receiver<bool>) -> Keepalive {
    let interval = shared.options.poll_interval;

    loop {
        tokio::select! {
            biased;
            () = stopped(stop) => return Keepalive::Stopped,
            () = shared.io_failed.notified() => trace!("Keepalive woken early"),
            () = sleep(interval) => {}
        }

        let alive = {
            let mut slot = tokio::select! {
                biased;
                () = stopped(stop) => return Keepalive::Stopped,
                slot = shared.link.lock() => slot,
            };
            match slot.as_mut() {
                Some(connection) => connection.is_alive().await,
                None => false,
            }
        };

        trace!(alive, "Keepalive tick");
        if !alive {
            return Keepalive::Lost;
        }
    }
}
