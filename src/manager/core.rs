//! Connection manager and command surface.
//!
//! The [`ConnectionManager`] owns at most one [`Connection`] at a time and a
//! background session task that keeps it alive. Callers on any task share
//! the manager by cloning it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hud_link::{ConnectionManager, QueueDiscovery};
//!
//! # async fn example() -> hud_link::Result<()> {
//! let (provider, _feed) = QueueDiscovery::new();
//! let manager = ConnectionManager::builder().provider(provider).build()?;
//!
//! manager.connect("00:06:66:4A:2B:1C").await?;
//! manager.wait_connected(Duration::from_secs(30)).await?;
//!
//! manager.set(2, 0.5).await?;
//! let battery = manager.battery_query().await?;
//! println!("battery: {battery}");
//!
//! manager.disconnect().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryProvider;
use crate::error::{Error, Result};
use crate::identifiers::{Channel, TargetId};
use crate::protocol::{
    BatteryReading, Command, Intensity, decode_battery_response, encode_battery_query,
};
use crate::transport::Connection;

use super::builder::ManagerBuilder;
use super::options::{SessionOptions, as_millis};
use super::session::SessionHandle;
use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// State shared between the manager and its session task.
pub(crate) struct Shared {
    /// Resolves targets to endpoints.
    pub(crate) provider: Arc<dyn DiscoveryProvider>,

    /// Session timings.
    pub(crate) options: SessionOptions,

    /// The one live connection, if any.
    pub(crate) link: AsyncMutex<Option<Connection>>,

    /// Published lifecycle state.
    pub(crate) state: watch::Sender<ConnectionState>,

    /// Wakes the keepalive after a command saw the link fail.
    pub(crate) io_failed: Notify,

    /// Skip the retry delay after the next loss.
    pub(crate) redial: AtomicBool,
}

impl Shared {
    /// Publishes `next` if it differs from the current state.
    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "State changed");
            *current = next;
            true
        });
    }

    /// Removes and closes the current connection, returning its peer.
    pub(crate) async fn take_link(&self) -> Option<String> {
        let mut connection = self.link.lock().await.take()?;
        connection.close().await;
        Some(connection.peer().to_string())
    }
}

/// Internal state behind the manager handle.
struct ManagerInner {
    /// State the session task also sees.
    shared: Arc<Shared>,

    /// Running session; also serializes connect, disconnect, and shutdown.
    session: AsyncMutex<Option<SessionHandle>>,

    /// Target of the current session.
    target: Mutex<Option<TargetId>>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Resilient session to the LED bar.
///
/// `connect` starts a background session that discovers the target, opens a
/// link, polls it every poll interval, and re-establishes it whenever it
/// drops. Commands are accepted only while [`ConnectionState::Connected`].
///
/// `set`, `fade`, and `set_all` are fire-and-forget: a frame is written at
/// most once and the bar never acknowledges it. Only a failed write is
/// reported.
///
/// Dropping the last handle stops the session and closes the link.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Shared inner state.
    inner: Arc<ManagerInner>,
}

// ============================================================================
// ConnectionManager - Display
// ============================================================================

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Construction
// ============================================================================

impl ConnectionManager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Creates an idle manager.
    pub(crate) fn new(provider: Arc<dyn DiscoveryProvider>, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);

        let shared = Arc::new(Shared {
            provider,
            options,
            link: AsyncMutex::new(None),
            state,
            io_failed: Notify::new(),
            redial: AtomicBool::new(false),
        });

        Self {
            inner: Arc::new(ManagerInner {
                shared,
                session: AsyncMutex::new(None),
                target: Mutex::new(None),
            }),
        }
    }

    /// Session timings in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.shared.options
    }
}

// ============================================================================
// ConnectionManager - Session Control
// ============================================================================

impl ConnectionManager {
    /// Starts a session for `target` and returns once discovery has begun.
    ///
    /// Any running session is torn down first, so at most one connection
    /// exists at a time.
    ///
    /// # Errors
    ///
    /// - [`Error::NoAdapter`] if the provider has no transport at all
    /// - [`Error::InvalidArgument`] if `target` is empty
    pub async fn connect(&self, target: &str) -> Result<()> {
        self.ensure_adapter()?;
        let target = TargetId::parse(target)?;
        self.start(target).await
    }

    /// Like [`connect`](Self::connect) with an already parsed target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if the provider has no transport at all.
    pub async fn connect_to(&self, target: TargetId) -> Result<()> {
        self.ensure_adapter()?;
        self.start(target).await
    }

    /// Stops the session and closes the link.
    ///
    /// A no-op when idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the session was still discovering;
    /// the discovery is cancelled all the same.
    pub async fn disconnect(&self) -> Result<()> {
        match self.end_session().await {
            Some(ConnectionState::Discovering) => Err(Error::NotConnected),
            _ => Ok(()),
        }
    }

    /// Stops everything, whatever the current state.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the signature uniform with
    /// [`disconnect`](Self::disconnect).
    pub async fn shutdown(&self) -> Result<()> {
        self.end_session().await;
        info!("Connection manager shut down");
        Ok(())
    }

    /// Drops the current link but keeps the session, which redials at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if no session is running.
    pub async fn reconnect(&self) -> Result<()> {
        let session = self.inner.session.lock().await;
        if session.is_none() || !self.state().is_active() {
            return Err(Error::NotConnected);
        }

        let shared = &self.inner.shared;
        if !self.is_connected() {
            return Ok(());
        }

        shared.redial.store(true, Ordering::SeqCst);
        shared.set_state(ConnectionState::Discovering);

        match shared.take_link().await {
            Some(peer) => {
                info!(peer = %peer, "Dropping link to reconnect");
                shared.io_failed.notify_one();
            }
            None => shared.redial.store(false, Ordering::SeqCst),
        }
        Ok(())
    }

    /// Fails with [`Error::NoAdapter`] when the provider has no transport.
    fn ensure_adapter(&self) -> Result<()> {
        if self.inner.shared.provider.adapter_available() {
            Ok(())
        } else {
            Err(Error::NoAdapter)
        }
    }

    /// Replaces any running session with a new one for `target`.
    async fn start(&self, target: TargetId) -> Result<()> {
        let shared = &self.inner.shared;
        let mut session = self.inner.session.lock().await;

        if let Some(previous) = session.take() {
            debug!(previous = %previous.target(), next = %target, "Replacing running session");
            shared.set_state(ConnectionState::Disconnecting);
            previous.stop().await;
        }
        shared.take_link().await;

        shared.set_state(ConnectionState::Discovering);
        *self.inner.target.lock() = Some(target.clone());
        *session = Some(SessionHandle::spawn(Arc::clone(shared), target));
        Ok(())
    }

    /// Stops the running session, returning the state it was in.
    async fn end_session(&self) -> Option<ConnectionState> {
        let shared = &self.inner.shared;
        let mut session = self.inner.session.lock().await;
        let handle = session.take()?;

        let previous = self.state();
        let target = handle.target().clone();

        shared.set_state(ConnectionState::Disconnecting);
        handle.stop().await;
        shared.take_link().await;
        shared.set_state(ConnectionState::Idle);
        *self.inner.target.lock() = None;

        info!(target = %target, from = %previous, "Disconnected");
        Some(previous)
    }
}

// ============================================================================
// ConnectionManager - State
// ============================================================================

impl ConnectionManager {
    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    /// Returns `true` while commands are accepted.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watches state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Target of the current session.
    #[must_use]
    pub fn target(&self) -> Option<TargetId> {
        self.inner.target.lock().clone()
    }

    /// Waits until the session is connected.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no session is running or it ends first
    /// - [`Error::Timeout`] if `limit` passes while still discovering
    pub async fn wait_connected(&self, limit: Duration) -> Result<()> {
        let mut states = self.subscribe();
        let settled = timeout(
            limit,
            states.wait_for(|state| *state != ConnectionState::Discovering),
        )
        .await;

        match settled {
            Err(_) => Err(Error::timeout("wait for connection", as_millis(limit))),
            Ok(Ok(state)) if state.is_connected() => Ok(()),
            Ok(_) => Err(Error::NotConnected),
        }
    }

    /// Probes the live link now.
    ///
    /// A failed probe wakes the session so it starts reconnecting.
    pub async fn is_online(&self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let shared = &self.inner.shared;
        let mut slot = shared.link.lock().await;
        let Some(connection) = slot.as_mut() else {
            return false;
        };

        let alive = connection.is_alive().await;
        if !alive {
            shared.io_failed.notify_one();
        }
        alive
    }
}

// ============================================================================
// ConnectionManager - Commands
// ============================================================================

impl ConnectionManager {
    /// Sets `channel` to `intensity` immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for a channel outside `0..=4` or an
    ///   intensity outside `0.0..=1.0`
    /// - [`Error::NotConnected`] unless connected
    /// - [`Error::Transport`] if the write fails
    pub async fn set(&self, channel: u8, intensity: f64) -> Result<()> {
        self.send(Command::set(channel, intensity)?).await
    }

    /// Fades `channel` to `intensity` over `duration_ms`.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub async fn fade(&self, channel: u8, duration_ms: u64, intensity: f64) -> Result<()> {
        self.send(Command::fade(channel, duration_ms, intensity)?).await
    }

    /// Sets every channel to `intensity`, in ascending order.
    ///
    /// All five frames are written under one lock acquisition. A failed
    /// channel does not stop the remaining ones.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an intensity outside `0.0..=1.0`
    /// - [`Error::NotConnected`] unless connected
    /// - [`Error::PartialBroadcast`] naming every channel whose write failed
    pub async fn set_all(&self, intensity: f64) -> Result<()> {
        let intensity = Intensity::new(intensity)?;
        let shared = &self.inner.shared;

        let mut slot = shared.link.lock().await;
        let connection = live_link(self.state(), &mut slot)?;

        let mut failures = Vec::new();
        for channel in Channel::all() {
            let command = Command::SetChannel { channel, intensity };
            if let Err(e) = connection.write(&command.encode()).await {
                failures.push((channel, Box::new(e)));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        shared.io_failed.notify_one();
        warn!(failed = failures.len(), "Broadcast partially failed");
        Err(Error::PartialBroadcast { failures })
    }

    /// Reads the raw battery ADC value.
    ///
    /// Input already buffered is discarded first so a stale line is never
    /// taken for the answer. The wait for the reply ends early once the
    /// state leaves `Connected`, so `disconnect` never queues behind it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected, or if the session is torn
    ///   down while the reply is awaited
    /// - [`Error::Transport`] if the query cannot be written
    /// - [`Error::Timeout`] if no reply arrives within the query timeout
    /// - [`Error::Protocol`] if the reply is malformed or the peer hung up
    pub async fn battery_query(&self) -> Result<BatteryReading> {
        let shared = &self.inner.shared;
        let mut states = self.subscribe();

        let mut slot = shared.link.lock().await;
        let connection = live_link(self.state(), &mut slot)?;

        let discarded = connection.flush_inbound();
        if discarded > 0 {
            debug!(discarded, "Discarded stale input before query");
        }

        if let Err(e) = connection.write(&encode_battery_query()).await {
            shared.io_failed.notify_one();
            return Err(e);
        }

        let reply = async {
            match shared.options.query_timeout {
                Some(limit) => timeout(limit, connection.read_line())
                    .await
                    .map_err(|_| Error::timeout("battery query", as_millis(limit))),
                None => Ok(connection.read_line().await),
            }
        };

        let line = tokio::select! {
            biased;
            _ = states.wait_for(|state| !state.is_connected()) => {
                debug!("Battery query abandoned, session is going down");
                return Err(Error::NotConnected);
            }
            line = reply => line?,
        };

        if line.is_none() {
            shared.io_failed.notify_one();
        }

        let reading = decode_battery_response(line.as_deref())?;
        debug!(raw = reading.raw(), "Battery reading");
        Ok(reading)
    }

    /// Writes one fire-and-forget command.
    async fn send(&self, command: Command) -> Result<()> {
        let shared = &self.inner.shared;

        let mut slot = shared.link.lock().await;
        let connection = live_link(self.state(), &mut slot)?;

        debug!(command = command.name(), frame = %command, "Sending command");
        connection
            .write(&command.encode())
            .await
            .inspect_err(|_| shared.io_failed.notify_one())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The slot's connection, if commands may use it.
fn live_link(state: ConnectionState, slot: &mut Option<Connection>) -> Result<&mut Connection> {
    if !state.is_connected() {
        return Err(Error::NotConnected);
    }
    slot.as_mut()
        .filter(|connection| connection.last_known_alive())
        .ok_or(Error::NotConnected)
}

// ============================================================================
// Tests
// ============================================================================
