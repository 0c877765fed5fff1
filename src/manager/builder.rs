//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`ConnectionManager`]
//! instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hud_link::{ConnectionManager, QueueDiscovery};
//!
//! # fn example() -> hud_link::Result<()> {
//! let (provider, _feed) = QueueDiscovery::new();
//! let manager = ConnectionManager::builder()
//!     .provider(provider)
//!     .poll_interval(Duration::from_secs(1))
//!     .query_timeout(None)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::DiscoveryProvider;
use crate::error::{Error, Result};

use super::core::ConnectionManager;
use super::options::{ReconnectPolicy, SessionOptions};

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionManager`].
///
/// Use [`ConnectionManager::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ManagerBuilder {
    /// Discovery provider.
    provider: Option<Arc<dyn DiscoveryProvider>>,
    /// Session timings.
    options: SessionOptions,
}

impl fmt::Debug for ManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("provider", &self.provider.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// ManagerBuilder Implementation
// ============================================================================

impl ManagerBuilder {
    /// Creates a builder with default timings and no provider.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the discovery provider.
    #[inline]
    #[must_use]
    pub fn provider(mut self, provider: impl DiscoveryProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Sets a provider that is shared with other owners.
    #[inline]
    #[must_use]
    pub fn shared_provider(mut self, provider: Arc<dyn DiscoveryProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Replaces all session timings.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Sets the delay before the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect.retry_delay = delay;
        self
    }

    /// Sets the battery reply bound; `None` waits indefinitely.
    #[inline]
    #[must_use]
    pub fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.query_timeout = timeout;
        self
    }

    /// Sets the bound on a single discovery attempt.
    #[inline]
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.options.discovery_timeout = timeout;
        self
    }

    /// Sets the retry behavior.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Builds the manager with validation.
    ///
    /// The manager starts idle; nothing is spawned until `connect`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no provider is set
    /// - [`Error::Config`] if a timing is out of range
    pub fn build(self) -> Result<ConnectionManager> {
        let provider = self.validate_provider()?;
        self.options.validate()?;

        Ok(ConnectionManager::new(provider, self.options))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ManagerBuilder {
    /// Validates the provider configuration.
    fn validate_provider(&self) -> Result<Arc<dyn DiscoveryProvider>> {
        self.provider.clone().ok_or_else(|| {
            Error::config(
                "Discovery provider is required. Use .provider() to set it.\n\
                 Example: ConnectionManager::builder().provider(provider)",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
