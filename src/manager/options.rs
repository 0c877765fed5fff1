//! Session timing and reconnect configuration.
//!
//! Durations serialize as whole milliseconds, with an `_ms` suffix on the
//! field name.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hud_link::{ReconnectPolicy, SessionOptions};
//!
//! let options = SessionOptions::new()
//!     .with_poll_interval(Duration::from_secs(1))
//!     .with_reconnect(ReconnectPolicy::new().with_max_attempts(10));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default keepalive interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default delay before a reconnect attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default bound on a single discovery attempt.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default bound on a battery reply.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default ceiling for backed-off retry delays.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// How the session retries after a failed attempt or a lost link.
///
/// The default retries forever with a fixed one-second delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,

    /// Consecutive failed attempts before the session gives up.
    ///
    /// `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Multiplier applied per consecutive failure; `1.0` keeps the delay fixed.
    pub backoff_factor: f64,

    /// Upper bound on any single delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    /// Creates the default policy.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
            backoff_factor: 1.0,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Sets the delay before the first retry.
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Gives up after `attempts` consecutive failures.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Grows the delay by `factor` per consecutive failure, capped at `max_delay`.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry`, counted from zero.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor == 1.0 {
            return self.retry_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Returns `true` once `failures` consecutive failures exhaust the policy.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }

    fn validate(&self) -> Result<()> {
        if self.retry_delay.is_zero() {
            return Err(Error::config("retry delay must be greater than zero"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::config(format!(
                "backoff factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_delay < self.retry_delay {
            return Err(Error::config(format!(
                "max delay ({}ms) is shorter than the retry delay ({}ms)",
                self.max_delay.as_millis(),
                self.retry_delay.as_millis()
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::config(
                "max attempts must be at least 1; leave it unset to retry forever",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Timing of a connection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Interval between keepalive checks while connected.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Bound on a single discovery attempt.
    #[serde(rename = "discovery_timeout_ms", with = "millis")]
    pub discovery_timeout: Duration,

    /// Bound on waiting for a battery reply; `None` waits indefinitely.
    #[serde(rename = "query_timeout_ms", with = "opt_millis")]
    pub query_timeout: Option<Duration>,

    /// Retry behavior.
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SessionOptions - Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with the default timings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
            reconnect: ReconnectPolicy::new(),
        }
    }

    /// Parses options from JSON and validates them.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document does not parse
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// SessionOptions - Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the discovery bound.
    #[inline]
    #[must_use]
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the battery reply bound; `None` waits indefinitely.
    #[inline]
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the retry behavior.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

// ============================================================================
// SessionOptions - Validation
// ============================================================================

impl SessionOptions {
    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        if self.discovery_timeout.is_zero() {
            return Err(Error::config("discovery timeout must be greater than zero"));
        }
        if self.query_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config(
                "query timeout must be greater than zero; use None to wait indefinitely",
            ));
        }
        self.reconnect.validate()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Whole milliseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::as_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::as_millis(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.poll_interval, Duration::from_millis(3000));
        assert_eq!(options.discovery_timeout, Duration::from_secs(30));
        assert_eq!(options.query_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.reconnect.retry_delay, Duration::from_millis(1000));
        assert_eq!(options.reconnect.max_attempts, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = SessionOptions::new()
            .with_poll_interval(Duration::from_millis(250))
            .with_discovery_timeout(Duration::from_secs(5))
            .with_query_timeout(None)
            .with_reconnect(ReconnectPolicy::new().with_max_attempts(3));

        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.query_timeout, None);
        assert_eq!(options.reconnect.max_attempts, Some(3));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_fixed_delay() {
        let policy = ReconnectPolicy::new();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(7), Duration::from_secs(1));
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy::new().with_backoff(2.0, Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_exhaustion() {
        let policy = ReconnectPolicy::new().with_max_attempts(2);
        assert!(!policy.is_exhausted(1));
        assert!(policy.is_exhausted(2));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let options = SessionOptions::new().with_poll_interval(Duration::ZERO);
        assert!(matches!(options.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert!(
            SessionOptions::new()
                .with_discovery_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            SessionOptions::new()
                .with_query_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let shrinking = ReconnectPolicy::new().with_backoff(0.5, Duration::from_secs(5));
        let nan = ReconnectPolicy::new().with_backoff(f64::NAN, Duration::from_secs(5));
        let inverted = ReconnectPolicy::new().with_backoff(2.0, Duration::from_millis(10));
        let zero_attempts = ReconnectPolicy::new().with_max_attempts(0);
        let zero_delay = ReconnectPolicy::new().with_retry_delay(Duration::ZERO);

        for policy in [shrinking, nan, inverted, zero_attempts, zero_delay] {
            let options = SessionOptions::new().with_reconnect(policy);
            assert!(options.validate().is_err(), "{options:?}");
        }
    }

    #[test]
    fn test_json_uses_milliseconds() {
        let json = serde_json::to_value(SessionOptions::default()).unwrap();
        assert_eq!(json["poll_interval_ms"], 3000);
        assert_eq!(json["query_timeout_ms"], 5000);
        assert_eq!(json["reconnect"]["retry_delay_ms"], 1000);
        assert!(json["reconnect"]["max_attempts"].is_null());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let options = SessionOptions::from_json(
            r#"{"poll_interval_ms": 500, "query_timeout_ms": null, "reconnect": {"max_attempts": 4}}"#,
        )
        .unwrap();

        assert_eq!(options.poll_interval, Duration::from_millis(500));
        assert_eq!(options.query_timeout, None);
        assert_eq!(options.discovery_timeout, DEFAULT_DISCOVERY_TIMEOUT);
        assert_eq!(options.reconnect.max_attempts, Some(4));
        assert_eq!(options.reconnect.retry_delay, DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn test_from_json_validates() {
        let err = SessionOptions::from_json(r#"{"poll_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = SessionOptions::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_as_millis_saturates() {
        assert_eq!(as_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);
    }
}
