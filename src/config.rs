//! Configuration for tracing behavior.

use std::time::Duration;

/// Configuration options for query tracing.
///
/// # Example
///
/// ```rust
/// use sql_query_tracing::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_binding_logging(false)
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether instrumentation starts out enabled.
    /// Default: `true`
    pub enabled: bool,

    /// Whether to append query bindings to `db.query.text`.
    /// Default: `true`
    pub log_bindings: bool,

    /// Whether to record the connection user as `db.user`.
    ///
    /// Other SQL instrumentations usually record the user whenever the
    /// connection settings carry one. Here it is opt-in, since user names
    /// are often considered sensitive.
    /// Default: `false`
    pub record_user: bool,

    /// Queries running at least this long emit a WARN event inside their span.
    /// Default: 500ms
    pub slow_query_threshold: Duration,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_bindings: true,
            record_user: false,
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with instrumentation enabled or disabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable or disable appending bindings to the recorded statement.
    ///
    /// **Security Warning**: Bindings often contain user input and
    /// potentially sensitive data.
    pub fn with_binding_logging(mut self, enabled: bool) -> Self {
        self.log_bindings = enabled;
        self
    }

    /// Enable or disable recording of the connection user.
    pub fn with_user_recording(mut self, enabled: bool) -> Self {
        self.record_user = enabled;
        self
    }

    /// Set the threshold for slow query warnings.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Create a development-friendly configuration with full logging enabled.
    ///
    /// **Warning**: Do not use in production as it logs bindings and users.
    pub fn development() -> Self {
        Self {
            enabled: true,
            log_bindings: true,
            record_user: true,
            slow_query_threshold: Duration::from_millis(100),
        }
    }

    /// Create a production-safe configuration.
    pub fn production() -> Self {
        Self {
            enabled: true,
            log_bindings: false,
            record_user: false,
            slow_query_threshold: Duration::from_secs(1),
        }
    }
}
