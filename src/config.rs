use std::time::Duration;

/// Configuration of a [`PingSession`](crate::PingSession) and a
/// [`PingProducer`](crate::PingProducer).
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Cadence of the producer. One probe is sent per tick.
    pub interval: Duration,

    /// Age after which an unanswered probe is failed by the sweep.
    pub timeout: Duration,

    /// How often the producer sweeps expired probes while one is outstanding.
    pub cleanup_interval: Duration,

    /// Consecutive failed initiations after which the producer gives up.
    pub max_initiation_failures: u32,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(1),
            cleanup_interval: Duration::from_millis(100),
            max_initiation_failures: 3,
        }
    }
}

impl PingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    #[must_use]
    pub const fn with_max_initiation_failures(mut self, max: u32) -> Self {
        self.max_initiation_failures = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroDuration("interval"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("timeout"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("cleanup_interval"));
        }
        if self.max_initiation_failures == 0 {
            return Err(ConfigError::InvalidLimit("max_initiation_failures must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid limit: {0}")]
    InvalidLimit(&'static str),
}
