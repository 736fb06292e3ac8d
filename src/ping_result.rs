use crate::PingSendingError;
use std::time::Duration;

/// Outcome of one producer tick.
#[derive(Debug)]
pub enum PingResult {
    /// Measured round trip time.
    Interval(Duration),
    Error(PingSendingError),
}

impl PingResult {
    #[must_use]
    pub fn is_interval(&self) -> bool {
        matches!(self, PingResult::Interval(_))
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        match self {
            PingResult::Interval(rtt) => Some(*rtt),
            PingResult::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&PingSendingError> {
        match self {
            PingResult::Interval(_) => None,
            PingResult::Error(e) => Some(e),
        }
    }
}

impl From<Result<Duration, PingSendingError>> for PingResult {
    fn from(result: Result<Duration, PingSendingError>) -> Self {
        match result {
            Ok(rtt) => PingResult::Interval(rtt),
            Err(e) => PingResult::Error(e),
        }
    }
}
