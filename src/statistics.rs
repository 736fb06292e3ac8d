use crate::{PingResult, PingSendingError};
use std::time::Duration;

/// Running totals over the results a [`PingProducer`](crate::PingProducer) emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PingStatistics {
    /// Probes that went out and were answered, rejected by the server or timed out.
    pub sent: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    /// Failed for any reason other than a timeout.
    pub failed: u64,
    pub reinitiations: u64,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    total: Duration,
}

impl PingStatistics {
    pub(crate) fn record(&mut self, result: &PingResult) {
        match result {
            PingResult::Interval(rtt) => {
                self.sent += 1;
                self.succeeded += 1;
                self.total += *rtt;
                self.min = Some(self.min.map_or(*rtt, |min| min.min(*rtt)));
                self.max = Some(self.max.map_or(*rtt, |max| max.max(*rtt)));
            }
            PingResult::Error(PingSendingError::TimedOut) => {
                self.sent += 1;
                self.timed_out += 1;
            }
            PingResult::Error(_) => self.failed += 1,
        }
    }

    /// The probe that got the session expired was sent but yields no result.
    pub(crate) fn record_reinitiation(&mut self) {
        self.sent += 1;
        self.reinitiations += 1;
    }

    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        let succeeded = u32::try_from(self.succeeded).ok()?;
        if succeeded == 0 {
            return None;
        }
        Some(self.total / succeeded)
    }

    /// Fraction of sent probes that got no reply in time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn loss(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        self.timed_out as f64 / self.sent as f64
    }
}
