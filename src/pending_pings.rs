use crate::sequence_number::SequenceNumber;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// Why an outstanding probe did not get its reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ProbeFailure {
    NeedsReinitialization,
    TimedOut,
    ConnectionLost,
    SessionClosed,
}

pub(crate) type ProbeOutcome = Result<Duration, ProbeFailure>;
pub(crate) type ProbeWaiter = oneshot::Receiver<ProbeOutcome>;

struct PendingPing {
    registered_at: u64,
    waiter: oneshot::Sender<ProbeOutcome>,
}

/// Correlation table from in-flight sequence number to the suspended caller.
///
/// An entry leaves the table exactly once; whoever removes it resolves the
/// waiter, every later attempt finds nothing and is a no-op. Once the table
/// is closed it refuses new registrations.
pub(crate) struct PendingPings {
    entries: HashMap<SequenceNumber, PendingPing>,
    next_sequence: SequenceNumber,
    closed: Option<ProbeFailure>,
}

impl PendingPings {
    pub(crate) fn new(first_sequence: SequenceNumber) -> Self {
        PendingPings { entries: HashMap::new(), next_sequence: first_sequence, closed: None }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Allocates the next sequence number and registers a waiter for it.
    /// Fails with the reason the table was closed, if it was.
    pub(crate) fn register(&mut self, now: u64) -> Result<(SequenceNumber, ProbeWaiter), ProbeFailure> {
        if let Some(failure) = self.closed {
            return Err(failure);
        }
        let mut sequence = self.next_sequence;
        // Only possible after a full wrap with a probe still outstanding.
        while self.entries.contains_key(&sequence) {
            sequence = sequence.next();
        }
        self.next_sequence = sequence.next();

        let (waiter, waiter_rx) = oneshot::channel();
        self.entries.insert(sequence, PendingPing { registered_at: now, waiter });
        Ok((sequence, waiter_rx))
    }

    /// Resolves the probe with its round trip time. Returns false if no probe
    /// with this sequence number is outstanding.
    pub(crate) fn complete(&mut self, sequence: SequenceNumber, now: u64) -> bool {
        match self.entries.remove(&sequence) {
            None => false,
            Some(pending) => {
                let rtt = Duration::from_nanos(now.saturating_sub(pending.registered_at));
                let _ = pending.waiter.send(Ok(rtt));
                true
            }
        }
    }

    pub(crate) fn fail(&mut self, sequence: SequenceNumber, failure: ProbeFailure) -> bool {
        match self.entries.remove(&sequence) {
            None => false,
            Some(pending) => {
                let _ = pending.waiter.send(Err(failure));
                true
            }
        }
    }

    /// Drops the entry without resolving it; used when the caller itself gives up.
    pub(crate) fn forget(&mut self, sequence: SequenceNumber) {
        self.entries.remove(&sequence);
    }

    pub(crate) fn fail_all(&mut self, failure: ProbeFailure) -> usize {
        let failed = self.entries.len();
        for (_, pending) in self.entries.drain() {
            let _ = pending.waiter.send(Err(failure));
        }
        failed
    }

    /// Fails every outstanding probe and every later registration with `failure`.
    pub(crate) fn close(&mut self, failure: ProbeFailure) -> usize {
        self.closed.get_or_insert(failure);
        self.fail_all(failure)
    }

    /// Fails every probe older than `timeout` with [`ProbeFailure::TimedOut`].
    pub(crate) fn expire(&mut self, now: u64, timeout: Duration) -> Vec<SequenceNumber> {
        let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let expired: Vec<SequenceNumber> = self
            .entries
            .iter()
            .filter(|(_, pending)| now.saturating_sub(pending.registered_at) > timeout)
            .map(|(sequence, _)| *sequence)
            .collect();
        for sequence in &expired {
            self.fail(*sequence, ProbeFailure::TimedOut);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    #[test]
    fn register_allocates_increasing_sequence_numbers() {
        let mut pending = PendingPings::new(SequenceNumber::from(10));
        let (first, _rx1) = pending.register(0).unwrap();
        let (second, _rx2) = pending.register(0).unwrap();
        assert!(first == SequenceNumber::from(10));
        assert!(second == SequenceNumber::from(11));
        assert!(pending.len() == 2);
    }

    #[test]
    fn register_skips_sequence_numbers_still_outstanding() {
        let mut pending = PendingPings::new(SequenceNumber::from(u32::MAX));
        let (first, _rx1) = pending.register(0).unwrap();
        pending.next_sequence = first;
        let (second, _rx2) = pending.register(0).unwrap();
        assert!(second == SequenceNumber::from(1));
    }

    #[test]
    fn complete_resolves_with_round_trip_time() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (sequence, mut rx) = pending.register(5 * MS).unwrap();

        assert!(pending.complete(sequence, 12 * MS));
        assert!(rx.try_recv().unwrap() == Ok(Duration::from_millis(7)));
        assert!(pending.len() == 0);
    }

    #[test]
    fn removal_happens_exactly_once() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (sequence, mut rx) = pending.register(0).unwrap();

        assert!(pending.fail(sequence, ProbeFailure::TimedOut));
        assert!(!pending.complete(sequence, MS));
        assert!(!pending.fail(sequence, ProbeFailure::NeedsReinitialization));
        assert!(rx.try_recv().unwrap() == Err(ProbeFailure::TimedOut));
    }

    #[test]
    fn expire_only_removes_old_entries() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (old, mut old_rx) = pending.register(0).unwrap();
        let (young, mut young_rx) = pending.register(150 * MS).unwrap();

        let expired = pending.expire(200 * MS, Duration::from_millis(100));

        assert!(expired == vec![old]);
        assert!(old_rx.try_recv().unwrap() == Err(ProbeFailure::TimedOut));
        assert!(young_rx.try_recv().is_err());
        assert!(pending.complete(young, 210 * MS));
    }

    #[test]
    fn entry_exactly_at_timeout_is_kept() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (_sequence, _rx) = pending.register(0).unwrap();
        assert!(pending.expire(100 * MS, Duration::from_millis(100)).is_empty());
    }

    #[test]
    fn fail_all_resolves_every_waiter() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (_, mut rx1) = pending.register(0).unwrap();
        let (_, mut rx2) = pending.register(0).unwrap();

        assert!(pending.fail_all(ProbeFailure::SessionClosed) == 2);
        assert!(rx1.try_recv().unwrap() == Err(ProbeFailure::SessionClosed));
        assert!(rx2.try_recv().unwrap() == Err(ProbeFailure::SessionClosed));
        assert!(pending.len() == 0);
    }

    #[test]
    fn closed_table_refuses_registration() {
        let mut pending = PendingPings::new(SequenceNumber::start_value());
        let (_, mut rx) = pending.register(0).unwrap();

        assert!(pending.close(ProbeFailure::ConnectionLost) == 1);
        assert!(rx.try_recv().unwrap() == Err(ProbeFailure::ConnectionLost));
        assert!(matches!(pending.register(0), Err(ProbeFailure::ConnectionLost)));

        // The first reason sticks.
        pending.close(ProbeFailure::SessionClosed);
        assert!(matches!(pending.register(0), Err(ProbeFailure::ConnectionLost)));
    }
}
