use crate::{
    ConfigError, MonotonicClock, PingConfig, PingResult, PingSendingError, PingSession, PingStatistics, SessionInitiating,
    SessionToken, UdpConnectable,
};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

type TransportFactory<T> = Box<dyn Fn() -> T + Send + Sync>;

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Pings at a fixed cadence for as long as the consumer keeps pulling.
///
/// Nothing happens before the first call to [`next`](Self::next). When the
/// server expires the session, the producer replaces it with a freshly
/// initiated one on a new transport and carries on; the consumer only sees
/// the next tick's result. Dropping the producer or cancelling its
/// [`stop_token`](Self::stop_token) tears the session down.
pub struct PingProducer<I, T, C>
where
    I: SessionInitiating,
    T: UdpConnectable,
    C: MonotonicClock,
{
    initiator: Arc<I>,
    transport_factory: TransportFactory<T>,
    clock: Arc<C>,
    config: PingConfig,
    session: Option<(PingSession<I, T, C>, SessionToken)>,
    ticker: Option<Interval>,
    stop: CancellationToken,
    statistics: PingStatistics,
    initiation_failures: u32,
    finished: bool,
}

impl<I, T, C> PingProducer<I, T, C>
where
    I: SessionInitiating,
    T: UdpConnectable,
    C: MonotonicClock,
{
    /// `transport_factory` is called for every session the producer initiates.
    pub fn new<F>(initiator: Arc<I>, transport_factory: F, clock: Arc<C>, config: PingConfig) -> Result<Self, ConfigError>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(PingProducer {
            initiator,
            transport_factory: Box::new(transport_factory),
            clock,
            config,
            session: None,
            ticker: None,
            stop: CancellationToken::new(),
            statistics: PingStatistics::default(),
            initiation_failures: 0,
            finished: false,
        })
    }

    /// Cancelling the returned token ends the sequence at the next pull.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    #[must_use]
    pub fn statistics(&self) -> &PingStatistics {
        &self.statistics
    }

    /// Token of the session currently in use, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<&SessionToken> {
        self.session.as_ref().map(|(_, token)| token)
    }

    /// Waits for the next tick and returns its result, or `None` once the
    /// producer is stopped or gave up initiating sessions.
    pub async fn next(&mut self) -> Option<PingResult> {
        loop {
            if self.finished {
                return None;
            }

            let period = self.config.interval;
            let ticker = self.ticker.get_or_insert_with(|| delayed_interval(period));
            let stopped = tokio::select! {
                biased;
                () = self.stop.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if stopped {
                self.shutdown();
                return None;
            }

            if self.session.is_none() {
                if let Err(e) = self.start_session().await {
                    return Some(self.initiation_failed(e));
                }
            }

            let Some(outcome) = self.ping_once().await else {
                self.shutdown();
                return None;
            };
            match outcome {
                Err(PingSendingError::NeedsReinitialization) => {
                    info!("ping session expired, reinitiating");
                    self.statistics.record_reinitiation();
                    if let Err(e) = self.start_session().await {
                        return Some(self.initiation_failed(e));
                    }
                }
                Err(e) if e.is_session_fatal() => {
                    warn!("dropping ping session: {}", e);
                    self.session = None;
                    return Some(self.emit(PingResult::Error(e)));
                }
                outcome => return Some(self.emit(outcome.into())),
            }
        }
    }

    /// The producer as a [`Stream`] of ping results.
    pub fn into_stream(self) -> impl Stream<Item = PingResult> {
        futures::stream::unfold(self, |mut producer| async move {
            let result = producer.next().await?;
            Some((result, producer))
        })
    }

    async fn start_session(&mut self) -> Result<(), PingSendingError> {
        // The old session goes first so its transport is released before a new one opens.
        self.session = None;
        let transport = (self.transport_factory)();
        let mut session = PingSession::new(self.initiator.clone(), transport, self.clock.clone(), &self.config);
        let token = session.initiate_ping_session().await?;
        self.session = Some((session, token));
        self.initiation_failures = 0;
        Ok(())
    }

    fn initiation_failed(&mut self, e: PingSendingError) -> PingResult {
        self.initiation_failures += 1;
        if self.initiation_failures >= self.config.max_initiation_failures {
            error!(failures = self.initiation_failures, "giving up initiating ping sessions: {}", e);
            self.finished = true;
        } else {
            warn!(failures = self.initiation_failures, "could not initiate ping session: {}", e);
        }
        self.emit(PingResult::Error(e))
    }

    /// Sends one ping and sweeps expired probes until it resolves. `None` if
    /// the producer was stopped meanwhile.
    async fn ping_once(&self) -> Option<Result<Duration, PingSendingError>> {
        let Some((session, token)) = self.session.as_ref() else {
            return Some(Err(PingSendingError::NotInitiated));
        };
        let mut sweep = delayed_interval(self.config.cleanup_interval);
        sweep.tick().await;

        let ping = session.send_ping(token);
        tokio::pin!(ping);
        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return None,
                result = &mut ping => return Some(result),
                _ = sweep.tick() => {
                    session.cleanup_expired_pings();
                }
            }
        }
    }

    fn emit(&mut self, result: PingResult) -> PingResult {
        trace!(?result, "ping result");
        self.statistics.record(&result);
        result
    }

    fn shutdown(&mut self) {
        if self.session.take().is_some() {
            info!("ping producer stopped");
        }
        self.finished = true;
    }
}
