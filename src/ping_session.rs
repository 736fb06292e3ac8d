#![allow(clippy::missing_panics_doc)] // poisoned pending table

//! One authorized UDP exchange with a measurement server.
//!
//! A [`PingSession`] owns a transport and the table of outstanding probes.
//! A spawned task reads datagrams from the transport and resolves the probe
//! whose sequence number they carry; [`PingSession::send_ping`] only
//! registers, sends and waits.

use crate::pending_pings::{PendingPings, ProbeFailure};
use crate::ping_codec::{decode_response, encode_request, PacketTag};
use crate::sequence_number::SequenceNumber;
use crate::{
    MonotonicClock, PingConfig, PingSendingError, SessionCredentials, SessionInitiating,
    TransportError, UdpConnectable,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Proof of an initiated session, handed back to [`PingSession::send_ping`].
///
/// Only this crate can construct it.
#[derive(Clone, Debug)]
pub struct SessionToken {
    session_id: u64,
    credentials: SessionCredentials,
}

impl SessionToken {
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    #[must_use]
    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }
}

struct SessionInner<T, C>
where
    T: UdpConnectable,
    C: MonotonicClock,
{
    transport: T,
    clock: Arc<C>,
    pending: Mutex<PendingPings>,
}

impl<T, C> SessionInner<T, C>
where
    T: UdpConnectable,
    C: MonotonicClock,
{
    fn dispatch(&self, datagram: &[u8]) {
        let Some(response) = decode_response(datagram) else {
            trace!(len = datagram.len(), "discarding malformed datagram");
            return;
        };
        let now = self.clock.now_nanos();
        let sequence = SequenceNumber::from(response.sequence);
        let mut pending = self.pending.lock().unwrap();
        let matched = match response.tag {
            PacketTag::Reply => pending.complete(sequence, now),
            PacketTag::Error if response.sequence == 0 => {
                let failed = pending.fail_all(ProbeFailure::NeedsReinitialization);
                info!(failed, "server expired the whole session");
                failed > 0
            }
            PacketTag::Error => pending.fail(sequence, ProbeFailure::NeedsReinitialization),
            PacketTag::Request | PacketTag::Unknown(_) => false,
        };
        if !matched {
            trace!(tag = ?response.tag, sequence = response.sequence, "discarding unmatched response");
        }
    }

    async fn receive_loop(self: Arc<Self>, session_id: u64) {
        trace!(session_id, "receive loop start");
        loop {
            match self.transport.receive().await {
                Ok(datagram) => self.dispatch(&datagram),
                Err(TransportError::Closed) => {
                    debug!(session_id, "transport closed");
                    self.pending.lock().unwrap().close(ProbeFailure::SessionClosed);
                    break;
                }
                Err(e) => {
                    warn!(session_id, "error receiving ping response: {}", e);
                    self.pending.lock().unwrap().close(ProbeFailure::ConnectionLost);
                    break;
                }
            }
        }
        trace!(session_id, "receive loop end");
    }
}

struct Initiated {
    token: SessionToken,
    token_bytes: Vec<u8>,
    receive_task: JoinHandle<()>,
}

/// Sends probes to one measurement server and correlates the replies.
///
/// `send_ping` takes `&self`; several probes may be outstanding at once and
/// they resolve in whatever order the replies arrive.
pub struct PingSession<I, T, C>
where
    I: SessionInitiating,
    T: UdpConnectable,
    C: MonotonicClock,
{
    initiator: Arc<I>,
    inner: Arc<SessionInner<T, C>>,
    timeout: Duration,
    initiated: Option<Initiated>,
}

impl<I, T, C> PingSession<I, T, C>
where
    I: SessionInitiating,
    T: UdpConnectable,
    C: MonotonicClock,
{
    #[must_use]
    pub fn new(initiator: Arc<I>, transport: T, clock: Arc<C>, config: &PingConfig) -> Self {
        PingSession {
            initiator,
            inner: Arc::new(SessionInner {
                transport,
                clock,
                pending: Mutex::new(PendingPings::new(SequenceNumber::random_start_value())),
            }),
            timeout: config.timeout,
            initiated: None,
        }
    }

    /// Fetches fresh credentials, opens the transport and starts listening.
    ///
    /// Calling it again on an initiated session first tears the old
    /// initiation down; its outstanding probes fail with
    /// [`PingSendingError::SessionClosed`].
    pub async fn initiate_ping_session(&mut self) -> Result<SessionToken, PingSendingError> {
        self.teardown();

        let initiation = self.initiator.initiate().await?;
        let token_bytes = BASE64.decode(initiation.token.as_bytes())?;
        self.inner
            .transport
            .start(&initiation.server_address, &initiation.server_port, initiation.ip_version)
            .await?;

        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        *self.inner.pending.lock().unwrap() = PendingPings::new(SequenceNumber::random_start_value());
        let receive_task = tokio::spawn(self.inner.clone().receive_loop(session_id));

        let token = SessionToken { session_id, credentials: SessionCredentials::from(&initiation) };
        info!(
            session_id,
            host = %initiation.server_address,
            port = %initiation.server_port,
            "ping session initiated"
        );
        self.initiated = Some(Initiated { token: token.clone(), token_bytes, receive_task });
        Ok(token)
    }

    /// Sends one probe and waits for its reply. Returns the round trip time.
    ///
    /// The wait ends with [`PingSendingError::TimedOut`] only when
    /// [`cleanup_expired_pings`](Self::cleanup_expired_pings) finds the probe
    /// expired; the session does not schedule sweeps itself.
    pub async fn send_ping(&self, token: &SessionToken) -> Result<Duration, PingSendingError> {
        let initiated = self.initiated.as_ref().ok_or(PingSendingError::NotInitiated)?;
        if initiated.token.session_id != token.session_id {
            return Err(PingSendingError::TokenMismatch);
        }

        // Fails once the receive loop has ended; no reply could be dispatched anymore.
        let (sequence, waiter) = self.inner.pending.lock().unwrap().register(self.inner.clock.now_nanos())?;
        let datagram = encode_request(sequence.into(), &initiated.token_bytes);
        if let Err(e) = self.inner.transport.send(&datagram).await {
            warn!(sequence = u32::from(sequence), "error sending ping: {}", e);
            self.inner.pending.lock().unwrap().forget(sequence);
            return Err(e.into());
        }
        trace!(sequence = u32::from(sequence), "ping sent");

        match waiter.await {
            Ok(Ok(rtt)) => {
                trace!(sequence = u32::from(sequence), ?rtt, "ping completed");
                Ok(rtt)
            }
            Ok(Err(failure)) => {
                debug!(sequence = u32::from(sequence), ?failure, "ping failed");
                Err(failure.into())
            }
            // The table was dropped together with the session.
            Err(_) => Err(PingSendingError::SessionClosed),
        }
    }

    /// Fails every probe older than the configured timeout. Returns how many
    /// probes were expired.
    pub fn cleanup_expired_pings(&self) -> usize {
        let now = self.inner.clock.now_nanos();
        let expired = self.inner.pending.lock().unwrap().expire(now, self.timeout);
        for sequence in &expired {
            debug!(sequence = u32::from(*sequence), timeout = ?self.timeout, "ping timed out");
        }
        expired.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_initiated(&self) -> bool {
        self.initiated.is_some()
    }

    /// Stops listening, releases the transport and fails all outstanding probes.
    pub fn close(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(initiated) = self.initiated.take() {
            initiated.receive_task.abort();
            self.inner.transport.cancel();
            // Also runs from Drop, so a poisoned table is left alone instead of panicking.
            if let Ok(mut pending) = self.inner.pending.lock() {
                let failed = pending.close(ProbeFailure::SessionClosed);
                debug!(session_id = initiated.token.session_id, failed, "ping session closed");
            }
        }
    }
}

impl<I, T, C> Drop for PingSession<I, T, C>
where
    I: SessionInitiating,
    T: UdpConnectable,
    C: MonotonicClock,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

impl From<ProbeFailure> for PingSendingError {
    fn from(failure: ProbeFailure) -> Self {
        match failure {
            ProbeFailure::NeedsReinitialization => PingSendingError::NeedsReinitialization,
            ProbeFailure::TimedOut => PingSendingError::TimedOut,
            ProbeFailure::ConnectionLost => PingSendingError::ConnectionLost,
            ProbeFailure::SessionClosed => PingSendingError::SessionClosed,
        }
    }
}
