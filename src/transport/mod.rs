use crate::{IpVersion, TransportError};
use std::future::Future;

pub use tokio_udp::TokioUdpTransport;

mod tokio_udp;

/// An unreliable datagram channel to one measurement server.
///
/// `send` and `receive` take `&self` so that one task can wait in `receive`
/// while others send.
pub trait UdpConnectable: Send + Sync + 'static {
    /// Opens the channel to `host:port`. With an `ip_version`, only addresses
    /// of that family are considered.
    fn start(
        &self,
        host: &str,
        port: &str,
        ip_version: Option<IpVersion>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enqueues one datagram. Never waits for a reply.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound datagram. Fails with
    /// [`TransportError::Closed`] once the channel is cancelled.
    fn receive(&self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Releases the channel. Idempotent.
    fn cancel(&self);
}
