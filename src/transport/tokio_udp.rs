use super::UdpConnectable;
use crate::{IpVersion, TransportError};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 1500;

struct Channel {
    socket: Arc<UdpSocket>,
    cancelled: CancellationToken,
}

/// [`UdpConnectable`] backed by a connected tokio UDP socket.
///
/// The transport can be started again after [`cancel`](UdpConnectable::cancel).
pub struct TokioUdpTransport {
    channel: Mutex<Option<Channel>>,
    receive_buffer_size: usize,
}

impl TokioUdpTransport {
    #[must_use]
    pub fn new() -> Self {
        TokioUdpTransport { channel: Mutex::new(None), receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE }
    }

    /// Datagrams longer than `size` are truncated on receive.
    #[must_use]
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    fn current(&self) -> Result<(Arc<UdpSocket>, CancellationToken), TransportError> {
        // A poisoned lock means a panic elsewhere; propagate it.
        match &*self.channel.lock().unwrap() {
            Some(channel) if !channel.cancelled.is_cancelled() => {
                Ok((channel.socket.clone(), channel.cancelled.clone()))
            }
            Some(_) => Err(TransportError::Closed),
            None => Err(TransportError::NotStarted),
        }
    }
}

impl Default for TokioUdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn connected_socket(remote: SocketAddr) -> Result<UdpSocket, TransportError> {
    tracing::trace!(%remote, "creating UDP socket");
    let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))?;
    let local = match remote.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(local))?;
    socket.connect(&SockAddr::from(remote))?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// First resolved address of the requested family, or of any family.
fn select_address(
    mut resolved: impl Iterator<Item = SocketAddr>,
    ip_version: Option<IpVersion>,
) -> Option<SocketAddr> {
    resolved.find(|address| match ip_version {
        None => true,
        Some(IpVersion::V4) => address.is_ipv4(),
        Some(IpVersion::V6) => address.is_ipv6(),
    })
}

impl UdpConnectable for TokioUdpTransport {
    async fn start(&self, host: &str, port: &str, ip_version: Option<IpVersion>) -> Result<(), TransportError> {
        let port_number: u16 = port.parse().map_err(|_| TransportError::InvalidPort(port.to_string()))?;
        let resolved = tokio::net::lookup_host((host, port_number)).await?;
        let remote = select_address(resolved, ip_version).ok_or_else(|| TransportError::Unresolvable {
            host: host.to_string(),
            port: port_number,
            ip_version,
        })?;
        let socket = connected_socket(remote)?;
        tracing::debug!(%remote, "UDP transport started");

        let previous = self
            .channel
            .lock()
            .unwrap()
            .replace(Channel { socket: Arc::new(socket), cancelled: CancellationToken::new() });
        if let Some(previous) = previous {
            previous.cancelled.cancel();
        }
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let (socket, _) = self.current()?;
        socket.send(data).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let (socket, cancelled) = self.current()?;
        let mut buf = vec![0u8; self.receive_buffer_size];
        tokio::select! {
            () = cancelled.cancelled() => Err(TransportError::Closed),
            received = socket.recv(&mut buf) => {
                let n = received?;
                buf.truncate(n);
                Ok(buf)
            }
        }
    }

    fn cancel(&self) {
        if let Some(channel) = &*self.channel.lock().unwrap() {
            if !channel.cancelled.is_cancelled() {
                tracing::debug!("UDP transport cancelled");
                channel.cancelled.cancel();
            }
        }
    }
}
