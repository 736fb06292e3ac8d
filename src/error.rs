use crate::IpVersion;
use thiserror::Error;

/// Errors of a [`UdpConnectable`](crate::UdpConnectable) channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("could not resolve {host}:{port}{}", family_suffix(.ip_version))]
    Unresolvable { host: String, port: u16, ip_version: Option<IpVersion> },

    #[error("transport not started")]
    NotStarted,

    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn family_suffix(ip_version: &Option<IpVersion>) -> String {
    ip_version.map(|v| format!(" over {v}")).unwrap_or_default()
}

/// Errors of a [`SessionInitiating`](crate::SessionInitiating) collaborator.
#[derive(Debug, Clone, Error)]
pub enum InitiationError {
    /// The control server refused to hand out ping credentials.
    #[error("session initiation rejected: {0}")]
    Rejected(String),

    #[error("control server unreachable: {0}")]
    Unreachable(String),

    #[error("malformed session initiation: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PingSendingError {
    /// The server no longer accepts the session token; call
    /// [`PingSession::initiate_ping_session`](crate::PingSession::initiate_ping_session) again.
    #[error("session needs reinitialization")]
    NeedsReinitialization,

    #[error("ping timed out")]
    TimedOut,

    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// The receive path of the session failed while the probe was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    #[error("session initiation failed: {0}")]
    Initiation(#[from] InitiationError),

    #[error("invalid session token: {0}")]
    InvalidToken(#[from] base64::DecodeError),

    #[error("ping session not initiated")]
    NotInitiated,

    #[error("session token does not belong to this ping session")]
    TokenMismatch,

    #[error("ping session closed")]
    SessionClosed,
}

impl PingSendingError {
    /// Errors after which the session cannot serve further probes.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            PingSendingError::NeedsReinitialization
                | PingSendingError::Connection(_)
                | PingSendingError::ConnectionLost
                | PingSendingError::SessionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn fmt_transport_error() {
        let error = TransportError::Unresolvable { host: "example.invalid".to_string(), port: 444, ip_version: None };
        assert_eq!("could not resolve example.invalid:444", format!("{error}"));

        let error =
            TransportError::Unresolvable { host: "localhost".to_string(), port: 444, ip_version: Some(IpVersion::V6) };
        assert_eq!("could not resolve localhost:444 over IPv6", format!("{error}"));
    }

    #[test]
    fn ping_sending_error_from_transport_error() {
        let io_error = std::io::Error::from(ErrorKind::ConnectionRefused);
        let error: PingSendingError = TransportError::from(io_error).into();
        assert!(matches!(error, PingSendingError::Connection(TransportError::Io(_))));
        assert!(error.is_session_fatal());
    }

    #[test]
    fn timeout_is_not_session_fatal() {
        assert!(!PingSendingError::TimedOut.is_session_fatal());
        assert!(PingSendingError::NeedsReinitialization.is_session_fatal());
    }

    #[test]
    fn fmt_initiation_error() {
        let error = PingSendingError::from(InitiationError::Rejected("HTTP 403".to_string()));
        assert_eq!("session initiation failed: session initiation rejected: HTTP 403", error.to_string());
    }
}
