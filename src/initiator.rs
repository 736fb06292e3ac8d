use crate::InitiationError;
use serde::Deserialize;
use std::fmt;
use std::future::Future;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "4", alias = "IPv4", alias = "ipv4")]
    V4,
    #[serde(rename = "6", alias = "IPv6", alias = "ipv6")]
    V6,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Credentials for one ping session as handed out by the control server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionInitiation {
    pub server_address: String,
    pub server_port: String,
    /// Base64 encoded; the decoded bytes are appended to every request.
    pub token: String,
    pub ip_version: Option<IpVersion>,
}

/// Diagnostic view of an initiated session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionCredentials {
    pub token: String,
    pub host: String,
    pub port: String,
    pub ip_version: Option<IpVersion>,
}

impl From<&SessionInitiation> for SessionCredentials {
    fn from(initiation: &SessionInitiation) -> Self {
        SessionCredentials {
            token: initiation.token.clone(),
            host: initiation.server_address.clone(),
            port: initiation.server_port.clone(),
            ip_version: initiation.ip_version,
        }
    }
}

/// Source of fresh session credentials.
///
/// Every call must yield an independent credential set; a
/// [`PingSession`](crate::PingSession) calls it on every (re-)initiation.
pub trait SessionInitiating: Send + Sync + 'static {
    fn initiate(&self) -> impl Future<Output = Result<SessionInitiation, InitiationError>> + Send;
}

/// Coverage session bootstrap response of the control server.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBootstrap {
    #[serde(rename = "testUUID", alias = "testUuid")]
    pub test_uuid: String,
    pub ping_token: String,
    pub ping_host: String,
    pub ping_port: PortField,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
    #[serde(default)]
    pub max_coverage_session_seconds: Option<u64>,
    #[serde(default)]
    pub max_coverage_measurement_seconds: Option<u64>,
}

/// The control server sends the port either as a number or as a string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum PortField {
    Number(u16),
    Text(String),
}

impl fmt::Display for PortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortField::Number(port) => write!(f, "{port}"),
            PortField::Text(port) => write!(f, "{port}"),
        }
    }
}

impl From<&SessionBootstrap> for SessionInitiation {
    fn from(bootstrap: &SessionBootstrap) -> Self {
        SessionInitiation {
            server_address: bootstrap.ping_host.clone(),
            server_port: bootstrap.ping_port.to_string(),
            token: bootstrap.ping_token.clone(),
            ip_version: bootstrap.ip_version,
        }
    }
}

/// Hands out the same pre-fetched credentials on every call.
#[derive(Clone, Debug)]
pub struct StaticSessionInitiator {
    initiation: SessionInitiation,
}

impl StaticSessionInitiator {
    #[must_use]
    pub fn new(initiation: SessionInitiation) -> Self {
        StaticSessionInitiator { initiation }
    }
}

impl From<&SessionBootstrap> for StaticSessionInitiator {
    fn from(bootstrap: &SessionBootstrap) -> Self {
        StaticSessionInitiator::new(bootstrap.into())
    }
}

impl SessionInitiating for StaticSessionInitiator {
    async fn initiate(&self) -> Result<SessionInitiation, InitiationError> {
        Ok(self.initiation.clone())
    }
}
