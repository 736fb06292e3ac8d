#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

//! UDP ping probing against RMBT-style measurement servers.
//!
//! A [`PingSession`] turns "send a probe, await its matching reply" into one
//! `async` call. A [`PingProducer`] drives a session at a fixed cadence and
//! yields a lazily-pulled sequence of [`PingResult`] values, replacing the
//! session whenever the server reports it expired.

pub use clock::{ManualClock, MonotonicClock, RuntimeClock};
pub use config::{ConfigError, PingConfig};
pub use error::{InitiationError, PingSendingError, TransportError};
pub use initiator::{
    IpVersion, PortField, SessionBootstrap, SessionCredentials, SessionInitiating, SessionInitiation,
    StaticSessionInitiator,
};
pub use ping_codec::{decode_request, decode_response, encode_request, encode_response};
pub use ping_codec::{PacketTag, PingRequest, PingResponse};
pub use ping_producer::PingProducer;
pub use ping_result::PingResult;
pub use ping_session::{PingSession, SessionToken};
pub use statistics::PingStatistics;
pub use transport::{TokioUdpTransport, UdpConnectable};

mod clock;
mod config;
mod error;
mod initiator;
mod pending_pings;
mod ping_codec;
mod ping_producer;
mod ping_result;
mod ping_session;
mod sequence_number;
mod statistics;
mod transport;
