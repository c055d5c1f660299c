//! Implements errors associated with the connection

use std::io;

use crate::{channel, transport};

use super::ConnectionState;

/// Errors associated with [`crate::Connection`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] transport::Error),

    /// Error while exchanging methods on a channel, including the control channel
    #[error(transparent)]
    Channel(#[from] channel::Error),

    /// The operation is not allowed in the current state
    #[error("Illegal connection state {0:?}")]
    IllegalState(ConnectionState),

    /// The broker did not complete the handshake in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// The handshake failed, the reason was reported to the delegate
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The broker does not offer the mechanism of the credential provider
    #[error("Mechanism {mechanism} not offered by the broker ({offered})")]
    MechanismNotSupported {
        /// Mechanism of the credential provider
        mechanism: String,
        /// Space separated mechanisms offered by the broker
        offered: String,
    },

    /// All channel numbers up to the negotiated channel-max are in use
    #[error("Reached the maximum number of channels")]
    ChannelMaxReached,
}

/// Errors while opening a connection from a url
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The url cannot be parsed
    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    /// Only `amqp` is supported
    #[error("Invalid scheme {0}")]
    InvalidScheme(String),

    /// The url has no host
    #[error("Invalid domain")]
    InvalidDomain,

    /// The connection was created but could not be opened
    #[error(transparent)]
    Connection(#[from] Error),
}
