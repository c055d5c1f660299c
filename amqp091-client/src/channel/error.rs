use amqp091_types::MethodKind;

use crate::transport;

/// Errors associated with [`crate::Channel`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The channel is closing or closed and accepts no further commands
    #[error("Channel is closed")]
    Closed,

    /// The broker closed the channel
    #[error("Channel closed by server ({reply_code}): {reply_text}")]
    ClosedByServer {
        /// Reply code sent by the broker
        reply_code: u16,
        /// Reply text sent by the broker
        reply_text: String,
    },

    /// The expected reply did not arrive in time
    #[error("Timed out waiting for {0}")]
    ReplyTimeout(MethodKind),

    /// A different method arrived than the one being waited for
    #[error("Expecting {expected}, found {found}")]
    UnexpectedMethod {
        /// The awaited method
        expected: MethodKind,
        /// The method that arrived
        found: MethodKind,
    },

    /// Transport error
    #[error(transparent)]
    Transport(#[from] transport::Error),

    /// A method could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] amqp091_types::Error),

    /// The connection owning this channel is gone
    #[error("Connection dropped")]
    ConnectionDropped,
}
