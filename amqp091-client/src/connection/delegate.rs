//! Notification of terminal and broker-initiated connection events

use tokio::sync::mpsc;

/// Events reported to a [`ConnectionDelegate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake failed or timed out, the connection never opened
    HandshakeFailed(String),

    /// The broker closed the connection
    ServerClosed {
        /// Reply code sent by the broker
        reply_code: u16,
        /// Reply text sent by the broker
        reply_text: String,
    },

    /// The transport failed or the peer closed the stream
    TransportLost(String),

    /// The broker broke the protocol, the connection was torn down
    ProtocolViolation(String),

    /// The broker closed a channel
    ChannelClosed {
        /// Channel number
        channel: u16,
        /// Reply code sent by the broker
        reply_code: u16,
        /// Reply text sent by the broker
        reply_text: String,
    },

    /// The broker stopped reading from the connection
    Blocked(String),

    /// The broker resumed reading from the connection
    Unblocked,
}

/// Receives [`ConnectionEvent`]s. Called from the connection's execution context and must not
/// block.
pub trait ConnectionDelegate: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: ConnectionEvent);
}

/// Ignores all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl ConnectionDelegate for NoopDelegate {
    fn on_event(&self, _event: ConnectionEvent) {}
}

impl ConnectionDelegate for mpsc::UnboundedSender<ConnectionEvent> {
    fn on_event(&self, event: ConnectionEvent) {
        // The receiver may be gone
        let _ = self.send(event);
    }
}
