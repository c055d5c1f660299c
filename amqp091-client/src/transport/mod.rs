//! The byte-stream boundary between a connection and the network

use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;

use crate::frames::Frame;

mod error;
pub mod protocol_header;
mod tcp;

pub use error::Error;
pub use tcp::TcpTransport;

/// Receives what a [`Transport`] reads from the peer
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// A complete frame arrived
    async fn handle_frame(&self, frame: Frame);

    /// The stream failed or was closed by the peer. No frame follows.
    async fn handle_transport_error(&self, error: Error);
}

/// An abstract byte stream carrying frames to and from the broker
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens the stream. Inbound frames are pushed to `handler` until the stream ends.
    async fn connect(&self, handler: Weak<dyn FrameHandler>) -> Result<(), Error>;

    /// Writes `bytes` as one unit. Frames in one call are never interleaved with another call.
    async fn send(&self, bytes: Bytes) -> Result<(), Error>;

    /// Closes the stream. Safe to call when not connected.
    async fn disconnect(&self);

    /// Whether the stream is open
    fn is_connected(&self) -> bool;
}
