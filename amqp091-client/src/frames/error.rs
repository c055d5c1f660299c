use std::io;

/// Errors raised by the frame codec
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// A method frame payload could not be decoded
    #[error("Decode Error: {0}")]
    Decode(amqp091_types::Error),

    /// A method or content header could not be encoded
    #[error("Encode Error: {0}")]
    Encode(amqp091_types::Error),

    /// The frame-end octet is not `0xCE`
    #[error("Framing Error")]
    FramingError,

    /// Unknown frame type octet
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The frame is larger than the negotiated frame-max
    #[error("Frame size {0} exceeds the negotiated maximum")]
    MaxFrameSizeExceeded(usize),

    /// The peer rejected our protocol header by answering with the version it supports
    #[error("Protocol header mismatch {0:?}")]
    ProtocolHeaderMismatch([u8; 8]),
}
