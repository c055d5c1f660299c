use std::io;

use crate::frames;

/// Errors raised at the transport boundary
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The transport is not connected
    #[error("Transport is not connected")]
    NotConnected,

    /// Frame codec error
    #[error(transparent)]
    Frame(frames::Error),

    /// The peer closed the stream
    #[error("Connection closed by peer")]
    ClosedByPeer,
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(e) => Self::Io(e),
            other => Self::Frame(other),
        }
    }
}

impl Error {
    /// Whether the error means the peer broke the framing rules
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::Frame(
                frames::Error::FramingError
                    | frames::Error::UnknownFrameType(_)
                    | frames::Error::MaxFrameSizeExceeded(_)
                    | frames::Error::Decode(_)
                    | frames::Error::ProtocolHeaderMismatch(_)
            )
        )
    }
}
