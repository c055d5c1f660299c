//! AMQP 0-9-1 frames and the corresponding encoder and decoder

mod amqp;
mod error;

pub use amqp::*;
pub use error::Error;

/// Frame type of a method frame
pub const FRAME_METHOD: u8 = 1;

/// Frame type of a content header frame
pub const FRAME_HEADER: u8 = 2;

/// Frame type of a content body frame
pub const FRAME_BODY: u8 = 3;

/// Frame type of a heartbeat frame
pub const FRAME_HEARTBEAT: u8 = 8;

/// Octet that terminates every frame
pub const FRAME_END: u8 = 0xCE;

/// Type, channel and size
pub const FRAME_HEADER_SIZE: usize = 7;

/// Header plus frame-end octet
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;
