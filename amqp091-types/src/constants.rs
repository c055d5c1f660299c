//! Protocol constants

/// Major version carried in the protocol header
pub const MAJOR: u8 = 0;

/// Minor version carried in the protocol header
pub const MINOR: u8 = 9;

/// Revision carried in the protocol header
pub const REVISION: u8 = 1;

/// Class id of the `connection` class
pub const CLASS_CONNECTION: u16 = 10;

/// Class id of the `channel` class
pub const CLASS_CHANNEL: u16 = 20;

/// Class id of the `exchange` class
pub const CLASS_EXCHANGE: u16 = 40;

/// Class id of the `queue` class
pub const CLASS_QUEUE: u16 = 50;

/// Class id of the `basic` class
pub const CLASS_BASIC: u16 = 60;

/// Reply code indicating a normal close
pub const REPLY_SUCCESS: u16 = 200;

/// Reply code sent when a frame violates the framing rules
pub const FRAME_ERROR: u16 = 501;

/// Reply code sent when the peer sends a method that is not allowed in the current state
pub const UNEXPECTED_FRAME: u16 = 505;

/// Reply code for a failure that cannot be attributed to the peer
pub const INTERNAL_ERROR: u16 = 541;
