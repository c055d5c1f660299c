//! Definition of the primitive types

mod decimal;
mod short_string;
mod timestamp;

pub use crate::primitives::decimal::*;
pub use crate::primitives::short_string::*;
pub use crate::primitives::timestamp::*;

/// Integer in the range 0 to 2^8-1 inclusive
///
/// label = "octet"
pub type Octet = u8;

/// Integer in the range 0 to 2^16-1 inclusive, network byte order
///
/// label = "short"
pub type Short = u16;

/// Integer in the range 0 to 2^32-1 inclusive, network byte order
///
/// label = "long"
pub type Long = u32;

/// Integer in the range 0 to 2^64-1 inclusive, network byte order
///
/// label = "longlong"
pub type LongLong = u64;

/// Text prefixed with a four-octet length
///
/// label = "longstr"
pub type LongString = String;
