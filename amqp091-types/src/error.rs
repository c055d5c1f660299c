//! Custom error

/// Errors raised while encoding values or decoding methods.
///
/// Reading primitives never produces an error, see [`crate::read::Parser`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The class id and method id pair does not name a known method
    #[error("Unknown method (class {class_id}, method {method_id})")]
    UnknownMethod {
        /// Class id found on the wire
        class_id: u16,
        /// Method id found on the wire
        method_id: u16,
    },

    /// A short string (including field table keys) is limited to 255 bytes
    #[error("Short string of {0} bytes exceeds 255 bytes")]
    ShortStringTooLong(usize),

    /// A long string, byte array, array or table must fit a 32-bit length
    #[error("Value of {0} bytes exceeds the 32-bit length prefix")]
    TooLong(usize),
}
