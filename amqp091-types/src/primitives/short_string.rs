use std::{fmt, ops::Deref};

/// Text of at most 255 bytes prefixed with a one-octet length
///
/// label = "shortstr"
///
/// The length is only checked when encoding, see [`crate::Error::ShortStringTooLong`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortString(String);

impl ShortString {
    /// Maximum number of bytes a short string can carry
    pub const MAX_LEN: usize = u8::MAX as usize;

    /// Creates a new [`ShortString`]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get a reference to the string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper into the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for ShortString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ShortString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShortString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ShortString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ShortString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ShortString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ShortString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
