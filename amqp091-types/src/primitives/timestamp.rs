/// An absolute point in time
///
/// label = "64-bit POSIX time_t format with an accuracy of one second"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a new [`Timestamp`] from seconds since the unix epoch
    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    /// Get the timestamp value as seconds
    pub fn seconds(&self) -> u64 {
        self.0
    }

    /// Consume the wrapper into the inner u64
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(val: u64) -> Self {
        Self(val)
    }
}
