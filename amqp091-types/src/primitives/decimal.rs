use std::fmt;

/// A fixed point number carried as `value * 10^-scale`
///
/// encoding = scale octet followed by a 32-bit unsigned value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    scale: u8,
    value: u32,
}

impl Decimal {
    /// Creates a new decimal from the number of decimal places and the unscaled value
    pub fn new(scale: u8, value: u32) -> Self {
        Self { scale, value }
    }

    /// Number of decimal places
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// The unscaled value
    pub fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let digits = format!("{:0>width$}", self.value, width = self.scale as usize + 1);
        let (int, frac) = digits.split_at(digits.len() - self.scale as usize);
        write!(f, "{}.{}", int, frac)
    }
}
