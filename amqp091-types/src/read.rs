//! Defensive reader over an inbound byte buffer

use bytes::Bytes;

use crate::{
    primitives::{Decimal, Timestamp},
    value::{FieldTable, FieldValue},
};

/// Tables and arrays nested deeper than this are treated as truncated input
pub const MAX_NESTING_DEPTH: usize = 32;

/// A cursor over an immutable byte buffer.
///
/// The cursor only ever advances. A read that needs more bytes than remain moves the cursor
/// to the end of the buffer and yields the type's default (`0`, `false`, `""`, empty table).
/// Every read after that also yields the default, so a truncated frame degrades instead of
/// failing. [`Parser::is_truncated`] tells whether that happened.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
    truncated: bool,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser positioned at the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
            depth: 0,
        }
    }

    fn nested(buf: &'a [u8], depth: usize) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
            depth,
        }
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the cursor reached the end of the buffer
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Whether any read ran past the end of the buffer
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes that have not been consumed yet
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        match self.pos.checked_add(n) {
            Some(end) if end <= self.buf.len() => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Some(slice)
            }
            _ => {
                self.pos = self.buf.len();
                self.truncated = true;
                None
            }
        }
    }

    fn take_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(slice) = self.take(N) {
            out.copy_from_slice(slice);
        }
        out
    }

    /// Reads an unsigned octet, `0` once exhausted
    pub fn parse_octet(&mut self) -> u8 {
        self.take_array::<1>()[0]
    }

    /// Reads an octet where any non-zero value is `true`, `false` once exhausted
    pub fn parse_boolean(&mut self) -> bool {
        self.parse_octet() != 0
    }

    /// Reads a big-endian `u16`
    pub fn parse_short(&mut self) -> u16 {
        u16::from_be_bytes(self.take_array())
    }

    /// Reads a big-endian `u32`
    pub fn parse_long(&mut self) -> u32 {
        u32::from_be_bytes(self.take_array())
    }

    /// Reads a big-endian `u64`
    pub fn parse_long_long(&mut self) -> u64 {
        u64::from_be_bytes(self.take_array())
    }

    /// Reads a signed octet
    pub fn parse_signed_octet(&mut self) -> i8 {
        i8::from_be_bytes(self.take_array())
    }

    /// Reads a big-endian `i16`
    pub fn parse_signed_short(&mut self) -> i16 {
        i16::from_be_bytes(self.take_array())
    }

    /// Reads a big-endian `i32`
    pub fn parse_signed_long(&mut self) -> i32 {
        i32::from_be_bytes(self.take_array())
    }

    /// Reads a big-endian `i64`
    pub fn parse_signed_long_long(&mut self) -> i64 {
        i64::from_be_bytes(self.take_array())
    }

    /// Reads an IEEE-754 single precision float
    pub fn parse_float(&mut self) -> f32 {
        f32::from_be_bytes(self.take_array())
    }

    /// Reads an IEEE-754 double precision float
    pub fn parse_double(&mut self) -> f64 {
        f64::from_be_bytes(self.take_array())
    }

    /// Reads a one-octet length followed by that many bytes of text.
    ///
    /// Returns an empty string when fewer bytes remain than the declared length.
    pub fn parse_short_string(&mut self) -> String {
        let len = self.parse_octet() as usize;
        self.take_text(len)
    }

    /// Reads a four-octet length followed by that many bytes of text.
    ///
    /// Returns an empty string when fewer bytes remain than the declared length.
    pub fn parse_long_string(&mut self) -> String {
        let len = self.parse_long() as usize;
        self.take_text(len)
    }

    fn take_text(&mut self, len: usize) -> String {
        self.take(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Reads a four-octet length followed by raw bytes
    pub fn parse_byte_array(&mut self) -> Bytes {
        let len = self.parse_long() as usize;
        self.take(len)
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    /// Reads a 64-bit POSIX timestamp
    pub fn parse_timestamp(&mut self) -> Timestamp {
        Timestamp::from(self.parse_long_long())
    }

    /// Reads a scale octet followed by a `u32` value
    pub fn parse_decimal(&mut self) -> Decimal {
        let scale = self.parse_octet();
        let value = self.parse_long();
        Decimal::new(scale, value)
    }

    /// Reads `len` raw bytes, or nothing when fewer remain
    pub fn parse_bytes(&mut self, len: usize) -> Bytes {
        self.take(len)
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    /// Reads a length-prefixed field table.
    ///
    /// Entries decoded before an unknown type tag or a truncated value are kept. The cursor
    /// is always placed after the declared table length.
    pub fn parse_field_table(&mut self) -> FieldTable {
        let len = self.parse_long() as usize;
        let mut table = FieldTable::new();
        let slice = match self.take(len) {
            Some(slice) => slice,
            None => return table,
        };
        if self.depth >= MAX_NESTING_DEPTH {
            return table;
        }

        let mut inner = Parser::nested(slice, self.depth + 1);
        while !inner.is_exhausted() {
            let key = inner.parse_short_string();
            let tag = inner.parse_octet();
            if inner.is_truncated() {
                break;
            }
            match inner.parse_field_value(tag) {
                Some(value) if !inner.is_truncated() => {
                    table.insert(key, value);
                }
                _ => break,
            }
        }
        table
    }

    /// Reads a length-prefixed array of tagged values
    pub fn parse_field_array(&mut self) -> Vec<FieldValue> {
        let len = self.parse_long() as usize;
        let mut values = Vec::new();
        let slice = match self.take(len) {
            Some(slice) => slice,
            None => return values,
        };
        if self.depth >= MAX_NESTING_DEPTH {
            return values;
        }

        let mut inner = Parser::nested(slice, self.depth + 1);
        while !inner.is_exhausted() {
            let tag = inner.parse_octet();
            match inner.parse_field_value(tag) {
                Some(value) if !inner.is_truncated() => values.push(value),
                _ => break,
            }
        }
        values
    }

    /// Reads the value that follows a type tag. Returns `None` for an unknown tag.
    pub fn parse_field_value(&mut self, tag: u8) -> Option<FieldValue> {
        let value = match tag {
            b't' => FieldValue::Boolean(self.parse_boolean()),
            b'b' => FieldValue::ShortShortInt(self.parse_signed_octet()),
            b'B' => FieldValue::ShortShortUint(self.parse_octet()),
            b's' => FieldValue::ShortInt(self.parse_signed_short()),
            b'u' => FieldValue::ShortUint(self.parse_short()),
            b'I' => FieldValue::LongInt(self.parse_signed_long()),
            b'i' => FieldValue::LongUint(self.parse_long()),
            b'l' => FieldValue::LongLongInt(self.parse_signed_long_long()),
            b'L' => FieldValue::LongLongUint(self.parse_long_long()),
            b'f' => FieldValue::Float(self.parse_float().into()),
            b'd' => FieldValue::Double(self.parse_double().into()),
            b'D' => FieldValue::Decimal(self.parse_decimal()),
            b'S' => FieldValue::LongString(self.parse_long_string()),
            b'x' => FieldValue::ByteArray(self.parse_byte_array()),
            b'A' => FieldValue::FieldArray(self.parse_field_array()),
            b'T' => FieldValue::Timestamp(self.parse_timestamp()),
            b'F' => FieldValue::FieldTable(self.parse_field_table()),
            b'V' => FieldValue::Void,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Parser;
    use crate::value::FieldValue;

    #[test]
    fn octet_returns_zero_once_exhausted() {
        let mut parser = Parser::new(&[7]);
        assert_eq!(parser.parse_octet(), 7);
        for _ in 0..5 {
            assert_eq!(parser.parse_octet(), 0);
        }
        assert!(parser.is_truncated());
        assert!(parser.is_exhausted());
    }

    #[test]
    fn boolean_returns_false_once_exhausted() {
        let mut parser = Parser::new(&[0, 2]);
        assert!(!parser.parse_boolean());
        assert!(parser.parse_boolean());
        assert!(!parser.parse_boolean());
        assert!(!parser.parse_boolean());
    }

    #[test]
    fn wide_integer_underflow_consumes_rest() {
        let mut parser = Parser::new(&[0, 0, 1]);
        assert_eq!(parser.parse_long(), 0);
        assert!(parser.is_exhausted());
        assert_eq!(parser.parse_octet(), 0);
    }

    #[test]
    fn short_string_followed_by_truncated_long_string() {
        let mut parser = Parser::new(b"\x04BBBB\x00\x00\x00\x04AAA");
        assert_eq!(parser.parse_short_string(), "BBBB");
        assert_eq!(parser.parse_long_string(), "");
        assert_eq!(parser.parse_long_string(), "");
        assert_eq!(parser.parse_short_string(), "");
    }

    #[test]
    fn long_string_followed_by_truncated_short_string() {
        let mut parser = Parser::new(b"\x00\x00\x00\x04AAAA\x04BBB");
        assert_eq!(parser.parse_long_string(), "AAAA");
        assert_eq!(parser.parse_short_string(), "");
        assert_eq!(parser.parse_short_string(), "");
        assert_eq!(parser.parse_long_string(), "");
    }

    #[test]
    fn string_reads_on_empty_buffer() {
        let mut parser = Parser::new(&[]);
        for _ in 0..3 {
            assert_eq!(parser.parse_short_string(), "");
            assert_eq!(parser.parse_long_string(), "");
            assert_eq!(parser.parse_octet(), 0);
        }
    }

    #[test]
    fn huge_declared_length_does_not_overflow() {
        let mut parser = Parser::new(&[0xff, 0xff, 0xff, 0xff, b'a']);
        assert_eq!(parser.parse_long_string(), "");
        assert!(parser.is_exhausted());
    }

    #[test]
    fn field_table_stops_at_unknown_tag() {
        let mut buf = Vec::new();
        let body = b"\x01at\x01\x01bZ\x01";
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
        buf.push(9);

        let mut parser = Parser::new(&buf);
        let table = parser.parse_field_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a"), Some(&FieldValue::Boolean(true)));
        assert_eq!(parser.parse_octet(), 9);
    }

    #[test]
    fn field_table_with_truncated_entry_keeps_prior_entries() {
        let mut buf = Vec::new();
        let body = b"\x01aB\x05\x01bI\x00\x00";
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);

        let mut parser = Parser::new(&buf);
        let table = parser.parse_field_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a"), Some(&FieldValue::ShortShortUint(5)));
        assert!(!parser.is_truncated());
    }

    #[test]
    fn field_table_longer_than_buffer_is_empty() {
        let mut parser = Parser::new(&[0, 0, 0, 10, b'x']);
        assert!(parser.parse_field_table().is_empty());
        assert!(parser.is_truncated());
    }

    #[test]
    fn deeply_nested_tables_are_cut_off() {
        let mut encoded: Vec<u8> = vec![0, 0, 0, 0];
        for _ in 0..100 {
            let mut body = vec![1, b'k', b'F'];
            body.extend_from_slice(&encoded);
            encoded = (body.len() as u32).to_be_bytes().to_vec();
            encoded.extend_from_slice(&body);
        }
        let mut parser = Parser::new(&encoded);
        let table = parser.parse_field_table();
        assert_eq!(table.len(), 1);
        assert!(parser.is_exhausted());
    }
}
