//! Reading and writing method arguments, including packed bit fields

use bytes::{BufMut, BytesMut};

use crate::{
    error::Error,
    primitives::ShortString,
    read::Parser,
    ser::{write_long_string, write_short_string, Encode},
    value::FieldTable,
};

/// Reads consecutive method arguments.
///
/// Consecutive `bit` arguments share octets, least significant bit first. Any other argument
/// type starts on a fresh octet.
#[derive(Debug)]
pub struct ArgumentReader<'p, 'a> {
    parser: &'p mut Parser<'a>,
    bits: u8,
    bit_index: u8,
}

impl<'p, 'a> ArgumentReader<'p, 'a> {
    /// Wraps a parser positioned at the first argument
    pub fn new(parser: &'p mut Parser<'a>) -> Self {
        Self {
            parser,
            bits: 0,
            bit_index: 8,
        }
    }

    /// Reads the next packed bit
    pub fn read_bit(&mut self) -> bool {
        if self.bit_index >= 8 {
            self.bits = self.parser.parse_octet();
            self.bit_index = 0;
        }
        let bit = self.bits & (1 << self.bit_index) != 0;
        self.bit_index += 1;
        bit
    }

    /// Access the underlying parser for a non-bit argument
    pub fn parser(&mut self) -> &mut Parser<'a> {
        self.bit_index = 8;
        &mut *self.parser
    }
}

/// Writes consecutive method arguments, packing bits
#[derive(Debug)]
pub struct ArgumentWriter<'d> {
    dst: &'d mut BytesMut,
    bits: u8,
    bit_count: u8,
}

impl<'d> ArgumentWriter<'d> {
    /// Creates a writer appending to `dst`
    pub fn new(dst: &'d mut BytesMut) -> Self {
        Self {
            dst,
            bits: 0,
            bit_count: 0,
        }
    }

    /// Appends a packed bit
    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_count == 8 {
            self.flush_bits();
        }
        self.bits |= (bit as u8) << self.bit_count;
        self.bit_count += 1;
    }

    fn flush_bits(&mut self) {
        if self.bit_count > 0 {
            self.dst.put_u8(self.bits);
            self.bits = 0;
            self.bit_count = 0;
        }
    }

    /// Access the output buffer for a non-bit argument
    pub fn buf(&mut self) -> &mut BytesMut {
        self.flush_bits();
        &mut *self.dst
    }

    /// Writes any pending bits
    pub fn finish(mut self) {
        self.flush_bits();
    }
}

/// A value that can appear as a method argument
pub trait Argument: Sized {
    /// Reads the argument. Truncated input yields the default value.
    fn read(reader: &mut ArgumentReader<'_, '_>) -> Self;

    /// Writes the argument
    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error>;
}

impl Argument for bool {
    fn read(reader: &mut ArgumentReader<'_, '_>) -> Self {
        reader.read_bit()
    }

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
        writer.write_bit(*self);
        Ok(())
    }
}

macro_rules! impl_argument_for_int {
    ($($ty:ty: $parse:ident, $put:ident);* $(;)?) => {
        $(
            impl Argument for $ty {
                fn read(reader: &mut ArgumentReader<'_, '_>) -> Self {
                    reader.parser().$parse()
                }

                fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
                    writer.buf().$put(*self);
                    Ok(())
                }
            }
        )*
    };
}

impl_argument_for_int! {
    u8: parse_octet, put_u8;
    u16: parse_short, put_u16;
    u32: parse_long, put_u32;
    u64: parse_long_long, put_u64;
}

impl Argument for ShortString {
    fn read(reader: &mut ArgumentReader<'_, '_>) -> Self {
        ShortString::from(reader.parser().parse_short_string())
    }

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
        write_short_string(writer.buf(), self)
    }
}

/// Long strings
impl Argument for String {
    fn read(reader: &mut ArgumentReader<'_, '_>) -> Self {
        reader.parser().parse_long_string()
    }

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
        write_long_string(writer.buf(), self.as_bytes())
    }
}

impl Argument for FieldTable {
    fn read(reader: &mut ArgumentReader<'_, '_>) -> Self {
        reader.parser().parse_field_table()
    }

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), Error> {
        self.encode(writer.buf())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Argument, ArgumentReader, ArgumentWriter};
    use crate::{primitives::ShortString, read::Parser};

    #[test]
    fn consecutive_bits_share_an_octet() {
        let mut dst = BytesMut::new();
        let mut writer = ArgumentWriter::new(&mut dst);
        true.write(&mut writer).unwrap();
        false.write(&mut writer).unwrap();
        true.write(&mut writer).unwrap();
        7u16.write(&mut writer).unwrap();
        true.write(&mut writer).unwrap();
        writer.finish();
        assert_eq!(&dst[..], &[0b101, 0, 7, 0b1]);

        let mut parser = Parser::new(&dst);
        let mut reader = ArgumentReader::new(&mut parser);
        assert!(bool::read(&mut reader));
        assert!(!bool::read(&mut reader));
        assert!(bool::read(&mut reader));
        assert_eq!(u16::read(&mut reader), 7);
        assert!(bool::read(&mut reader));
    }

    #[test]
    fn nine_bits_span_two_octets() {
        let mut dst = BytesMut::new();
        let mut writer = ArgumentWriter::new(&mut dst);
        for _ in 0..9 {
            true.write(&mut writer).unwrap();
        }
        writer.finish();
        assert_eq!(&dst[..], &[0xff, 0x01]);
    }

    #[test]
    fn short_string_argument_after_bits() {
        let mut dst = BytesMut::new();
        let mut writer = ArgumentWriter::new(&mut dst);
        true.write(&mut writer).unwrap();
        ShortString::from("q").write(&mut writer).unwrap();
        writer.finish();
        assert_eq!(&dst[..], b"\x01\x01q");
    }
}
