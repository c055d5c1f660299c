//! Tagged values carried by field tables and arrays

use std::ops::{Deref, DerefMut};

use bytes::{BufMut, Bytes, BytesMut};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::{
    error::Error,
    primitives::{Decimal, Timestamp},
    ser::{write_length_prefixed, write_long_string, write_short_string, Encode},
};

/// A self-describing value. Type tags follow the dialect spoken by RabbitMQ and most other
/// 0-9-1 brokers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Represents a true or false value
    ///
    /// tag = 't', width = 1
    Boolean(bool),

    /// Integer in the range -(2^7) to 2^7-1 inclusive
    ///
    /// tag = 'b', width = 1
    ShortShortInt(i8),

    /// Integer in the range 0 to 2^8-1 inclusive
    ///
    /// tag = 'B', width = 1
    ShortShortUint(u8),

    /// Integer in the range -(2^15) to 2^15-1 inclusive
    ///
    /// tag = 's', width = 2
    ShortInt(i16),

    /// Integer in the range 0 to 2^16-1 inclusive
    ///
    /// tag = 'u', width = 2
    ShortUint(u16),

    /// Integer in the range -(2^31) to 2^31-1 inclusive
    ///
    /// tag = 'I', width = 4
    LongInt(i32),

    /// Integer in the range 0 to 2^32-1 inclusive
    ///
    /// tag = 'i', width = 4
    LongUint(u32),

    /// Integer in the range -(2^63) to 2^63-1 inclusive
    ///
    /// tag = 'l', width = 8
    LongLongInt(i64),

    /// Integer in the range 0 to 2^64-1 inclusive
    ///
    /// tag = 'L', width = 8
    LongLongUint(u64),

    /// 32-bit floating point number (IEEE 754-2008 binary32)
    ///
    /// tag = 'f', width = 4
    Float(OrderedFloat<f32>),

    /// 64-bit floating point number (IEEE 754-2008 binary64)
    ///
    /// tag = 'd', width = 8
    Double(OrderedFloat<f64>),

    /// Scale octet followed by an unscaled 32-bit value
    ///
    /// tag = 'D', width = 5
    Decimal(Decimal),

    /// Text with a four-octet length prefix
    ///
    /// tag = 'S'
    LongString(String),

    /// Opaque bytes with a four-octet length prefix
    ///
    /// tag = 'x'
    ByteArray(Bytes),

    /// Sequence of tagged values with a four-octet length prefix
    ///
    /// tag = 'A'
    FieldArray(Vec<FieldValue>),

    /// Nested table
    ///
    /// tag = 'F'
    FieldTable(FieldTable),

    /// Seconds since the unix epoch
    ///
    /// tag = 'T', width = 8
    Timestamp(Timestamp),

    /// Indicates an empty value
    ///
    /// tag = 'V', width = 0
    Void,
}

impl FieldValue {
    /// The type tag written before the value
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::ShortShortInt(_) => b'b',
            FieldValue::ShortShortUint(_) => b'B',
            FieldValue::ShortInt(_) => b's',
            FieldValue::ShortUint(_) => b'u',
            FieldValue::LongInt(_) => b'I',
            FieldValue::LongUint(_) => b'i',
            FieldValue::LongLongInt(_) => b'l',
            FieldValue::LongLongUint(_) => b'L',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::LongString(_) => b'S',
            FieldValue::ByteArray(_) => b'x',
            FieldValue::FieldArray(_) => b'A',
            FieldValue::FieldTable(_) => b'F',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::Void => b'V',
        }
    }

    /// Writes the value without its tag
    fn encode_untagged(&self, dst: &mut BytesMut) -> Result<(), Error> {
        match self {
            FieldValue::Boolean(v) => dst.put_u8(*v as u8),
            FieldValue::ShortShortInt(v) => dst.put_i8(*v),
            FieldValue::ShortShortUint(v) => dst.put_u8(*v),
            FieldValue::ShortInt(v) => dst.put_i16(*v),
            FieldValue::ShortUint(v) => dst.put_u16(*v),
            FieldValue::LongInt(v) => dst.put_i32(*v),
            FieldValue::LongUint(v) => dst.put_u32(*v),
            FieldValue::LongLongInt(v) => dst.put_i64(*v),
            FieldValue::LongLongUint(v) => dst.put_u64(*v),
            FieldValue::Float(v) => dst.put_f32(v.into_inner()),
            FieldValue::Double(v) => dst.put_f64(v.into_inner()),
            FieldValue::Decimal(v) => {
                dst.put_u8(v.scale());
                dst.put_u32(v.value());
            }
            FieldValue::LongString(v) => write_long_string(dst, v.as_bytes())?,
            FieldValue::ByteArray(v) => write_long_string(dst, v)?,
            FieldValue::FieldArray(values) => write_length_prefixed(dst, |dst| {
                values.iter().try_for_each(|value| value.encode(dst))
            })?,
            FieldValue::FieldTable(table) => table.encode(dst)?,
            FieldValue::Timestamp(v) => dst.put_u64(v.seconds()),
            FieldValue::Void => {}
        }
        Ok(())
    }
}

impl Encode for FieldValue {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u8(self.tag());
        self.encode_untagged(dst)
    }
}

macro_rules! impl_from_for_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(val: $ty) -> Self {
                    FieldValue::$variant(val.into())
                }
            }
        )*
    };
}

impl_from_for_field_value! {
    bool => Boolean,
    i8 => ShortShortInt,
    u8 => ShortShortUint,
    i16 => ShortInt,
    u16 => ShortUint,
    i32 => LongInt,
    u32 => LongUint,
    i64 => LongLongInt,
    u64 => LongLongUint,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => LongString,
    &str => LongString,
    Bytes => ByteArray,
    Vec<FieldValue> => FieldArray,
    FieldTable => FieldTable,
    Timestamp => Timestamp,
}

/// A mapping from short-string keys to tagged values.
///
/// Insertion order is kept so that a decoded table re-encodes to the same bytes. Equality
/// ignores order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTable(IndexMap<String, FieldValue>);

impl FieldTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Inserts an entry, returning the previous value for the key if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder style [`FieldTable::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Consume the wrapper into the inner map
    pub fn into_inner(self) -> IndexMap<String, FieldValue> {
        self.0
    }
}

impl Deref for FieldTable {
    type Target = IndexMap<String, FieldValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FieldTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<IndexMap<String, FieldValue>> for FieldTable {
    fn from(map: IndexMap<String, FieldValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Encode for FieldTable {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        write_length_prefixed(dst, |dst| {
            for (key, value) in self.0.iter() {
                write_short_string(dst, key)?;
                value.encode(dst)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::{FieldTable, FieldValue};
    use crate::{
        error::Error,
        primitives::{Decimal, Timestamp},
        read::Parser,
        ser::Encode,
    };

    fn every_type() -> FieldTable {
        let nested = FieldTable::new()
            .with("inner", "value")
            .with("count", 3u16);
        FieldTable::new()
            .with("boolean", true)
            .with("i8", -8i8)
            .with("u8", 8u8)
            .with("i16", -1600i16)
            .with("u16", 1600u16)
            .with("i32", -320_000i32)
            .with("u32", 320_000u32)
            .with("i64", -64_000_000_000i64)
            .with("u64", 64_000_000_000u64)
            .with("f32", 1.5f32)
            .with("f64", -2.25f64)
            .with("decimal", Decimal::new(2, 12345))
            .with("long string", "long string value")
            .with("bytes", Bytes::from_static(&[0, 1, 2, 0xff]))
            .with(
                "array",
                vec![
                    FieldValue::from(1i32),
                    FieldValue::from("two"),
                    FieldValue::Void,
                ],
            )
            .with("table", nested)
            .with("timestamp", Timestamp::from_seconds(1_700_000_000))
            .with("void", FieldValue::Void)
    }

    #[test]
    fn field_table_round_trip_with_every_type() {
        let table = every_type();
        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();

        let mut parser = Parser::new(&dst);
        let decoded = parser.parse_field_table();
        assert_eq!(decoded, table);
        assert!(parser.is_exhausted());
        assert!(!parser.is_truncated());

        let keys: Vec<_> = decoded.keys().cloned().collect();
        let expected: Vec<_> = table.keys().cloned().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn reencoding_a_decoded_table_is_byte_identical() {
        let mut first = BytesMut::new();
        every_type().encode(&mut first).unwrap();
        let decoded = Parser::new(&first).parse_field_table();
        let mut second = BytesMut::new();
        decoded.encode(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = FieldTable::new().with("a", 1i32).with("b", true);
        let b = FieldTable::new().with("b", true).with("a", 1i32);
        assert_eq!(a, b);
    }

    #[test]
    fn encoding_known_bytes() {
        let table = FieldTable::new().with("k", true);
        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();
        assert_eq!(&dst[..], b"\x00\x00\x00\x04\x01kt\x01");
    }

    #[test]
    fn overlong_key_fails_to_encode() {
        let table = FieldTable::new().with("k".repeat(300), 1u8);
        let mut dst = BytesMut::new();
        assert_eq!(table.encode(&mut dst), Err(Error::ShortStringTooLong(300)));
    }
}
