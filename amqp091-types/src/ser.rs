//! Encoding of values into an outbound buffer

use bytes::{BufMut, BytesMut};

use crate::{error::Error, primitives::ShortString};

/// Types that know how to write themselves in AMQP 0-9-1 wire format
pub trait Encode {
    /// Appends the encoded value to `dst`
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error>;
}

/// Writes a one-octet length followed by the bytes of `s`
pub fn write_short_string(dst: &mut BytesMut, s: &str) -> Result<(), Error> {
    let len = u8::try_from(s.len()).map_err(|_| Error::ShortStringTooLong(s.len()))?;
    dst.put_u8(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

/// Writes a four-octet length followed by `bytes`
pub fn write_long_string(dst: &mut BytesMut, bytes: &[u8]) -> Result<(), Error> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::TooLong(bytes.len()))?;
    dst.put_u32(len);
    dst.put_slice(bytes);
    Ok(())
}

/// Writes a four-octet length placeholder, runs `f`, then patches the length with the number
/// of bytes `f` wrote
pub(crate) fn write_length_prefixed<F>(dst: &mut BytesMut, f: F) -> Result<(), Error>
where
    F: FnOnce(&mut BytesMut) -> Result<(), Error>,
{
    let start = dst.len();
    dst.put_u32(0);
    f(dst)?;
    let written = dst.len() - start - 4;
    let len = u32::try_from(written).map_err(|_| Error::TooLong(written))?;
    dst[start..start + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

impl Encode for ShortString {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        write_short_string(dst, self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{write_long_string, write_short_string};
    use crate::error::Error;

    #[test]
    fn short_string_over_255_bytes_fails() {
        let mut dst = BytesMut::new();
        let long = "a".repeat(256);
        assert_eq!(
            write_short_string(&mut dst, &long),
            Err(Error::ShortStringTooLong(256))
        );
        assert!(dst.is_empty());

        write_short_string(&mut dst, &long[..255]).unwrap();
        assert_eq!(dst.len(), 256);
        assert_eq!(dst[0], 255);
    }

    #[test]
    fn long_string_is_length_prefixed() {
        let mut dst = BytesMut::new();
        write_long_string(&mut dst, b"AAAA").unwrap();
        assert_eq!(&dst[..], b"\x00\x00\x00\x04AAAA");
    }
}
