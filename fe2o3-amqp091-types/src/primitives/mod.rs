//! Primitive types and the big-endian readers/writers shared by every
//! method, table and content header codec

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Error;

mod decimal;
mod timestamp;

pub use decimal::Decimal;
pub use timestamp::Timestamp;

/// Maximum length of a short string in bytes
pub const SHORT_STRING_MAX_LEN: usize = u8::MAX as usize;

#[inline]
pub(crate) fn ensure(buf: &Bytes, n: usize) -> Result<(), Error> {
    let remaining = buf.remaining();
    if remaining < n {
        return Err(Error::UnexpectedEof {
            needed: n - remaining,
        });
    }
    Ok(())
}

macro_rules! getter {
    ($name:ident, $ty:ty, $get:ident) => {
        #[doc = concat!("Reads a big-endian `", stringify!($ty), "`")]
        #[inline]
        pub fn $name(buf: &mut Bytes) -> Result<$ty, Error> {
            ensure(buf, std::mem::size_of::<$ty>())?;
            Ok(buf.$get())
        }
    };
}

getter!(get_u8, u8, get_u8);
getter!(get_i8, i8, get_i8);
getter!(get_u16, u16, get_u16);
getter!(get_i16, i16, get_i16);
getter!(get_u32, u32, get_u32);
getter!(get_i32, i32, get_i32);
getter!(get_u64, u64, get_u64);
getter!(get_i64, i64, get_i64);
getter!(get_f32, f32, get_f32);
getter!(get_f64, f64, get_f64);

/// Reads a short string (u8 length prefix, UTF-8)
pub fn get_short_str(buf: &mut Bytes) -> Result<String, Error> {
    let len = get_u8(buf)? as usize;
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Reads a long string (u32 length prefix) as raw bytes
pub fn get_long_bytes(buf: &mut Bytes) -> Result<Bytes, Error> {
    let len = get_u32(buf)? as usize;
    ensure(buf, len)?;
    Ok(buf.split_to(len))
}

/// Reads a long string (u32 length prefix) that must be UTF-8
pub fn get_long_str(buf: &mut Bytes) -> Result<String, Error> {
    let raw = get_long_bytes(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Writes a short string
pub fn put_short_str(buf: &mut BytesMut, value: &str) -> Result<(), Error> {
    let len = value.len();
    if len > SHORT_STRING_MAX_LEN {
        return Err(Error::ShortStringTooLong(len));
    }
    buf.put_u8(len as u8);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Writes a long string
pub fn put_long_bytes(buf: &mut BytesMut, value: &[u8]) -> Result<(), Error> {
    let len = u32::try_from(value.len()).map_err(|_| Error::LengthOverflow(value.len()))?;
    buf.put_u32(len);
    buf.put_slice(value);
    Ok(())
}

/// Packs consecutive bit fields into octets, least significant bit first
pub fn put_bits(buf: &mut BytesMut, bits: &[bool]) {
    for chunk in bits.chunks(8) {
        let octet = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, bit)| if *bit { acc | (1 << i) } else { acc });
        buf.put_u8(octet);
    }
}

/// Unpacks `N` consecutive bit fields
pub fn get_bits<const N: usize>(buf: &mut Bytes) -> Result<[bool; N], Error> {
    ensure(buf, (N + 7) / 8)?;
    let mut bits = [false; N];
    let mut octet = 0u8;
    for (i, bit) in bits.iter_mut().enumerate() {
        if i % 8 == 0 {
            octet = buf.get_u8();
        }
        *bit = octet & (1 << (i % 8)) != 0;
    }
    Ok(bits)
}

/// Writes a u32 length placeholder and returns its position so that it can be
/// patched by [`patch_len`]
pub(crate) fn reserve_len(buf: &mut BytesMut) -> usize {
    let pos = buf.len();
    buf.put_u32(0);
    pos
}

pub(crate) fn patch_len(buf: &mut BytesMut, pos: usize) -> Result<(), Error> {
    let written = buf.len() - pos - 4;
    let len = u32::try_from(written).map_err(|_| Error::LengthOverflow(written))?;
    buf[pos..pos + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn bits_are_packed_lsb_first() {
        let mut buf = BytesMut::new();
        put_bits(&mut buf, &[true, false, true, true, false]);
        assert_eq!(&buf[..], &[0b0000_1101]);

        let mut bytes = buf.freeze();
        let bits = get_bits::<5>(&mut bytes).unwrap();
        assert_eq!(bits, [true, false, true, true, false]);
    }

    #[test]
    fn nine_bits_span_two_octets() {
        let mut buf = BytesMut::new();
        let bits = [true, false, false, false, false, false, false, true, true];
        put_bits(&mut buf, &bits);
        assert_eq!(&buf[..], &[0b1000_0001, 0b0000_0001]);
        assert_eq!(get_bits::<9>(&mut buf.freeze()).unwrap(), bits);
    }

    #[test]
    fn short_string_limit() {
        let mut buf = BytesMut::new();
        let max = "a".repeat(SHORT_STRING_MAX_LEN);
        put_short_str(&mut buf, &max).unwrap();
        assert_eq!(get_short_str(&mut buf.freeze()).unwrap(), max);

        let mut buf = BytesMut::new();
        let too_long = "a".repeat(SHORT_STRING_MAX_LEN + 1);
        assert_eq!(
            put_short_str(&mut buf, &too_long),
            Err(Error::ShortStringTooLong(256))
        );
    }

    #[test]
    fn truncated_input_reports_missing_bytes() {
        let mut bytes = Bytes::from_static(&[0x00, 0x01]);
        assert_eq!(
            get_u32(&mut bytes),
            Err(Error::UnexpectedEof { needed: 2 })
        );

        let mut bytes = Bytes::from_static(&[0x05, b'a', b'b']);
        assert_eq!(
            get_short_str(&mut bytes),
            Err(Error::UnexpectedEof { needed: 3 })
        );
    }
}
