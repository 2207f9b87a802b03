//! Field values, field tables and field arrays used as typed arguments in
//! method frames and content headers

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    primitives::{
        self, ensure, get_short_str, patch_len, put_short_str, reserve_len, Decimal, Timestamp,
    },
    Error,
};

mod long_string;
mod table;

pub use long_string::LongString;
pub use table::{FieldArray, FieldTable};

/// Deepest nesting of tables and arrays accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

/// Type tags of field values
///
/// The tags follow the table used by RabbitMQ and most other brokers rather
/// than the one found in the original AMQP 0-9-1 document
pub mod tags {
    /// Boolean
    pub const BOOL: u8 = b't';
    /// Signed 8-bit
    pub const BYTE: u8 = b'b';
    /// Unsigned 8-bit
    pub const UBYTE: u8 = b'B';
    /// Signed 16-bit
    pub const SHORT: u8 = b's';
    /// Unsigned 16-bit
    pub const USHORT: u8 = b'u';
    /// Signed 32-bit
    pub const INT: u8 = b'I';
    /// Unsigned 32-bit
    pub const UINT: u8 = b'i';
    /// Signed 64-bit
    pub const LONG: u8 = b'l';
    /// 32-bit float
    pub const FLOAT: u8 = b'f';
    /// 64-bit float
    pub const DOUBLE: u8 = b'd';
    /// Decimal
    pub const DECIMAL: u8 = b'D';
    /// Long string
    pub const LONG_STRING: u8 = b'S';
    /// Field array
    pub const ARRAY: u8 = b'A';
    /// Timestamp
    pub const TIMESTAMP: u8 = b'T';
    /// Nested field table
    pub const TABLE: u8 = b'F';
    /// No value
    pub const VOID: u8 = b'V';
    /// Byte array
    pub const BYTE_ARRAY: u8 = b'x';
}

/// An untyped field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Represents a true or false value
    ///
    /// tag = 't', width = 1
    Bool(bool),

    /// Integer in the range -(2^7) to 2^7-1 inclusive
    ///
    /// tag = 'b', width = 1
    Byte(i8),

    /// Integer in the range 0 to 2^8-1 inclusive
    ///
    /// tag = 'B', width = 1
    UByte(u8),

    /// Integer in the range -(2^15) to 2^15-1 inclusive
    ///
    /// tag = 's', width = 2
    Short(i16),

    /// Integer in the range 0 to 2^16-1 inclusive
    ///
    /// tag = 'u', width = 2
    UShort(u16),

    /// Integer in the range -(2^31) to 2^31-1 inclusive
    ///
    /// tag = 'I', width = 4
    Int(i32),

    /// Integer in the range 0 to 2^32-1 inclusive
    ///
    /// tag = 'i', width = 4
    UInt(u32),

    /// Integer in the range -(2^63) to 2^63-1 inclusive
    ///
    /// tag = 'l', width = 8
    Long(i64),

    /// IEEE 754 binary32
    ///
    /// tag = 'f', width = 4
    Float(f32),

    /// IEEE 754 binary64
    ///
    /// tag = 'd', width = 8
    Double(f64),

    /// Scale octet followed by a signed 32-bit value
    ///
    /// tag = 'D', width = 5
    Decimal(Decimal),

    /// u32 length prefixed bytes, usually UTF-8
    ///
    /// tag = 'S'
    LongString(LongString),

    /// u32 length prefixed sequence of tagged values
    ///
    /// tag = 'A'
    Array(FieldArray),

    /// Seconds since the unix epoch
    ///
    /// tag = 'T', width = 8
    Timestamp(Timestamp),

    /// u32 length prefixed nested table
    ///
    /// tag = 'F'
    Table(FieldTable),

    /// Indicates an empty value
    ///
    /// tag = 'V', width = 0
    Void,

    /// u32 length prefixed raw bytes
    ///
    /// tag = 'x'
    ByteArray(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl FieldValue {
    /// The one-byte type tag that precedes the value on the wire
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => tags::BOOL,
            FieldValue::Byte(_) => tags::BYTE,
            FieldValue::UByte(_) => tags::UBYTE,
            FieldValue::Short(_) => tags::SHORT,
            FieldValue::UShort(_) => tags::USHORT,
            FieldValue::Int(_) => tags::INT,
            FieldValue::UInt(_) => tags::UINT,
            FieldValue::Long(_) => tags::LONG,
            FieldValue::Float(_) => tags::FLOAT,
            FieldValue::Double(_) => tags::DOUBLE,
            FieldValue::Decimal(_) => tags::DECIMAL,
            FieldValue::LongString(_) => tags::LONG_STRING,
            FieldValue::Array(_) => tags::ARRAY,
            FieldValue::Timestamp(_) => tags::TIMESTAMP,
            FieldValue::Table(_) => tags::TABLE,
            FieldValue::Void => tags::VOID,
            FieldValue::ByteArray(_) => tags::BYTE_ARRAY,
        }
    }

    /// Writes the type tag followed by the value
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u8(self.tag());
        match self {
            FieldValue::Bool(v) => buf.put_u8(*v as u8),
            FieldValue::Byte(v) => buf.put_i8(*v),
            FieldValue::UByte(v) => buf.put_u8(*v),
            FieldValue::Short(v) => buf.put_i16(*v),
            FieldValue::UShort(v) => buf.put_u16(*v),
            FieldValue::Int(v) => buf.put_i32(*v),
            FieldValue::UInt(v) => buf.put_u32(*v),
            FieldValue::Long(v) => buf.put_i64(*v),
            FieldValue::Float(v) => buf.put_f32(*v),
            FieldValue::Double(v) => buf.put_f64(*v),
            FieldValue::Decimal(v) => {
                buf.put_u8(v.scale());
                buf.put_i32(v.value());
            }
            FieldValue::LongString(v) => primitives::put_long_bytes(buf, v.as_bytes())?,
            FieldValue::Array(v) => v.encode(buf)?,
            FieldValue::Timestamp(v) => buf.put_u64(v.seconds()),
            FieldValue::Table(v) => v.encode(buf)?,
            FieldValue::Void => {}
            FieldValue::ByteArray(v) => primitives::put_long_bytes(buf, v)?,
        }
        Ok(())
    }

    /// Reads a type tag and the value that follows it
    ///
    /// Unknown tags are rejected
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        Self::decode_nested(buf, 0)
    }

    /// `depth` counts the tables and arrays enclosing the value
    pub(crate) fn decode_nested(buf: &mut Bytes, depth: usize) -> Result<Self, Error> {
        let tag = primitives::get_u8(buf)?;
        let value = match tag {
            tags::BOOL => FieldValue::Bool(primitives::get_u8(buf)? != 0),
            tags::BYTE => FieldValue::Byte(primitives::get_i8(buf)?),
            tags::UBYTE => FieldValue::UByte(primitives::get_u8(buf)?),
            tags::SHORT => FieldValue::Short(primitives::get_i16(buf)?),
            tags::USHORT => FieldValue::UShort(primitives::get_u16(buf)?),
            tags::INT => FieldValue::Int(primitives::get_i32(buf)?),
            tags::UINT => FieldValue::UInt(primitives::get_u32(buf)?),
            tags::LONG => FieldValue::Long(primitives::get_i64(buf)?),
            tags::FLOAT => FieldValue::Float(primitives::get_f32(buf)?),
            tags::DOUBLE => FieldValue::Double(primitives::get_f64(buf)?),
            tags::DECIMAL => {
                ensure(buf, 5)?;
                let scale = buf.get_u8();
                let value = buf.get_i32();
                FieldValue::Decimal(Decimal::new(scale, value))
            }
            tags::LONG_STRING => {
                let raw = primitives::get_long_bytes(buf)?;
                FieldValue::LongString(LongString::from(raw.to_vec()))
            }
            tags::ARRAY => FieldValue::Array(FieldArray::decode_nested(buf, depth + 1)?),
            tags::TIMESTAMP => {
                FieldValue::Timestamp(Timestamp::from_seconds(primitives::get_u64(buf)?))
            }
            tags::TABLE => FieldValue::Table(FieldTable::decode_nested(buf, depth + 1)?),
            tags::VOID => FieldValue::Void,
            tags::BYTE_ARRAY => FieldValue::ByteArray(primitives::get_long_bytes(buf)?.to_vec()),
            other => return Err(Error::UnknownFieldType(other)),
        };
        Ok(value)
    }

    /// Returns the boolean if this is a [`FieldValue::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string if this is a UTF-8 [`FieldValue::LongString`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::LongString(v) => v.as_str(),
            _ => None,
        }
    }

    /// Returns the nested table if this is a [`FieldValue::Table`]
    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::Table(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_field_value! {
    bool => Bool,
    i8 => Byte,
    u8 => UByte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    LongString => LongString,
    String => LongString,
    &str => LongString,
    FieldArray => Array,
    Vec<FieldValue> => Array,
    Timestamp => Timestamp,
    FieldTable => Table,
}

pub(crate) fn encode_entries<'a, I>(buf: &mut BytesMut, entries: I) -> Result<(), Error>
where
    I: IntoIterator<Item = (Option<&'a str>, &'a FieldValue)>,
{
    let pos = reserve_len(buf);
    for (key, value) in entries {
        if let Some(key) = key {
            put_short_str(buf, key)?;
        }
        value.encode(buf)?;
    }
    patch_len(buf, pos)
}

/// Splits off the u32 length prefixed body of a table or an array
pub(crate) fn split_body(buf: &mut Bytes) -> Result<Bytes, Error> {
    let len = primitives::get_u32(buf)? as usize;
    ensure(buf, len)?;
    Ok(buf.split_to(len))
}

pub(crate) fn decode_key(buf: &mut Bytes) -> Result<String, Error> {
    get_short_str(buf)
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;

    fn round_trip(value: FieldValue) {
        let mut buf = BytesMut::new();
        value.encode(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        let decoded = FieldValue::decode(&mut bytes).unwrap();
        assert_eq!(decoded, value);
        assert!(bytes.is_empty());
    }

    #[test]
    fn every_scalar_type_round_trips() {
        round_trip(FieldValue::Bool(true));
        round_trip(FieldValue::Bool(false));
        round_trip(FieldValue::Byte(i8::MIN));
        round_trip(FieldValue::UByte(u8::MAX));
        round_trip(FieldValue::Short(-1234));
        round_trip(FieldValue::UShort(u16::MAX));
        round_trip(FieldValue::Int(i32::MIN));
        round_trip(FieldValue::UInt(u32::MAX));
        round_trip(FieldValue::Long(i64::MAX));
        round_trip(FieldValue::Float(1.5));
        round_trip(FieldValue::Double(-2.25e100));
        round_trip(FieldValue::Decimal(Decimal::new(3, -42_000)));
        round_trip(FieldValue::Timestamp(Timestamp::from_seconds(1_700_000_000)));
        round_trip(FieldValue::Void);
        round_trip(FieldValue::from("hello"));
        round_trip(FieldValue::from(""));
        round_trip(FieldValue::ByteArray(vec![0, 1, 2, 0xff]));
        round_trip(FieldValue::ByteArray(vec![]));
    }

    #[test]
    fn long_string_keeps_non_utf8_bytes() {
        round_trip(FieldValue::LongString(LongString::from(vec![0xff, 0xfe])));
    }

    #[test]
    fn nested_containers_round_trip() {
        let mut inner = FieldTable::new();
        inner.insert("depth", 2i32);
        inner.insert("empty", FieldTable::new());

        let array = FieldArray::from(vec![
            FieldValue::from(1u8),
            FieldValue::Table(inner.clone()),
            FieldValue::Array(FieldArray::default()),
            FieldValue::Void,
        ]);

        let mut table = FieldTable::new();
        table.insert("inner", inner);
        table.insert("array", array);
        table.insert("k".repeat(255), "max-length key");

        round_trip(FieldValue::Table(table));
    }

    #[test]
    fn signed_short_uses_lowercase_s() {
        let mut buf = BytesMut::new();
        FieldValue::Short(-2).encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[b's', 0xff, 0xfe]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = Bytes::from_static(&[b'Z', 0x00]);
        assert_eq!(
            FieldValue::decode(&mut bytes),
            Err(Error::UnknownFieldType(b'Z'))
        );
    }

    #[test]
    fn unknown_tag_inside_table_is_rejected() {
        // length = 4, key "a", tag 'Q', one byte of payload
        let mut bytes = Bytes::from_static(&[0, 0, 0, 4, 1, b'a', b'Q', 0]);
        assert_eq!(
            FieldTable::decode(&mut bytes),
            Err(Error::UnknownFieldType(b'Q'))
        );
    }

    fn nested_arrays(depth: usize) -> Bytes {
        // Each level is a length prefix and an 'A' tag, the innermost array is empty
        let mut buf = BytesMut::with_capacity(depth * 5);
        for level in (0..depth).rev() {
            buf.put_u32(level as u32 * 5);
            if level > 0 {
                buf.put_u8(tags::ARRAY);
            }
        }
        buf.freeze()
    }

    #[test]
    fn nesting_up_to_the_limit_is_accepted() {
        let mut bytes = nested_arrays(MAX_NESTING_DEPTH);
        assert!(FieldArray::decode(&mut bytes).is_ok());
        assert!(bytes.is_empty());
    }

    #[test]
    fn deeply_nested_table_is_rejected() {
        // A table whose only entry starts 25000 levels of nested arrays
        let arrays = nested_arrays(25_000);
        let mut body = BytesMut::new();
        body.extend_from_slice(&[1, b'a', tags::ARRAY]);
        body.extend_from_slice(&arrays);
        let mut table = BytesMut::new();
        table.extend_from_slice(&(body.len() as u32).to_be_bytes());
        table.extend_from_slice(&body);
        assert!(table.len() < 128 * 1024);

        let mut bytes = table.freeze();
        assert_eq!(
            FieldTable::decode(&mut bytes),
            Err(Error::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }

    #[test]
    fn nesting_one_past_the_limit_is_rejected() {
        let mut bytes = nested_arrays(MAX_NESTING_DEPTH + 1);
        assert_eq!(
            FieldArray::decode(&mut bytes),
            Err(Error::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }
}
