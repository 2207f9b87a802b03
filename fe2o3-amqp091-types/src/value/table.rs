use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::Error;

use super::{decode_key, encode_entries, split_body, FieldValue, MAX_NESTING_DEPTH};

/// A field table, ie. a map keyed by short strings
///
/// Entry order is not significant on the wire, so entries are kept sorted by
/// key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTable(BTreeMap<String, FieldValue>);

impl FieldTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts an entry, returning the previous value under the same key
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Consume the wrapper into the inner map
    pub fn into_inner(self) -> BTreeMap<String, FieldValue> {
        self.0
    }

    /// Writes the u32 byte length followed by every (key, value) pair
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_entries(buf, self.0.iter().map(|(k, v)| (Some(k.as_str()), v)))
    }

    /// Reads a length prefixed table
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        Self::decode_nested(buf, 1)
    }

    pub(crate) fn decode_nested(buf: &mut Bytes, depth: usize) -> Result<Self, Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let mut body = split_body(buf)?;
        let mut map = BTreeMap::new();
        while body.has_remaining() {
            let key = decode_key(&mut body)?;
            let value = FieldValue::decode_nested(&mut body, depth)?;
            map.insert(key, value);
        }
        Ok(Self(map))
    }
}

impl Deref for FieldTable {
    type Target = BTreeMap<String, FieldValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FieldTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldTable {
    fn from(map: BTreeMap<String, FieldValue>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for FieldTable
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for FieldTable {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// An ordered list of field values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldArray(Vec<FieldValue>);

impl FieldArray {
    /// Consume the wrapper into the inner vector
    pub fn into_inner(self) -> Vec<FieldValue> {
        self.0
    }

    /// Writes the u32 byte length followed by every tagged value
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_entries(buf, self.0.iter().map(|v| (None, v)))
    }

    /// Reads a length prefixed array
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        Self::decode_nested(buf, 1)
    }

    pub(crate) fn decode_nested(buf: &mut Bytes, depth: usize) -> Result<Self, Error> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let mut body = split_body(buf)?;
        let mut values = Vec::new();
        while body.has_remaining() {
            values.push(FieldValue::decode_nested(&mut body, depth)?);
        }
        Ok(Self(values))
    }
}

impl Deref for FieldArray {
    type Target = Vec<FieldValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FieldArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<FieldValue>> for FieldArray {
    fn from(values: Vec<FieldValue>) -> Self {
        Self(values)
    }
}

impl<V: Into<FieldValue>> FromIterator<V> for FieldArray {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut buf = BytesMut::new();
        FieldTable::new().encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);

        let decoded = FieldTable::decode(&mut buf.freeze()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn table_length_covers_entries() {
        let table: FieldTable = [("a", true)].into_iter().collect();
        let mut buf = BytesMut::new();
        table.encode(&mut buf).unwrap();
        // key len, key, tag, value
        assert_eq!(&buf[..], &[0, 0, 0, 4, 1, b'a', b't', 1]);
    }

    #[test]
    fn decode_leaves_following_bytes() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 0, 0xAB]);
        let table = FieldTable::decode(&mut bytes).unwrap();
        assert!(table.is_empty());
        assert_eq!(&bytes[..], &[0xAB]);
    }

    #[test]
    fn truncated_table_is_rejected() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 9, 1, b'a']);
        assert!(matches!(
            FieldTable::decode(&mut bytes),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn serde_representation_is_a_plain_map() {
        let mut table = FieldTable::new();
        table.insert("x-max-length", 10i32);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"x-max-length":{"Int":10}}"#);
        let back: FieldTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
