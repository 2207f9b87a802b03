//! Content header frame payload and the properties of the basic class

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    definitions::class::BASIC,
    primitives::{get_short_str, get_u16, get_u64, get_u8, put_short_str, Timestamp},
    value::FieldTable,
    Error,
};

/// Property flags, from the most significant bit down
mod flags {
    pub const CONTENT_TYPE: u16 = 0x8000;
    pub const CONTENT_ENCODING: u16 = 0x4000;
    pub const HEADERS: u16 = 0x2000;
    pub const DELIVERY_MODE: u16 = 0x1000;
    pub const PRIORITY: u16 = 0x0800;
    pub const CORRELATION_ID: u16 = 0x0400;
    pub const REPLY_TO: u16 = 0x0200;
    pub const EXPIRATION: u16 = 0x0100;
    pub const MESSAGE_ID: u16 = 0x0080;
    pub const TIMESTAMP: u16 = 0x0040;
    pub const TYPE: u16 = 0x0020;
    pub const USER_ID: u16 = 0x0010;
    pub const APP_ID: u16 = 0x0008;
    pub const CLUSTER_ID: u16 = 0x0004;

    /// Another flag word follows. The basic class never needs one.
    pub const CONTINUATION: u16 = 0x0001;
}

/// Delivery mode of a non-persistent message
pub const TRANSIENT: u8 = 1;

/// Delivery mode of a persistent message
pub const PERSISTENT: u8 = 2;

/// Properties of a message published or delivered with the basic class
///
/// Only the properties that are present occupy space on the wire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BasicProperties {
    /// MIME content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// MIME content encoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    /// Application headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<FieldTable>,

    /// [`TRANSIENT`] or [`PERSISTENT`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<u8>,

    /// Message priority, 0 to 9
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    /// Application correlation identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Address to reply to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Message expiration, in milliseconds as a decimal string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,

    /// Application message identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Message timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    /// Message type name
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Creating user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Creating application id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Deprecated, kept for wire compatibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

macro_rules! with_property {
    ($($fn_name:ident($field:ident: $ty:ty)),* $(,)?) => {
        impl BasicProperties {
            $(
                #[doc = concat!("Set `", stringify!($field), "`")]
                pub fn $fn_name(mut self, value: impl Into<$ty>) -> Self {
                    self.$field = Some(value.into());
                    self
                }
            )*
        }
    };
}

with_property! {
    with_content_type(content_type: String),
    with_content_encoding(content_encoding: String),
    with_headers(headers: FieldTable),
    with_delivery_mode(delivery_mode: u8),
    with_priority(priority: u8),
    with_correlation_id(correlation_id: String),
    with_reply_to(reply_to: String),
    with_expiration(expiration: String),
    with_message_id(message_id: String),
    with_timestamp(timestamp: Timestamp),
    with_kind(kind: String),
    with_user_id(user_id: String),
    with_app_id(app_id: String),
    with_cluster_id(cluster_id: String),
}

impl BasicProperties {
    /// The property flag word
    pub fn flags(&self) -> u16 {
        let mut bits = 0;
        let mut set = |present: bool, flag: u16| {
            if present {
                bits |= flag
            }
        };
        set(self.content_type.is_some(), flags::CONTENT_TYPE);
        set(self.content_encoding.is_some(), flags::CONTENT_ENCODING);
        set(self.headers.is_some(), flags::HEADERS);
        set(self.delivery_mode.is_some(), flags::DELIVERY_MODE);
        set(self.priority.is_some(), flags::PRIORITY);
        set(self.correlation_id.is_some(), flags::CORRELATION_ID);
        set(self.reply_to.is_some(), flags::REPLY_TO);
        set(self.expiration.is_some(), flags::EXPIRATION);
        set(self.message_id.is_some(), flags::MESSAGE_ID);
        set(self.timestamp.is_some(), flags::TIMESTAMP);
        set(self.kind.is_some(), flags::TYPE);
        set(self.user_id.is_some(), flags::USER_ID);
        set(self.app_id.is_some(), flags::APP_ID);
        set(self.cluster_id.is_some(), flags::CLUSTER_ID);
        bits
    }

    /// Writes the flag word followed by the present properties
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(self.flags());

        fn short(buf: &mut BytesMut, value: &Option<String>) -> Result<(), Error> {
            match value {
                Some(value) => put_short_str(buf, value),
                None => Ok(()),
            }
        }

        short(buf, &self.content_type)?;
        short(buf, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            headers.encode(buf)?;
        }
        if let Some(mode) = self.delivery_mode {
            buf.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            buf.put_u8(priority);
        }
        short(buf, &self.correlation_id)?;
        short(buf, &self.reply_to)?;
        short(buf, &self.expiration)?;
        short(buf, &self.message_id)?;
        if let Some(timestamp) = self.timestamp {
            buf.put_u64(timestamp.seconds());
        }
        short(buf, &self.kind)?;
        short(buf, &self.user_id)?;
        short(buf, &self.app_id)?;
        short(buf, &self.cluster_id)
    }

    /// Reads the flag word and the properties it marks as present
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let bits = get_u16(buf)?;
        if bits & flags::CONTINUATION != 0 {
            return Err(Error::InvalidPropertyFlags(bits));
        }

        let short = |buf: &mut Bytes, flag: u16| -> Result<Option<String>, Error> {
            if bits & flag != 0 {
                get_short_str(buf).map(Some)
            } else {
                Ok(None)
            }
        };
        let octet = |buf: &mut Bytes, flag: u16| -> Result<Option<u8>, Error> {
            if bits & flag != 0 {
                get_u8(buf).map(Some)
            } else {
                Ok(None)
            }
        };

        Ok(Self {
            content_type: short(buf, flags::CONTENT_TYPE)?,
            content_encoding: short(buf, flags::CONTENT_ENCODING)?,
            headers: match bits & flags::HEADERS != 0 {
                true => Some(FieldTable::decode(buf)?),
                false => None,
            },
            delivery_mode: octet(buf, flags::DELIVERY_MODE)?,
            priority: octet(buf, flags::PRIORITY)?,
            correlation_id: short(buf, flags::CORRELATION_ID)?,
            reply_to: short(buf, flags::REPLY_TO)?,
            expiration: short(buf, flags::EXPIRATION)?,
            message_id: short(buf, flags::MESSAGE_ID)?,
            timestamp: match bits & flags::TIMESTAMP != 0 {
                true => Some(Timestamp::from_seconds(get_u64(buf)?)),
                false => None,
            },
            kind: short(buf, flags::TYPE)?,
            user_id: short(buf, flags::USER_ID)?,
            app_id: short(buf, flags::APP_ID)?,
            cluster_id: short(buf, flags::CLUSTER_ID)?,
        })
    }
}

/// Payload of a content header frame
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    /// Class of the content, always the basic class
    pub class_id: u16,

    /// Total size of the body frames that follow
    pub body_size: u64,

    /// Message properties
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Creates a header of the basic class
    pub fn new(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: BASIC,
            body_size,
            properties,
        }
    }

    /// Writes class id, weight, body size and the properties
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(self.class_id);
        buf.put_u16(0);
        buf.put_u64(self.body_size);
        self.properties.encode(buf)
    }

    /// Reads a complete content header payload
    pub fn decode(mut buf: Bytes) -> Result<Self, Error> {
        let class_id = get_u16(&mut buf)?;
        if class_id != BASIC {
            return Err(Error::UnsupportedContentClass(class_id));
        }
        let _weight = get_u16(&mut buf)?;
        let body_size = get_u64(&mut buf)?;
        let properties = BasicProperties::decode(&mut buf)?;
        if buf.has_remaining() {
            return Err(Error::TrailingBytes(buf.remaining()));
        }
        Ok(Self {
            class_id,
            body_size,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    fn encode(header: &ContentHeader) -> Bytes {
        let mut buf = BytesMut::new();
        header.encode(&mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn absent_properties_take_no_space() {
        let header = ContentHeader::new(5, BasicProperties::default());
        let bytes = encode(&header);
        assert_eq!(
            &bytes[..],
            &[0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0]
        );
        assert_eq!(ContentHeader::decode(bytes).unwrap(), header);
    }

    #[test]
    fn flags_follow_property_order() {
        let props = BasicProperties::default()
            .with_content_type("text/plain")
            .with_delivery_mode(PERSISTENT)
            .with_cluster_id("c");
        assert_eq!(props.flags(), 0x8000 | 0x1000 | 0x0004);

        let mut buf = BytesMut::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[
                0x90, 0x04, 10, b't', b'e', b'x', b't', b'/', b'p', b'l', b'a', b'i', b'n', 2, 1,
                b'c'
            ]
        );
    }

    #[test]
    fn every_property_round_trips() {
        let mut headers = FieldTable::new();
        headers.insert("x-retries", 3i32);
        let props = BasicProperties::default()
            .with_content_type("application/json")
            .with_content_encoding("gzip")
            .with_headers(headers)
            .with_delivery_mode(TRANSIENT)
            .with_priority(9)
            .with_correlation_id("corr")
            .with_reply_to("amq.rabbitmq.reply-to")
            .with_expiration("60000")
            .with_message_id("id-1")
            .with_timestamp(Timestamp::from_seconds(1_700_000_000))
            .with_kind("event")
            .with_user_id("guest")
            .with_app_id("app")
            .with_cluster_id("cluster");
        let header = ContentHeader::new(u64::MAX, props);
        assert_eq!(ContentHeader::decode(encode(&header)).unwrap(), header);
    }

    #[test]
    fn continuation_flag_is_rejected() {
        let bytes = Bytes::from_static(&[0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(
            ContentHeader::decode(bytes),
            Err(Error::InvalidPropertyFlags(0x0001))
        );
    }

    #[test]
    fn non_basic_class_is_rejected() {
        let bytes = Bytes::from_static(&[0, 50, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            ContentHeader::decode(bytes),
            Err(Error::UnsupportedContentClass(50))
        );
    }
}
