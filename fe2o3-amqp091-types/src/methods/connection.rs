//! Methods of the connection class

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    definitions::{self, class::CONNECTION, ReplyCode},
    primitives::{
        get_bits, get_long_bytes, get_short_str, get_u16, get_u32, get_u8, put_bits,
        put_long_bytes, put_short_str,
    },
    value::{FieldTable, LongString},
    Error,
};

use super::{decode_close, encode_close, MethodArgs};

/// Start connection negotiation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Start {
    /// Protocol major version
    pub version_major: u8,

    /// Protocol minor version
    pub version_minor: u8,

    /// Server properties
    pub server_properties: FieldTable,

    /// Space separated list of SASL mechanisms
    pub mechanisms: LongString,

    /// Space separated list of message locales
    pub locales: LongString,
}

impl MethodArgs for Start {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u8(self.version_major);
        buf.put_u8(self.version_minor);
        self.server_properties.encode(buf)?;
        put_long_bytes(buf, self.mechanisms.as_bytes())?;
        put_long_bytes(buf, self.locales.as_bytes())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            version_major: get_u8(buf)?,
            version_minor: get_u8(buf)?,
            server_properties: FieldTable::decode(buf)?,
            mechanisms: get_long_bytes(buf)?.to_vec().into(),
            locales: get_long_bytes(buf)?.to_vec().into(),
        })
    }
}

/// Select security mechanism and locale
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StartOk {
    /// Client properties
    pub client_properties: FieldTable,

    /// Selected SASL mechanism
    pub mechanism: String,

    /// Initial SASL response
    pub response: LongString,

    /// Selected message locale
    pub locale: String,
}

impl MethodArgs for StartOk {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 11;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        self.client_properties.encode(buf)?;
        put_short_str(buf, &self.mechanism)?;
        put_long_bytes(buf, self.response.as_bytes())?;
        put_short_str(buf, &self.locale)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            client_properties: FieldTable::decode(buf)?,
            mechanism: get_short_str(buf)?,
            response: get_long_bytes(buf)?.to_vec().into(),
            locale: get_short_str(buf)?,
        })
    }
}

/// Security mechanism challenge
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Secure {
    /// Challenge data
    pub challenge: LongString,
}

impl MethodArgs for Secure {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 20;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_long_bytes(buf, self.challenge.as_bytes())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            challenge: get_long_bytes(buf)?.to_vec().into(),
        })
    }
}

/// Security mechanism response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecureOk {
    /// Response data
    pub response: LongString,
}

impl MethodArgs for SecureOk {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 21;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_long_bytes(buf, self.response.as_bytes())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            response: get_long_bytes(buf)?.to_vec().into(),
        })
    }
}

/// Proposed connection tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tune {
    /// Highest channel number, 0 means no limit
    pub channel_max: u16,

    /// Largest frame size, 0 means no limit
    pub frame_max: u32,

    /// Heartbeat delay in seconds, 0 disables heartbeats
    pub heartbeat: u16,
}

impl MethodArgs for Tune {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 30;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_tune(buf, self.channel_max, self.frame_max, self.heartbeat);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let (channel_max, frame_max, heartbeat) = decode_tune(buf)?;
        Ok(Self {
            channel_max,
            frame_max,
            heartbeat,
        })
    }
}

/// Negotiated connection tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TuneOk {
    /// Negotiated channel max
    pub channel_max: u16,

    /// Negotiated frame max
    pub frame_max: u32,

    /// Negotiated heartbeat delay in seconds
    pub heartbeat: u16,
}

impl MethodArgs for TuneOk {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 31;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_tune(buf, self.channel_max, self.frame_max, self.heartbeat);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let (channel_max, frame_max, heartbeat) = decode_tune(buf)?;
        Ok(Self {
            channel_max,
            frame_max,
            heartbeat,
        })
    }
}

fn encode_tune(buf: &mut BytesMut, channel_max: u16, frame_max: u32, heartbeat: u16) {
    buf.put_u16(channel_max);
    buf.put_u32(frame_max);
    buf.put_u16(heartbeat);
}

fn decode_tune(buf: &mut Bytes) -> Result<(u16, u32, u16), Error> {
    Ok((get_u16(buf)?, get_u32(buf)?, get_u16(buf)?))
}

/// Open connection to virtual host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    /// Virtual host name
    pub virtual_host: String,
}

impl Default for Open {
    fn default() -> Self {
        Self {
            virtual_host: String::from("/"),
        }
    }
}

impl MethodArgs for Open {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 40;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.virtual_host)?;
        // reserved capabilities and insist bit
        put_short_str(buf, "")?;
        put_bits(buf, &[false]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let virtual_host = get_short_str(buf)?;
        let _ = get_short_str(buf)?;
        let _ = get_bits::<1>(buf)?;
        Ok(Self { virtual_host })
    }
}

/// Signal that the connection is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOk;

impl MethodArgs for OpenOk {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 41;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, "")
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_short_str(buf)?;
        Ok(Self)
    }
}

/// Request a connection close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    /// Reply code
    pub reply_code: ReplyCode,

    /// Reply text
    pub reply_text: String,

    /// Class of the failing method
    pub class_id: u16,

    /// Failing method
    pub method_id: u16,
}

impl Default for Close {
    fn default() -> Self {
        Self::from(definitions::Error::new(ReplyCode::ReplySuccess, "Goodbye"))
    }
}

impl From<definitions::Error> for Close {
    fn from(error: definitions::Error) -> Self {
        Self {
            reply_code: error.code,
            reply_text: error.text,
            class_id: error.class_id,
            method_id: error.method_id,
        }
    }
}

impl From<Close> for definitions::Error {
    fn from(close: Close) -> Self {
        Self {
            code: close.reply_code,
            text: close.reply_text,
            class_id: close.class_id,
            method_id: close.method_id,
        }
    }
}

impl MethodArgs for Close {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 50;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_close(buf, &definitions::Error::from(self.clone()))
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        decode_close(buf).map(Self::from)
    }
}

empty_method! {
    /// Confirm a connection close
    CloseOk, CONNECTION, 51
}

/// The server is blocking publishers, eg. because of a resource alarm
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blocked {
    /// Reason for blocking
    pub reason: String,
}

impl MethodArgs for Blocked {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 60;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.reason)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reason: get_short_str(buf)?,
        })
    }
}

empty_method! {
    /// The server no longer blocks publishers
    Unblocked, CONNECTION, 61
}

/// Replace the secret (eg. an expiring token) used to authenticate the
/// connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateSecret {
    /// New secret
    pub new_secret: LongString,

    /// Reason for the update
    pub reason: String,
}

impl MethodArgs for UpdateSecret {
    const CLASS_ID: u16 = CONNECTION;
    const METHOD_ID: u16 = 70;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_long_bytes(buf, self.new_secret.as_bytes())?;
        put_short_str(buf, &self.reason)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            new_secret: get_long_bytes(buf)?.to_vec().into(),
            reason: get_short_str(buf)?,
        })
    }
}

empty_method! {
    /// Confirm a secret update
    UpdateSecretOk, CONNECTION, 71
}
