//! Methods of the channel class

use bytes::{Bytes, BytesMut};

use crate::{
    definitions::{self, class::CHANNEL, ReplyCode},
    primitives::{get_bits, get_long_bytes, get_short_str, put_bits, put_long_bytes, put_short_str},
    Error,
};

use super::{decode_close, encode_close, MethodArgs};

/// Open a channel for use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Open;

impl MethodArgs for Open {
    const CLASS_ID: u16 = CHANNEL;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, "")
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_short_str(buf)?;
        Ok(Self)
    }
}

/// Signal that the channel is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOk;

impl MethodArgs for OpenOk {
    const CLASS_ID: u16 = CHANNEL;
    const METHOD_ID: u16 = 11;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_long_bytes(buf, &[])
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_long_bytes(buf)?;
        Ok(Self)
    }
}

/// Enable or disable the flow of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow {
    /// Start or stop sending content
    pub active: bool,
}

impl MethodArgs for Flow {
    const CLASS_ID: u16 = CHANNEL;
    const METHOD_ID: u16 = 20;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_bits(buf, &[self.active]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let [active] = get_bits(buf)?;
        Ok(Self { active })
    }
}

/// Confirm a flow method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowOk {
    /// Current flow setting
    pub active: bool,
}

impl MethodArgs for FlowOk {
    const CLASS_ID: u16 = CHANNEL;
    const METHOD_ID: u16 = 21;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_bits(buf, &[self.active]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let [active] = get_bits(buf)?;
        Ok(Self { active })
    }
}

/// Request a channel close
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
    const CLASS_ID: u16 = CHANNEL;
    const METHOD_ID: u16 = 40;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_close(buf, &definitions::Error::from(self.clone()))
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        decode_close(buf).map(Self::from)
    }
}

empty_method! {
    /// Confirm a channel close
    CloseOk, CHANNEL, 41
}
