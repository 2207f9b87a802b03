//! Methods of the confirm class

use bytes::{Bytes, BytesMut};

use crate::{
    definitions::class::CONFIRM,
    primitives::{get_bits, put_bits},
    Error,
};

use super::MethodArgs;

/// Put the channel in publisher confirm mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select {
    /// Do not send a reply method
    pub no_wait: bool,
}

impl MethodArgs for Select {
    const CLASS_ID: u16 = CONFIRM;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_bits(buf, &[self.no_wait]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let [no_wait] = get_bits(buf)?;
        Ok(Self { no_wait })
    }
}

empty_method! {
    /// Confirm the select method
    SelectOk, CONFIRM, 11
}
