//! Methods of the exchange class

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    definitions::class::EXCHANGE,
    primitives::{get_bits, get_short_str, get_u16, put_bits, put_short_str},
    value::FieldTable,
    Error,
};

use super::MethodArgs;

/// Verify an exchange exists, create if needed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declare {
    /// Exchange name
    pub exchange: String,

    /// Exchange type, eg. `direct`, `fanout`, `topic` or `headers`
    pub kind: String,

    /// Do not create the exchange, only check that it exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Delete when the last binding is removed
    pub auto_delete: bool,

    /// May not be published to directly
    pub internal: bool,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Implementation specific arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Declare {
    const CLASS_ID: u16 = EXCHANGE;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.kind)?;
        put_bits(
            buf,
            &[
                self.passive,
                self.durable,
                self.auto_delete,
                self.internal,
                self.no_wait,
            ],
        );
        self.arguments.encode(buf)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let exchange = get_short_str(buf)?;
        let kind = get_short_str(buf)?;
        let [passive, durable, auto_delete, internal, no_wait] = get_bits(buf)?;
        Ok(Self {
            exchange,
            kind,
            passive,
            durable,
            auto_delete,
            internal,
            no_wait,
            arguments: FieldTable::decode(buf)?,
        })
    }
}

empty_method! {
    /// Confirm an exchange declaration
    DeclareOk, EXCHANGE, 11
}

/// Delete an exchange
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delete {
    /// Exchange name
    pub exchange: String,

    /// Only delete the exchange if it has no bindings
    pub if_unused: bool,

    /// Do not send a reply method
    pub no_wait: bool,
}

impl MethodArgs for Delete {
    const CLASS_ID: u16 = EXCHANGE;
    const METHOD_ID: u16 = 20;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.exchange)?;
        put_bits(buf, &[self.if_unused, self.no_wait]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let exchange = get_short_str(buf)?;
        let [if_unused, no_wait] = get_bits(buf)?;
        Ok(Self {
            exchange,
            if_unused,
            no_wait,
        })
    }
}

empty_method! {
    /// Confirm the deletion of an exchange
    DeleteOk, EXCHANGE, 21
}

/// Bind an exchange to an exchange
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bind {
    /// Exchange receiving the messages
    pub destination: String,

    /// Exchange the messages are routed from
    pub source: String,

    /// Routing key of the binding
    pub routing_key: String,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Binding arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Bind {
    const CLASS_ID: u16 = EXCHANGE;
    const METHOD_ID: u16 = 30;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_binding(
            buf,
            &self.destination,
            &self.source,
            &self.routing_key,
            self.no_wait,
            &self.arguments,
        )
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let (destination, source, routing_key, no_wait, arguments) = decode_binding(buf)?;
        Ok(Self {
            destination,
            source,
            routing_key,
            no_wait,
            arguments,
        })
    }
}

empty_method! {
    /// Confirm an exchange to exchange binding
    BindOk, EXCHANGE, 31
}

/// Unbind an exchange from an exchange
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unbind {
    /// Exchange receiving the messages
    pub destination: String,

    /// Exchange the messages are routed from
    pub source: String,

    /// Routing key of the binding
    pub routing_key: String,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Binding arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Unbind {
    const CLASS_ID: u16 = EXCHANGE;
    const METHOD_ID: u16 = 40;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_binding(
            buf,
            &self.destination,
            &self.source,
            &self.routing_key,
            self.no_wait,
            &self.arguments,
        )
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let (destination, source, routing_key, no_wait, arguments) = decode_binding(buf)?;
        Ok(Self {
            destination,
            source,
            routing_key,
            no_wait,
            arguments,
        })
    }
}

// RabbitMQ assigns 51 to unbind-ok
empty_method! {
    /// Confirm the removal of an exchange to exchange binding
    UnbindOk, EXCHANGE, 51
}

fn encode_binding(
    buf: &mut BytesMut,
    destination: &str,
    source: &str,
    routing_key: &str,
    no_wait: bool,
    arguments: &FieldTable,
) -> Result<(), Error> {
    buf.put_u16(0);
    put_short_str(buf, destination)?;
    put_short_str(buf, source)?;
    put_short_str(buf, routing_key)?;
    put_bits(buf, &[no_wait]);
    arguments.encode(buf)
}

fn decode_binding(buf: &mut Bytes) -> Result<(String, String, String, bool, FieldTable), Error> {
    let _ = get_u16(buf)?;
    let destination = get_short_str(buf)?;
    let source = get_short_str(buf)?;
    let routing_key = get_short_str(buf)?;
    let [no_wait] = get_bits(buf)?;
    let arguments = FieldTable::decode(buf)?;
    Ok((destination, source, routing_key, no_wait, arguments))
}
