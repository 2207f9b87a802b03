//! Methods of the queue class

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    definitions::class::QUEUE,
    primitives::{get_bits, get_short_str, get_u16, get_u32, put_bits, put_short_str},
    value::FieldTable,
    Error,
};

use super::MethodArgs;

/// Declare a queue, create if needed
///
/// An empty queue name asks the server to generate one
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declare {
    /// Queue name
    pub queue: String,

    /// Do not create the queue, only check that it exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Only accessible by the declaring connection
    pub exclusive: bool,

    /// Delete when the last consumer unsubscribes
    pub auto_delete: bool,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Implementation specific arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Declare {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_bits(
            buf,
            &[
                self.passive,
                self.durable,
                self.exclusive,
                self.auto_delete,
                self.no_wait,
            ],
        );
        self.arguments.encode(buf)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let [passive, durable, exclusive, auto_delete, no_wait] = get_bits(buf)?;
        Ok(Self {
            queue,
            passive,
            durable,
            exclusive,
            auto_delete,
            no_wait,
            arguments: FieldTable::decode(buf)?,
        })
    }
}

/// Confirm a queue declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeclareOk {
    /// Queue name, possibly generated by the server
    pub queue: String,

    /// Number of messages in the queue
    pub message_count: u32,

    /// Number of active consumers
    pub consumer_count: u32,
}

impl MethodArgs for DeclareOk {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 11;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.queue)?;
        buf.put_u32(self.message_count);
        buf.put_u32(self.consumer_count);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            queue: get_short_str(buf)?,
            message_count: get_u32(buf)?,
            consumer_count: get_u32(buf)?,
        })
    }
}

/// Bind a queue to an exchange
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bind {
    /// Queue name
    pub queue: String,

    /// Exchange name
    pub exchange: String,

    /// Routing key of the binding
    pub routing_key: String,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Binding arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Bind {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 20;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)?;
        put_bits(buf, &[self.no_wait]);
        self.arguments.encode(buf)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let exchange = get_short_str(buf)?;
        let routing_key = get_short_str(buf)?;
        let [no_wait] = get_bits(buf)?;
        Ok(Self {
            queue,
            exchange,
            routing_key,
            no_wait,
            arguments: FieldTable::decode(buf)?,
        })
    }
}

empty_method! {
    /// Confirm a queue binding
    BindOk, QUEUE, 21
}

/// Purge a queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Purge {
    /// Queue name
    pub queue: String,

    /// Do not send a reply method
    pub no_wait: bool,
}

impl MethodArgs for Purge {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 30;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_bits(buf, &[self.no_wait]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let [no_wait] = get_bits(buf)?;
        Ok(Self { queue, no_wait })
    }
}

/// Confirm a queue purge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeOk {
    /// Number of messages purged
    pub message_count: u32,
}

impl MethodArgs for PurgeOk {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 31;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u32(self.message_count);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            message_count: get_u32(buf)?,
        })
    }
}

/// Delete a queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delete {
    /// Queue name
    pub queue: String,

    /// Only delete if the queue has no consumers
    pub if_unused: bool,

    /// Only delete if the queue has no messages
    pub if_empty: bool,

    /// Do not send a reply method
    pub no_wait: bool,
}

impl MethodArgs for Delete {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 40;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_bits(buf, &[self.if_unused, self.if_empty, self.no_wait]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let [if_unused, if_empty, no_wait] = get_bits(buf)?;
        Ok(Self {
            queue,
            if_unused,
            if_empty,
            no_wait,
        })
    }
}

/// Confirm the deletion of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOk {
    /// Number of messages deleted
    pub message_count: u32,
}

impl MethodArgs for DeleteOk {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 41;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u32(self.message_count);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            message_count: get_u32(buf)?,
        })
    }
}

/// Unbind a queue from an exchange
///
/// Always synchronous, there is no `no-wait` bit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unbind {
    /// Queue name
    pub queue: String,

    /// Exchange name
    pub exchange: String,

    /// Routing key of the binding
    pub routing_key: String,

    /// Binding arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Unbind {
    const CLASS_ID: u16 = QUEUE;
    const METHOD_ID: u16 = 50;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)?;
        self.arguments.encode(buf)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        Ok(Self {
            queue: get_short_str(buf)?,
            exchange: get_short_str(buf)?,
            routing_key: get_short_str(buf)?,
            arguments: FieldTable::decode(buf)?,
        })
    }
}

empty_method! {
    /// Confirm the removal of a queue binding
    UnbindOk, QUEUE, 51
}
