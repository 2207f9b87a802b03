//! Methods of the basic class

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    definitions::{class::BASIC, ReplyCode},
    primitives::{get_bits, get_short_str, get_u16, get_u32, get_u64, put_bits, put_short_str},
    value::FieldTable,
    Error,
};

use super::MethodArgs;

/// Specify quality of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qos {
    /// Prefetch window in octets, 0 means no limit
    pub prefetch_size: u32,

    /// Prefetch window in messages, 0 means no limit
    pub prefetch_count: u16,

    /// Apply to the whole connection (RabbitMQ: to every consumer on the
    /// channel)
    pub global: bool,
}

impl MethodArgs for Qos {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 10;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u32(self.prefetch_size);
        buf.put_u16(self.prefetch_count);
        put_bits(buf, &[self.global]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let prefetch_size = get_u32(buf)?;
        let prefetch_count = get_u16(buf)?;
        let [global] = get_bits(buf)?;
        Ok(Self {
            prefetch_size,
            prefetch_count,
            global,
        })
    }
}

empty_method! {
    /// Confirm the requested qos
    QosOk, BASIC, 11
}

/// Start a queue consumer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Consume {
    /// Queue name
    pub queue: String,

    /// Consumer tag, the server generates one if empty
    pub consumer_tag: String,

    /// Do not deliver messages published on this connection
    pub no_local: bool,

    /// Messages are considered acknowledged once delivered
    pub no_ack: bool,

    /// Request exclusive consumer access
    pub exclusive: bool,

    /// Do not send a reply method
    pub no_wait: bool,

    /// Consumer arguments
    pub arguments: FieldTable,
}

impl MethodArgs for Consume {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 20;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_short_str(buf, &self.consumer_tag)?;
        put_bits(
            buf,
            &[self.no_local, self.no_ack, self.exclusive, self.no_wait],
        );
        self.arguments.encode(buf)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let consumer_tag = get_short_str(buf)?;
        let [no_local, no_ack, exclusive, no_wait] = get_bits(buf)?;
        Ok(Self {
            queue,
            consumer_tag,
            no_local,
            no_ack,
            exclusive,
            no_wait,
            arguments: FieldTable::decode(buf)?,
        })
    }
}

/// Confirm a new consumer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumeOk {
    /// Consumer tag
    pub consumer_tag: String,
}

impl MethodArgs for ConsumeOk {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 21;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.consumer_tag)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: get_short_str(buf)?,
        })
    }
}

/// End a queue consumer
///
/// Sent by the server as well when the queue of the consumer goes away
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cancel {
    /// Consumer tag
    pub consumer_tag: String,

    /// Do not send a reply method
    pub no_wait: bool,
}

impl MethodArgs for Cancel {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 30;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.consumer_tag)?;
        put_bits(buf, &[self.no_wait]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let consumer_tag = get_short_str(buf)?;
        let [no_wait] = get_bits(buf)?;
        Ok(Self {
            consumer_tag,
            no_wait,
        })
    }
}

/// Confirm a cancelled consumer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CancelOk {
    /// Consumer tag
    pub consumer_tag: String,
}

impl MethodArgs for CancelOk {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 31;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.consumer_tag)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: get_short_str(buf)?,
        })
    }
}

/// Publish a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Publish {
    /// Exchange name, empty for the default exchange
    pub exchange: String,

    /// Routing key
    pub routing_key: String,

    /// Return the message if it cannot be routed to a queue
    pub mandatory: bool,

    /// Return the message if it cannot be delivered to a consumer
    /// immediately
    pub immediate: bool,
}

impl MethodArgs for Publish {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 40;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)?;
        put_bits(buf, &[self.mandatory, self.immediate]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let exchange = get_short_str(buf)?;
        let routing_key = get_short_str(buf)?;
        let [mandatory, immediate] = get_bits(buf)?;
        Ok(Self {
            exchange,
            routing_key,
            mandatory,
            immediate,
        })
    }
}

/// Return an undeliverable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    /// Reply code
    pub reply_code: ReplyCode,

    /// Reply text
    pub reply_text: String,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used when publishing
    pub routing_key: String,
}

impl MethodArgs for Return {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 50;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(self.reply_code.into());
        put_short_str(buf, &self.reply_text)?;
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reply_code: ReplyCode::from(get_u16(buf)?),
            reply_text: get_short_str(buf)?,
            exchange: get_short_str(buf)?,
            routing_key: get_short_str(buf)?,
        })
    }
}

/// Notify the client of a consumer message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Deliver {
    /// Consumer tag
    pub consumer_tag: String,

    /// Server assigned delivery tag, scoped to the channel
    pub delivery_tag: u64,

    /// The message may have been delivered before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used when publishing
    pub routing_key: String,
}

impl MethodArgs for Deliver {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 60;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, &self.consumer_tag)?;
        buf.put_u64(self.delivery_tag);
        put_bits(buf, &[self.redelivered]);
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let consumer_tag = get_short_str(buf)?;
        let delivery_tag = get_u64(buf)?;
        let [redelivered] = get_bits(buf)?;
        Ok(Self {
            consumer_tag,
            delivery_tag,
            redelivered,
            exchange: get_short_str(buf)?,
            routing_key: get_short_str(buf)?,
        })
    }
}

/// Direct access to a queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Get {
    /// Queue name
    pub queue: String,

    /// The message is considered acknowledged once delivered
    pub no_ack: bool,
}

impl MethodArgs for Get {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 70;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u16(0);
        put_short_str(buf, &self.queue)?;
        put_bits(buf, &[self.no_ack]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_u16(buf)?;
        let queue = get_short_str(buf)?;
        let [no_ack] = get_bits(buf)?;
        Ok(Self { queue, no_ack })
    }
}

/// Provide the client with a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetOk {
    /// Server assigned delivery tag
    pub delivery_tag: u64,

    /// The message may have been delivered before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used when publishing
    pub routing_key: String,

    /// Number of messages remaining in the queue
    pub message_count: u32,
}

impl MethodArgs for GetOk {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 71;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u64(self.delivery_tag);
        put_bits(buf, &[self.redelivered]);
        put_short_str(buf, &self.exchange)?;
        put_short_str(buf, &self.routing_key)?;
        buf.put_u32(self.message_count);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let delivery_tag = get_u64(buf)?;
        let [redelivered] = get_bits(buf)?;
        Ok(Self {
            delivery_tag,
            redelivered,
            exchange: get_short_str(buf)?,
            routing_key: get_short_str(buf)?,
            message_count: get_u32(buf)?,
        })
    }
}

/// The queue is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetEmpty;

impl MethodArgs for GetEmpty {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 72;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_short_str(buf, "")
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let _ = get_short_str(buf)?;
        Ok(Self)
    }
}

/// Acknowledge one or more messages
///
/// Sent by the server on a channel in confirm mode to confirm publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    /// Delivery tag
    pub delivery_tag: u64,

    /// Acknowledge every message up to and including the tag
    pub multiple: bool,
}

impl MethodArgs for Ack {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 80;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u64(self.delivery_tag);
        put_bits(buf, &[self.multiple]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let delivery_tag = get_u64(buf)?;
        let [multiple] = get_bits(buf)?;
        Ok(Self {
            delivery_tag,
            multiple,
        })
    }
}

/// Reject an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reject {
    /// Delivery tag
    pub delivery_tag: u64,

    /// Requeue the message instead of discarding it
    pub requeue: bool,
}

impl MethodArgs for Reject {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 90;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u64(self.delivery_tag);
        put_bits(buf, &[self.requeue]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let delivery_tag = get_u64(buf)?;
        let [requeue] = get_bits(buf)?;
        Ok(Self {
            delivery_tag,
            requeue,
        })
    }
}

/// Redeliver unacknowledged messages, without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoverAsync {
    /// Requeue the messages instead of redelivering to the same consumer
    pub requeue: bool,
}

impl MethodArgs for RecoverAsync {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 100;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_bits(buf, &[self.requeue]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let [requeue] = get_bits(buf)?;
        Ok(Self { requeue })
    }
}

/// Redeliver unacknowledged messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Recover {
    /// Requeue the messages instead of redelivering to the same consumer
    pub requeue: bool,
}

impl MethodArgs for Recover {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 110;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        put_bits(buf, &[self.requeue]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let [requeue] = get_bits(buf)?;
        Ok(Self { requeue })
    }
}

empty_method! {
    /// Confirm recovery
    RecoverOk, BASIC, 111
}

/// Reject one or more incoming messages
///
/// Sent by the server on a channel in confirm mode for publishes it failed
/// to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nack {
    /// Delivery tag
    pub delivery_tag: u64,

    /// Reject every message up to and including the tag
    pub multiple: bool,

    /// Requeue the messages instead of discarding them
    pub requeue: bool,
}

impl MethodArgs for Nack {
    const CLASS_ID: u16 = BASIC;
    const METHOD_ID: u16 = 120;

    fn encode_args(&self, buf: &mut BytesMut) -> Result<(), Error> {
        buf.put_u64(self.delivery_tag);
        put_bits(buf, &[self.multiple, self.requeue]);
        Ok(())
    }

    fn decode_args(buf: &mut Bytes) -> Result<Self, Error> {
        let delivery_tag = get_u64(buf)?;
        let [multiple, requeue] = get_bits(buf)?;
        Ok(Self {
            delivery_tag,
            multiple,
            requeue,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn nack_packs_multiple_and_requeue_into_one_octet() {
        let nack = Nack {
            delivery_tag: 7,
            multiple: true,
            requeue: true,
        };
        let mut buf = BytesMut::new();
        nack.encode_args(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 0, 0, 7, 0b11]);
        assert_eq!(Nack::decode_args(&mut buf.freeze()).unwrap(), nack);
    }

    #[test]
    fn get_ok_reads_message_count_after_strings() {
        let get_ok = GetOk {
            delivery_tag: 1,
            redelivered: false,
            exchange: "amq.direct".into(),
            routing_key: "key".into(),
            message_count: 3,
        };
        let mut buf = BytesMut::new();
        get_ok.encode_args(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(GetOk::decode_args(&mut bytes).unwrap(), get_ok);
        assert!(bytes.is_empty());
    }
}
