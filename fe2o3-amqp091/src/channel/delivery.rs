//! Messages received from the server

use bytes::Bytes;
use fe2o3_amqp091_types::{definitions::ReplyCode, properties::BasicProperties};

use super::{Channel, Error};

/// A message delivered to a consumer or fetched with Basic.Get
#[derive(Debug, Clone)]
pub struct Delivery {
    pub(crate) acker: Option<Channel>,

    /// Consumer tag, empty for a message fetched with Basic.Get
    pub consumer_tag: String,

    /// Delivery tag, unique per channel
    pub delivery_tag: u64,

    /// Whether the message was delivered before
    pub redelivered: bool,

    /// Exchange the message was originally published to
    pub exchange: String,

    /// Routing key used when the message was published
    pub routing_key: String,

    /// Number of messages remaining in the queue, only set for Basic.Get
    pub message_count: Option<u32>,

    /// Content properties
    pub properties: BasicProperties,

    /// Message body
    pub body: Bytes,
}

impl Delivery {
    pub(crate) fn with_acker(mut self, channel: &Channel) -> Self {
        self.acker = Some(channel.clone());
        self
    }

    fn acker(&self) -> Result<&Channel, Error> {
        self.acker.as_ref().ok_or(Error::Closed)
    }

    /// Acknowledges this delivery, and all earlier ones if `multiple` is set
    pub async fn ack(&self, multiple: bool) -> Result<(), Error> {
        self.acker()?.ack(self.delivery_tag, multiple).await
    }

    /// Negatively acknowledges this delivery
    pub async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), Error> {
        self.acker()?
            .nack(self.delivery_tag, multiple, requeue)
            .await
    }

    /// Rejects this delivery
    pub async fn reject(&self, requeue: bool) -> Result<(), Error> {
        self.acker()?.reject(self.delivery_tag, requeue).await
    }
}

/// A mandatory or immediate message that the server could not route
#[derive(Debug, Clone, PartialEq)]
pub struct Returned {
    /// Why the message was returned
    pub reply_code: ReplyCode,

    /// Human readable reason
    pub reply_text: String,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used when the message was published
    pub routing_key: String,

    /// Content properties
    pub properties: BasicProperties,

    /// Message body
    pub body: Bytes,
}
