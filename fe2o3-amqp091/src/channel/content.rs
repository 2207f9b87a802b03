//! Reassembly of content carried by Basic.Deliver, Basic.Return and
//! Basic.GetOk

use bytes::{Bytes, BytesMut};
use fe2o3_amqp091_types::{
    definitions::{self, ReplyCode},
    methods::{basic, Method},
    properties::{BasicProperties, ContentHeader},
};

use super::delivery::{Delivery, Returned};

/// Upper bound of the buffer reserved up front, larger bodies grow as
/// body frames arrive
const MAX_PREALLOCATED: u64 = 1024 * 1024;

/// The method that announced the content
#[derive(Debug, Clone)]
pub(crate) enum ContentMethod {
    Deliver(basic::Deliver),
    Return(basic::Return),
    GetOk(basic::GetOk),
}

impl ContentMethod {
    /// Hands the method back if it does not carry content from the server
    pub fn from_method(method: Method) -> Result<Self, Method> {
        match method {
            Method::BasicDeliver(m) => Ok(Self::Deliver(m)),
            Method::BasicReturn(m) => Ok(Self::Return(m)),
            Method::BasicGetOk(m) => Ok(Self::GetOk(m)),
            other => Err(other),
        }
    }
}

/// Fully reassembled content
#[derive(Debug)]
pub(crate) enum Content {
    Delivery(Delivery),
    Returned(Returned),
    GetOk(Delivery),
}

/// Result of feeding a frame into [`IncompleteContent`]
#[derive(Debug)]
pub(crate) enum Progress {
    Incomplete(IncompleteContent),
    Complete(Content),
}

/// A content method waiting for its header and body frames
#[derive(Debug)]
pub(crate) struct IncompleteContent {
    method: ContentMethod,
    properties: Option<BasicProperties>,
    body: BytesMut,
    remaining: u64,
}

impl IncompleteContent {
    pub fn new(method: ContentMethod) -> Self {
        Self {
            method,
            properties: None,
            body: BytesMut::new(),
            remaining: 0,
        }
    }

    pub fn on_header(mut self, header: ContentHeader) -> Result<Progress, definitions::Error> {
        if self.properties.is_some() {
            return Err(definitions::Error::new(
                ReplyCode::UnexpectedFrame,
                "Content header received twice",
            ));
        }
        let ContentHeader {
            body_size,
            properties,
            ..
        } = header;
        self.properties = Some(properties);
        self.remaining = body_size;
        self.body = BytesMut::with_capacity(body_size.min(MAX_PREALLOCATED) as usize);
        self.try_complete()
    }

    pub fn on_body(mut self, chunk: Bytes) -> Result<Progress, definitions::Error> {
        if self.properties.is_none() {
            return Err(definitions::Error::new(
                ReplyCode::UnexpectedFrame,
                "Content body received before content header",
            ));
        }
        let len = chunk.len() as u64;
        if len > self.remaining {
            return Err(definitions::Error::new(
                ReplyCode::FrameError,
                format!(
                    "Content body exceeds declared size by {} bytes",
                    len - self.remaining
                ),
            ));
        }
        self.remaining -= len;
        self.body.extend_from_slice(&chunk);
        self.try_complete()
    }

    fn try_complete(self) -> Result<Progress, definitions::Error> {
        if self.remaining > 0 {
            return Ok(Progress::Incomplete(self));
        }
        let properties = self.properties.unwrap_or_default();
        let body = self.body.freeze();
        let content = match self.method {
            ContentMethod::Deliver(m) => Content::Delivery(Delivery {
                acker: None,
                consumer_tag: m.consumer_tag,
                delivery_tag: m.delivery_tag,
                redelivered: m.redelivered,
                exchange: m.exchange,
                routing_key: m.routing_key,
                message_count: None,
                properties,
                body,
            }),
            ContentMethod::Return(m) => Content::Returned(Returned {
                reply_code: m.reply_code,
                reply_text: m.reply_text,
                exchange: m.exchange,
                routing_key: m.routing_key,
                properties,
                body,
            }),
            ContentMethod::GetOk(m) => Content::GetOk(Delivery {
                acker: None,
                consumer_tag: String::new(),
                delivery_tag: m.delivery_tag,
                redelivered: m.redelivered,
                exchange: m.exchange,
                routing_key: m.routing_key,
                message_count: Some(m.message_count),
                properties,
                body,
            }),
        };
        Ok(Progress::Complete(content))
    }
}
