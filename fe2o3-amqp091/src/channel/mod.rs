//! Implements AMQP 0-9-1 channels
//!
//! A [`Channel`] is a cheap handle to state owned by the connection engine.
//! Synchronous methods are queued per channel and written one at a time, each
//! waiting for its reply. Methods that do not expect a reply (publish, ack,
//! nack, reject and anything sent with `no_wait`) are written right away.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use fe2o3_amqp091_types::{
    definitions::{self, class, FRAME_OVERHEAD},
    methods::{basic, channel, confirm, exchange, queue, tx, Method},
    properties::{BasicProperties, ContentHeader},
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::control::{ChannelControl, ChannelParts, ConnectionControl, Outcome};

mod confirmation;
pub use confirmation::{Confirmation, DeferredConfirmation};

mod consumer;
pub use consumer::Consumer;

mod content;

mod delivery;
pub use delivery::{Delivery, Returned};

pub(crate) mod engine;

mod error;
pub use error::Error;

static CONSUMER_TAG_SEQ: AtomicU64 = AtomicU64::new(1);

fn unique_consumer_tag() -> String {
    let seq = CONSUMER_TAG_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ctag-{}-{}", std::process::id(), seq)
}

/// Whether the client may send the method on a channel
fn is_client_method(method: &Method) -> bool {
    !(method.class_id() == class::CONNECTION
        || method.has_content()
        || method.is_reply()
        || matches!(method, Method::ChannelOpen(_) | Method::ChannelClose(_)))
}

fn unexpected_reply(method: Method) -> Error {
    Error::InvalidMethod(method.name())
}

/// A handle to an open channel
///
/// The handle can be cloned freely, all clones refer to the same channel.
#[derive(Debug, Clone)]
pub struct Channel {
    id: u16,
    serial: u64,
    max_frame_size: usize,
    control: mpsc::Sender<ConnectionControl>,
    closed: watch::Receiver<Option<Result<(), Error>>>,
    flow: watch::Receiver<bool>,
}

impl Channel {
    pub(crate) fn new(
        parts: ChannelParts,
        max_frame_size: usize,
        control: mpsc::Sender<ConnectionControl>,
    ) -> Self {
        Self {
            id: parts.id,
            serial: parts.serial,
            max_frame_size,
            control,
            closed: parts.closed,
            flow: parts.flow,
        }
    }

    /// Channel id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Checks if the channel is closed
    pub fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    /// Whether the server currently allows publishing on this channel
    pub fn is_flow_active(&self) -> bool {
        *self.flow.borrow()
    }

    fn recorded_reason(&self) -> Result<(), Error> {
        self.closed.borrow().clone().unwrap_or(Err(Error::Closed))
    }

    fn closed_error(&self) -> Error {
        match self.recorded_reason() {
            Ok(()) => Error::Closed,
            Err(err) => err,
        }
    }

    fn check_frame(&self, method: &Method) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        method.encode(&mut buf)?;
        let size = buf.len() + FRAME_OVERHEAD;
        if self.max_frame_size != 0 && size > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    async fn send(&self, control: ChannelControl) -> Result<(), Error> {
        self.control
            .send(ConnectionControl::Channel {
                id: self.id,
                serial: self.serial,
                control,
            })
            .await
            .map_err(|_| self.closed_error())
    }

    pub(crate) fn try_cast(&self, method: impl Into<Method>) {
        let (responder, _) = oneshot::channel();
        let control = ChannelControl::Cast {
            method: method.into(),
            consumer: None,
            responder,
        };
        let _ = self.control.try_send(ConnectionControl::Channel {
            id: self.id,
            serial: self.serial,
            control,
        });
    }

    async fn call_inner(
        &self,
        method: Method,
        consumer: Option<mpsc::UnboundedSender<Delivery>>,
    ) -> Result<Outcome, Error> {
        if !is_client_method(&method) || !method.expects_reply() {
            return Err(Error::InvalidMethod(method.name()));
        }
        self.check_frame(&method)?;

        let (responder, outcome) = oneshot::channel();
        self.send(ChannelControl::Call {
            method,
            consumer,
            responder,
        })
        .await?;
        outcome.await.map_err(|_| self.closed_error())?
    }

    async fn cast_inner(
        &self,
        method: Method,
        consumer: Option<mpsc::UnboundedSender<Delivery>>,
    ) -> Result<(), Error> {
        if !is_client_method(&method) || method.expects_reply() {
            return Err(Error::InvalidMethod(method.name()));
        }
        self.check_frame(&method)?;

        let (responder, outcome) = oneshot::channel();
        self.send(ChannelControl::Cast {
            method,
            consumer,
            responder,
        })
        .await?;
        outcome.await.map_err(|_| self.closed_error())?
    }

    /// Sends a synchronous method and waits for its reply
    ///
    /// Calls on the same channel are written in submission order, a call is
    /// only written once the previous one is answered. Dropping the returned
    /// future abandons the call, its reply is then discarded.
    pub async fn call(&self, method: impl Into<Method>) -> Result<Method, Error> {
        match self.call_inner(method.into(), None).await? {
            Outcome::Method(method) => Ok(method),
            Outcome::Delivery(_) => Err(Error::InvalidMethod("basic.get-ok")),
        }
    }

    /// Sends a method that does not expect a reply
    pub async fn cast(&self, method: impl Into<Method>) -> Result<(), Error> {
        self.cast_inner(method.into(), None).await
    }

    /// Calls the method, or casts it if `no_wait` is set
    async fn request(&self, method: impl Into<Method>) -> Result<Option<Method>, Error> {
        let method = method.into();
        match method.expects_reply() {
            true => self.call(method).await.map(Some),
            false => self.cast(method).await.map(|_| None),
        }
    }

    async fn subscribe(&self, control: ChannelControl) -> Result<(), Error> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.send(control).await
    }

    /* ------------------------------ exchange ------------------------------ */

    /// Declares an exchange
    pub async fn exchange_declare(&self, args: exchange::Declare) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /// Checks that an exchange exists. The channel is closed by the server
    /// with 404 if it does not.
    pub async fn exchange_declare_passive(&self, args: exchange::Declare) -> Result<(), Error> {
        let args = exchange::Declare {
            passive: true,
            ..args
        };
        self.exchange_declare(args).await
    }

    /// Deletes an exchange
    pub async fn exchange_delete(&self, args: exchange::Delete) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /// Binds an exchange to another exchange
    pub async fn exchange_bind(&self, args: exchange::Bind) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /// Unbinds an exchange from another exchange
    pub async fn exchange_unbind(&self, args: exchange::Unbind) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /* -------------------------------- queue ------------------------------- */

    /// Declares a queue. An empty name asks the server to generate one, the
    /// generated name is returned in [`queue::DeclareOk`].
    ///
    /// With `no_wait` set, the returned [`queue::DeclareOk`] only carries the
    /// requested name.
    pub async fn queue_declare(&self, args: queue::Declare) -> Result<queue::DeclareOk, Error> {
        let name = args.queue.clone();
        match self.request(args).await? {
            Some(Method::QueueDeclareOk(ok)) => Ok(ok),
            Some(other) => Err(unexpected_reply(other)),
            None => Ok(queue::DeclareOk {
                queue: name,
                message_count: 0,
                consumer_count: 0,
            }),
        }
    }

    /// Checks that a queue exists and returns its message and consumer
    /// counts
    pub async fn queue_declare_passive(
        &self,
        args: queue::Declare,
    ) -> Result<queue::DeclareOk, Error> {
        let args = queue::Declare {
            passive: true,
            ..args
        };
        self.queue_declare(args).await
    }

    /// Binds a queue to an exchange
    pub async fn queue_bind(&self, args: queue::Bind) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /// Unbinds a queue from an exchange
    pub async fn queue_unbind(&self, args: queue::Unbind) -> Result<(), Error> {
        self.request(args).await.map(|_| ())
    }

    /// Purges a queue, returns the number of messages purged
    pub async fn queue_purge(&self, args: queue::Purge) -> Result<u32, Error> {
        match self.request(args).await? {
            Some(Method::QueuePurgeOk(ok)) => Ok(ok.message_count),
            Some(other) => Err(unexpected_reply(other)),
            None => Ok(0),
        }
    }

    /// Deletes a queue, returns the number of messages deleted with it
    pub async fn queue_delete(&self, args: queue::Delete) -> Result<u32, Error> {
        match self.request(args).await? {
            Some(Method::QueueDeleteOk(ok)) => Ok(ok.message_count),
            Some(other) => Err(unexpected_reply(other)),
            None => Ok(0),
        }
    }

    /* -------------------------------- basic ------------------------------- */

    /// Sets the prefetch window for this channel, or for the whole
    /// connection if `global` is set
    pub async fn qos(
        &self,
        prefetch_count: u16,
        prefetch_size: u32,
        global: bool,
    ) -> Result<(), Error> {
        let qos = basic::Qos {
            prefetch_size,
            prefetch_count,
            global,
        };
        self.call(qos).await.map(|_| ())
    }

    /// Starts a consumer. An empty consumer tag is replaced by a tag unique
    /// to this process.
    pub async fn consume(&self, args: basic::Consume) -> Result<Consumer, Error> {
        let mut args = args;
        if args.consumer_tag.is_empty() {
            args.consumer_tag = unique_consumer_tag();
        }
        let tag = args.consumer_tag.clone();
        let (tx, deliveries) = mpsc::unbounded_channel();

        let tag = match args.no_wait {
            true => {
                self.cast_inner(args.into(), Some(tx)).await?;
                tag
            }
            false => match self.call_inner(args.into(), Some(tx)).await? {
                Outcome::Method(Method::BasicConsumeOk(ok)) => ok.consumer_tag,
                Outcome::Method(other) => return Err(unexpected_reply(other)),
                Outcome::Delivery(_) => return Err(Error::InvalidMethod("basic.get-ok")),
            },
        };
        Ok(Consumer::new(tag, self.clone(), deliveries))
    }

    /// Cancels a consumer
    pub async fn cancel(&self, consumer_tag: &str, no_wait: bool) -> Result<(), Error> {
        let cancel = basic::Cancel {
            consumer_tag: consumer_tag.to_string(),
            no_wait,
        };
        self.request(cancel).await.map(|_| ())
    }

    /// Fetches a single message, `None` if the queue is empty
    pub async fn get(&self, queue: &str, no_ack: bool) -> Result<Option<Delivery>, Error> {
        let get = basic::Get {
            queue: queue.to_string(),
            no_ack,
        };
        match self.call_inner(get.into(), None).await? {
            Outcome::Delivery(delivery) => Ok(Some(delivery.with_acker(self))),
            Outcome::Method(Method::BasicGetEmpty(_)) => Ok(None),
            Outcome::Method(other) => Err(unexpected_reply(other)),
        }
    }

    /// Publishes a message
    ///
    /// Waits while the server has paused the channel with Channel.Flow.
    pub async fn publish(
        &self,
        publish: basic::Publish,
        properties: BasicProperties,
        body: impl Into<Bytes>,
    ) -> Result<(), Error> {
        self.publish_with_deferred_confirm(publish, properties, body)
            .await
            .map(|_| ())
    }

    /// Publishes a message and returns a handle to its confirmation if the
    /// channel is in confirm mode
    pub async fn publish_with_deferred_confirm(
        &self,
        publish: basic::Publish,
        properties: BasicProperties,
        body: impl Into<Bytes>,
    ) -> Result<Option<DeferredConfirmation>, Error> {
        let body = body.into();
        self.check_frame(&Method::from(publish.clone()))?;
        let mut buf = BytesMut::new();
        ContentHeader::new(body.len() as u64, properties.clone()).encode(&mut buf)?;

        self.wait_for_flow().await?;

        let (responder, outcome) = oneshot::channel();
        self.send(ChannelControl::Publish {
            publish,
            properties,
            body,
            responder,
        })
        .await?;
        outcome.await.map_err(|_| self.closed_error())?
    }

    async fn wait_for_flow(&self) -> Result<(), Error> {
        let mut flow = self.flow.clone();
        while !*flow.borrow_and_update() {
            if flow.changed().await.is_err() {
                return Err(self.closed_error());
            }
        }
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Acknowledges one or more deliveries
    pub async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), Error> {
        self.cast(basic::Ack {
            delivery_tag,
            multiple,
        })
        .await
    }

    /// Negatively acknowledges one or more deliveries
    pub async fn nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<(), Error> {
        self.cast(basic::Nack {
            delivery_tag,
            multiple,
            requeue,
        })
        .await
    }

    /// Rejects a delivery
    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.cast(basic::Reject {
            delivery_tag,
            requeue,
        })
        .await
    }

    /// Asks the server to redeliver unacknowledged messages
    pub async fn recover(&self, requeue: bool) -> Result<(), Error> {
        self.call(basic::Recover { requeue }).await.map(|_| ())
    }

    /// Asks the server to pause or resume deliveries on this channel
    pub async fn flow(&self, active: bool) -> Result<(), Error> {
        self.call(channel::Flow { active }).await.map(|_| ())
    }

    /* ---------------------------- tx and confirm --------------------------- */

    /// Puts the channel in transaction mode
    pub async fn tx(&self) -> Result<(), Error> {
        self.call(tx::Select).await.map(|_| ())
    }

    /// Commits the current transaction
    pub async fn tx_commit(&self) -> Result<(), Error> {
        self.call(tx::Commit).await.map(|_| ())
    }

    /// Rolls back the current transaction
    pub async fn tx_rollback(&self) -> Result<(), Error> {
        self.call(tx::Rollback).await.map(|_| ())
    }

    /// Puts the channel in confirm mode. Publishes made afterwards are
    /// numbered from 1.
    pub async fn confirm(&self, no_wait: bool) -> Result<(), Error> {
        self.request(confirm::Select { no_wait }).await.map(|_| ())
    }

    /* ---------------------------- notifications --------------------------- */

    /// Registers a listener for messages returned by the server
    pub async fn notify_return(&self) -> Result<mpsc::UnboundedReceiver<Returned>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelControl::NotifyReturn(tx)).await?;
        Ok(rx)
    }

    /// Registers a listener for Channel.Flow sent by the server
    pub async fn notify_flow(&self) -> Result<mpsc::UnboundedReceiver<bool>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelControl::NotifyFlow(tx)).await?;
        Ok(rx)
    }

    /// Registers a listener for consumers cancelled by the server
    pub async fn notify_cancel(&self) -> Result<mpsc::UnboundedReceiver<String>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelControl::NotifyCancel(tx)).await?;
        Ok(rx)
    }

    /// Registers a listener for publisher confirms, delivered in increasing
    /// delivery tag order
    pub async fn notify_publish(&self) -> Result<mpsc::UnboundedReceiver<Confirmation>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelControl::NotifyPublish(tx)).await?;
        Ok(rx)
    }

    /* -------------------------------- close ------------------------------- */

    /// Closes the channel
    ///
    /// Closing an already closed channel returns the reason it was closed
    /// with.
    pub async fn close(&self) -> Result<(), Error> {
        self.close_inner(None).await
    }

    /// Closes the channel with an error
    pub async fn close_with_error(
        &self,
        error: impl Into<definitions::Error>,
    ) -> Result<(), Error> {
        self.close_inner(Some(error.into())).await
    }

    async fn close_inner(&self, error: Option<definitions::Error>) -> Result<(), Error> {
        if let Some(reason) = self.closed.borrow().clone() {
            return reason;
        }
        let (responder, outcome) = oneshot::channel();
        if self
            .send(ChannelControl::Close { error, responder })
            .await
            .is_err()
        {
            return self.recorded_reason();
        }
        match outcome.await {
            Ok(reason) => reason,
            Err(_) => self.recorded_reason(),
        }
    }

    /// Returns when the channel is closed, with the reason it was closed with
    pub async fn on_close(&self) -> Result<(), Error> {
        let mut closed = self.closed.clone();
        loop {
            if let Some(reason) = closed.borrow_and_update().clone() {
                return reason;
            }
            if closed.changed().await.is_err() {
                return self.recorded_reason();
            }
        }
    }
}
