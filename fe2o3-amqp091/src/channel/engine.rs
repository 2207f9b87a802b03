//! Per-channel protocol state driven by the connection engine
//!
//! The channel engine never touches the socket. Frames it wants to send are
//! collected in an outbox that the connection engine drains and writes after
//! every incoming frame or control message, which keeps the connection
//! engine the only writer.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use fe2o3_amqp091_types::{
    definitions::{self, ReplyCode},
    methods::{basic, channel, Method},
    properties::{BasicProperties, ContentHeader},
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

use crate::{
    control::{ChannelControl, ChannelParts, Outcome},
    frames::{Frame, FrameBody},
};

use super::{
    confirmation::{ConfirmTracker, DeferredConfirmation},
    content::{Content, ContentMethod, IncompleteContent, Progress},
    Delivery, Error, Returned,
};

/// Local state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel.Open is sent
    Opening,

    /// Channel.OpenOk is received
    Open,

    /// Channel.Close is sent
    Closing,

    /// Channel.CloseOk is exchanged, or the channel was torn down
    Closed,
}

#[derive(Debug)]
struct PendingCall {
    method: Method,
    consumer: Option<mpsc::UnboundedSender<Delivery>>,
    responder: oneshot::Sender<Result<Outcome, Error>>,
}

fn unexpected(method: &Method) -> definitions::Error {
    definitions::Error::new(
        ReplyCode::UnexpectedFrame,
        format!("Unexpected method {}", method.name()),
    )
    .caused_by(method.id())
}

#[derive(Debug)]
pub(crate) struct ChannelEngine {
    id: u16,
    serial: u64,
    max_frame_size: usize,
    state: ChannelState,

    opening: Option<oneshot::Sender<Result<ChannelParts, Error>>>,
    in_flight: Option<PendingCall>,
    queued: VecDeque<PendingCall>,

    content: Option<IncompleteContent>,
    consumers: BTreeMap<String, mpsc::UnboundedSender<Delivery>>,

    confirm_mode: bool,
    confirms: ConfirmTracker,

    return_listeners: Vec<mpsc::UnboundedSender<Returned>>,
    flow_listeners: Vec<mpsc::UnboundedSender<bool>>,
    cancel_listeners: Vec<mpsc::UnboundedSender<String>>,

    flow: watch::Sender<bool>,
    closed: watch::Sender<Option<Result<(), Error>>>,
    closing_reason: Option<Result<(), Error>>,
    close_responders: Vec<oneshot::Sender<Result<(), Error>>>,

    outgoing: Vec<Frame>,
}

impl ChannelEngine {
    /// Creates the channel and queues Channel.Open. The responder is
    /// completed once Channel.OpenOk arrives.
    pub fn open(
        id: u16,
        serial: u64,
        max_frame_size: usize,
        responder: oneshot::Sender<Result<ChannelParts, Error>>,
    ) -> Self {
        let (flow, _) = watch::channel(true);
        let (closed, _) = watch::channel(None);
        Self {
            id,
            serial,
            max_frame_size,
            state: ChannelState::Opening,
            opening: Some(responder),
            in_flight: None,
            queued: VecDeque::new(),
            content: None,
            consumers: BTreeMap::new(),
            confirm_mode: false,
            confirms: ConfirmTracker::new(),
            return_listeners: Vec::new(),
            flow_listeners: Vec::new(),
            cancel_listeners: Vec::new(),
            flow,
            closed,
            closing_reason: None,
            close_responders: Vec::new(),
            outgoing: vec![Frame::method(id, channel::Open)],
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[cfg(test)]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Frames waiting to be written, in submission order
    pub fn take_outgoing(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outgoing)
    }

    fn recorded_reason(&self) -> Result<(), Error> {
        self.closed.borrow().clone().unwrap_or(Ok(()))
    }

    fn closing_error(&self) -> Error {
        match &self.closing_reason {
            Some(Err(err)) => err.clone(),
            _ => Error::Closed,
        }
    }

    /* ------------------------------ outgoing ------------------------------ */

    pub fn on_control(&mut self, control: ChannelControl) {
        match self.state {
            ChannelState::Open => {}
            ChannelState::Closed => {
                match control {
                    ChannelControl::Close { responder, .. } => {
                        let _ = responder.send(self.recorded_reason());
                    }
                    control => {
                        let err = match self.recorded_reason() {
                            Ok(()) => Error::Closed,
                            Err(err) => err,
                        };
                        control.reject(err);
                    }
                }
                return;
            }
            ChannelState::Closing => {
                match control {
                    ChannelControl::Close { responder, .. } => {
                        self.close_responders.push(responder)
                    }
                    control => control.reject(self.closing_error()),
                }
                return;
            }
            ChannelState::Opening => {
                control.reject(Error::Closed);
                return;
            }
        }

        match control {
            ChannelControl::Call {
                method,
                consumer,
                responder,
            } => {
                self.queued.push_back(PendingCall {
                    method,
                    consumer,
                    responder,
                });
                self.dispatch_next();
            }
            ChannelControl::Cast {
                method,
                mut consumer,
                responder,
            } => {
                self.write_method(method, &mut consumer);
                let _ = responder.send(Ok(()));
            }
            ChannelControl::Publish {
                publish,
                properties,
                body,
                responder,
            } => {
                let deferred = self.write_publish(publish, properties, body);
                let _ = responder.send(Ok(deferred));
            }
            ChannelControl::NotifyReturn(listener) => self.return_listeners.push(listener),
            ChannelControl::NotifyFlow(listener) => self.flow_listeners.push(listener),
            ChannelControl::NotifyCancel(listener) => self.cancel_listeners.push(listener),
            ChannelControl::NotifyPublish(listener) => self.confirms.listen(listener),
            ChannelControl::Close { error, responder } => self.begin_close(error, Some(responder)),
        }
    }

    /// Writes the next queued call once the previous one is answered.
    /// Callers that gave up while queued are skipped.
    fn dispatch_next(&mut self) {
        while self.in_flight.is_none() {
            let PendingCall {
                method,
                mut consumer,
                responder,
            } = match self.queued.pop_front() {
                Some(call) => call,
                None => return,
            };
            if responder.is_closed() {
                trace!(channel = self.id, method = method.name(), "Skipping abandoned call");
                continue;
            }

            self.write_method(method.clone(), &mut consumer);
            if method.expects_reply() {
                self.in_flight = Some(PendingCall {
                    method,
                    consumer,
                    responder,
                });
            } else {
                let _ = responder.send(Ok(Outcome::Method(method)));
            }
        }
    }

    fn write_method(
        &mut self,
        method: Method,
        consumer: &mut Option<mpsc::UnboundedSender<Delivery>>,
    ) {
        match &method {
            Method::ConfirmSelect(_) => self.confirm_mode = true,
            Method::BasicConsume(consume) if consume.no_wait => {
                if let Some(consumer) = consumer.take() {
                    self.consumers.insert(consume.consumer_tag.clone(), consumer);
                }
            }
            Method::BasicCancel(cancel) if cancel.no_wait => {
                self.consumers.remove(&cancel.consumer_tag);
            }
            _ => {}
        }
        self.outgoing.push(Frame::method(self.id, method));
    }

    fn write_publish(
        &mut self,
        publish: basic::Publish,
        properties: BasicProperties,
        body: Bytes,
    ) -> Option<DeferredConfirmation> {
        let deferred = match self.confirm_mode {
            true => Some(self.confirms.on_publish()),
            false => None,
        };
        let header = ContentHeader::new(body.len() as u64, properties);
        self.outgoing.extend(Frame::content(
            self.id,
            publish.into(),
            header,
            body,
            self.max_frame_size,
        ));
        deferred
    }

    /// Sends Channel.Close and releases every waiter. A `None` error closes
    /// the channel normally.
    pub fn begin_close(
        &mut self,
        error: Option<definitions::Error>,
        responder: Option<oneshot::Sender<Result<(), Error>>>,
    ) {
        let (close, reason) = match error {
            Some(error) => (error.clone(), Err(Error::Local(error))),
            None => (
                definitions::Error::new(ReplyCode::ReplySuccess, "Closed by client"),
                Ok(()),
            ),
        };
        debug!(channel = self.id, ?reason, "Closing channel");

        self.outgoing.push(Frame::method(self.id, channel::Close::from(close)));
        self.state = ChannelState::Closing;
        self.content = None;
        let waiter_error = match &reason {
            Ok(()) => Error::Closed,
            Err(err) => err.clone(),
        };
        self.release_waiters(&waiter_error);
        self.closing_reason = Some(reason);
        if let Some(responder) = responder {
            self.close_responders.push(responder);
        }
    }

    fn release_waiters(&mut self, error: &Error) {
        if let Some(responder) = self.opening.take() {
            let _ = responder.send(Err(error.clone()));
        }
        for call in self.in_flight.take().into_iter().chain(self.queued.drain(..)) {
            let _ = call.responder.send(Err(error.clone()));
        }
    }

    /// Tears the channel down without any further frame exchange
    pub fn terminate(&mut self, reason: Result<(), Error>) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.state = ChannelState::Closed;
        let error = match &reason {
            Ok(()) => Error::Closed,
            Err(err) => err.clone(),
        };
        self.release_waiters(&error);
        self.content = None;
        self.consumers.clear();
        self.confirms.fail_all(&error);
        self.return_listeners.clear();
        self.flow_listeners.clear();
        self.cancel_listeners.clear();
        for responder in self.close_responders.drain(..) {
            let _ = responder.send(reason.clone());
        }
        debug!(channel = self.id, ?reason, "Channel closed");
        self.closed.send_replace(Some(reason));
    }

    /* ------------------------------ incoming ------------------------------ */

    /// Handles a frame routed to this channel. An error is a protocol
    /// violation, the caller decides whether it closes the channel or the
    /// whole connection.
    #[instrument(name = "RECV", skip_all, fields(channel = self.id))]
    pub fn on_incoming(&mut self, body: FrameBody) -> Result<(), definitions::Error> {
        match self.state {
            ChannelState::Closed => return Ok(()),
            ChannelState::Closing => {
                self.on_incoming_while_closing(body);
                return Ok(());
            }
            ChannelState::Opening | ChannelState::Open => {}
        }

        match body {
            FrameBody::Method(method) => self.on_method(method),
            FrameBody::Header(header) => match self.content.take() {
                Some(content) => self.on_progress(content.on_header(header)?),
                None => Err(definitions::Error::new(
                    ReplyCode::UnexpectedFrame,
                    "Content header without a content method",
                )),
            },
            FrameBody::Body(chunk) => match self.content.take() {
                Some(content) => self.on_progress(content.on_body(chunk)?),
                None => Err(definitions::Error::new(
                    ReplyCode::UnexpectedFrame,
                    "Content body without a content header",
                )),
            },
            FrameBody::Heartbeat => Err(definitions::Error::new(
                ReplyCode::UnexpectedFrame,
                "Heartbeat on a non-zero channel",
            )),
        }
    }

    /// Only Close and CloseOk matter once Channel.Close is sent
    fn on_incoming_while_closing(&mut self, body: FrameBody) {
        match body {
            FrameBody::Method(Method::ChannelCloseOk(_)) => {
                let reason = self.closing_reason.take().unwrap_or(Ok(()));
                self.terminate(reason);
            }
            FrameBody::Method(Method::ChannelClose(close)) => {
                self.outgoing.push(Frame::method(self.id, channel::CloseOk));
                self.terminate(Err(Error::Remote(close.into())));
            }
            body => trace!(?body, "Discarding frame on closing channel"),
        }
    }

    fn on_method(&mut self, method: Method) -> Result<(), definitions::Error> {
        if self.content.is_some() {
            return Err(definitions::Error::new(
                ReplyCode::UnexpectedFrame,
                format!("{} received while content is incomplete", method.name()),
            )
            .caused_by(method.id()));
        }

        if self.state == ChannelState::Opening {
            return self.on_method_while_opening(method);
        }

        match method {
            Method::ChannelClose(close) => {
                self.outgoing.push(Frame::method(self.id, channel::CloseOk));
                self.terminate(Err(Error::Remote(close.into())));
                Ok(())
            }
            Method::ChannelFlow(channel::Flow { active }) => {
                self.outgoing.push(Frame::method(self.id, channel::FlowOk { active }));
                self.flow.send_replace(active);
                self.flow_listeners
                    .retain(|listener| listener.send(active).is_ok());
                Ok(())
            }
            Method::BasicCancel(cancel) => {
                debug!(consumer_tag = %cancel.consumer_tag, "Consumer cancelled by server");
                self.consumers.remove(&cancel.consumer_tag);
                self.cancel_listeners
                    .retain(|listener| listener.send(cancel.consumer_tag.clone()).is_ok());
                if !cancel.no_wait {
                    let cancel_ok = basic::CancelOk {
                        consumer_tag: cancel.consumer_tag,
                    };
                    self.outgoing.push(Frame::method(self.id, cancel_ok));
                }
                Ok(())
            }
            Method::BasicAck(ack) => self.on_confirm(ack.delivery_tag, ack.multiple, true),
            Method::BasicNack(nack) => self.on_confirm(nack.delivery_tag, nack.multiple, false),
            method if method.has_content() => self.on_content_method(method),
            method => self.on_reply(method),
        }
    }

    fn on_method_while_opening(&mut self, method: Method) -> Result<(), definitions::Error> {
        match method {
            Method::ChannelOpenOk(_) => {
                self.state = ChannelState::Open;
                let parts = ChannelParts {
                    id: self.id,
                    serial: self.serial,
                    closed: self.closed.subscribe(),
                    flow: self.flow.subscribe(),
                };
                let delivered = self
                    .opening
                    .take()
                    .map(|responder| responder.send(Ok(parts)).is_ok())
                    .unwrap_or(false);
                if !delivered {
                    debug!("Channel opened for an abandoned request");
                    self.begin_close(None, None);
                }
                Ok(())
            }
            Method::ChannelClose(close) => {
                self.outgoing.push(Frame::method(self.id, channel::CloseOk));
                self.terminate(Err(Error::Remote(close.into())));
                Ok(())
            }
            method => Err(unexpected(&method)),
        }
    }

    fn on_confirm(
        &mut self,
        delivery_tag: u64,
        multiple: bool,
        ack: bool,
    ) -> Result<(), definitions::Error> {
        if !self.confirm_mode {
            return Err(definitions::Error::new(
                ReplyCode::UnexpectedFrame,
                "Publisher confirm received outside of confirm mode",
            ));
        }
        let confirmations = self.confirms.on_confirm(delivery_tag, multiple, ack)?;
        trace!(resolved = confirmations.len(), ack);
        Ok(())
    }

    fn on_content_method(&mut self, method: Method) -> Result<(), definitions::Error> {
        let content = match ContentMethod::from_method(method) {
            Ok(content) => content,
            Err(method) => return Err(unexpected(&method)),
        };
        if let ContentMethod::GetOk(_) = content {
            let get_pending = matches!(
                &self.in_flight,
                Some(PendingCall {
                    method: Method::BasicGet(_),
                    ..
                })
            );
            if !get_pending {
                return Err(definitions::Error::new(
                    ReplyCode::UnexpectedFrame,
                    "Basic.GetOk without a pending Basic.Get",
                ));
            }
        }
        self.content = Some(IncompleteContent::new(content));
        Ok(())
    }

    fn on_reply(&mut self, method: Method) -> Result<(), definitions::Error> {
        let call = match self.in_flight.take() {
            Some(call) if call.method.accepts_reply(&method) => call,
            other => {
                self.in_flight = other;
                return Err(unexpected(&method));
            }
        };

        let PendingCall {
            consumer,
            responder,
            ..
        } = call;
        match &method {
            Method::BasicConsumeOk(ok) => {
                if let Some(consumer) = consumer {
                    self.consumers.insert(ok.consumer_tag.clone(), consumer);
                }
            }
            Method::BasicCancelOk(ok) => {
                self.consumers.remove(&ok.consumer_tag);
            }
            _ => {}
        }

        if responder.send(Ok(Outcome::Method(method))).is_err() {
            debug!("Discarding reply to an abandoned call");
        }
        self.dispatch_next();
        Ok(())
    }

    fn on_progress(&mut self, progress: Progress) -> Result<(), definitions::Error> {
        let content = match progress {
            Progress::Incomplete(content) => {
                self.content = Some(content);
                return Ok(());
            }
            Progress::Complete(content) => content,
        };

        match content {
            Content::Delivery(delivery) => match self.consumers.get(&delivery.consumer_tag) {
                Some(consumer) => {
                    if let Err(err) = consumer.send(delivery) {
                        warn!(
                            consumer_tag = %err.0.consumer_tag,
                            delivery_tag = err.0.delivery_tag,
                            "Consumer dropped, delivery is discarded"
                        );
                    }
                }
                None => warn!(
                    consumer_tag = %delivery.consumer_tag,
                    delivery_tag = delivery.delivery_tag,
                    "Delivery for an unknown consumer is discarded"
                ),
            },
            Content::Returned(returned) => {
                if self.return_listeners.is_empty() {
                    warn!(routing_key = %returned.routing_key, "Returned message is discarded");
                }
                self.return_listeners
                    .retain(|listener| listener.send(returned.clone()).is_ok());
            }
            Content::GetOk(delivery) => {
                if let Some(call) = self.in_flight.take() {
                    if call.responder.send(Ok(Outcome::Delivery(delivery))).is_err() {
                        debug!("Discarding message fetched by an abandoned call");
                    }
                }
                self.dispatch_next();
            }
        }
        Ok(())
    }
}
