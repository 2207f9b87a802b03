//! Messages sent from the handles to the connection engine

use bytes::Bytes;
use fe2o3_amqp091_types::{
    definitions,
    methods::{basic, Method},
    properties::BasicProperties,
    value::LongString,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    channel::{self, Confirmation, DeferredConfirmation, Delivery, Returned},
    connection::{self, Blocking},
};

/// Reply to a synchronous call
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The reply method, or the request itself if it does not expect a reply
    Method(Method),

    /// A message fetched with Basic.Get
    Delivery(Delivery),
}

/// The state a new [`crate::Channel`] handle is built from
#[derive(Debug)]
pub(crate) struct ChannelParts {
    pub id: u16,
    pub serial: u64,
    pub closed: watch::Receiver<Option<Result<(), channel::Error>>>,
    pub flow: watch::Receiver<bool>,
}

#[derive(Debug)]
pub(crate) enum ConnectionControl {
    OpenChannel {
        responder: oneshot::Sender<Result<ChannelParts, channel::Error>>,
    },
    Channel {
        id: u16,
        serial: u64,
        control: ChannelControl,
    },
    UpdateSecret {
        new_secret: LongString,
        reason: String,
        responder: oneshot::Sender<Result<(), connection::Error>>,
    },
    NotifyBlocked(mpsc::UnboundedSender<Blocking>),
    Close(Option<definitions::Error>),
}

#[derive(Debug)]
pub(crate) enum ChannelControl {
    Call {
        method: Method,
        consumer: Option<mpsc::UnboundedSender<Delivery>>,
        responder: oneshot::Sender<Result<Outcome, channel::Error>>,
    },
    Cast {
        method: Method,
        consumer: Option<mpsc::UnboundedSender<Delivery>>,
        responder: oneshot::Sender<Result<(), channel::Error>>,
    },
    Publish {
        publish: basic::Publish,
        properties: BasicProperties,
        body: Bytes,
        responder: oneshot::Sender<Result<Option<DeferredConfirmation>, channel::Error>>,
    },
    NotifyReturn(mpsc::UnboundedSender<Returned>),
    NotifyFlow(mpsc::UnboundedSender<bool>),
    NotifyCancel(mpsc::UnboundedSender<String>),
    NotifyPublish(mpsc::UnboundedSender<Confirmation>),
    Close {
        error: Option<definitions::Error>,
        responder: oneshot::Sender<Result<(), channel::Error>>,
    },
}

impl ChannelControl {
    /// Rejects the request without touching the wire
    pub fn reject(self, error: channel::Error) {
        match self {
            ChannelControl::Call { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            ChannelControl::Cast { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            ChannelControl::Publish { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            ChannelControl::Close { responder, .. } => {
                let _ = responder.send(Err(error));
            }
            ChannelControl::NotifyReturn(_)
            | ChannelControl::NotifyFlow(_)
            | ChannelControl::NotifyCancel(_)
            | ChannelControl::NotifyPublish(_) => {}
        }
    }
}
