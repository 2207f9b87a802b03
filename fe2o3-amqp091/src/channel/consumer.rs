//! Stream of deliveries for a single consumer tag

use std::task::Poll;

use fe2o3_amqp091_types::methods::basic;
use futures_util::Stream;
use tokio::sync::mpsc;

use super::{Channel, Delivery, Error};

/// Receives the messages delivered to one consumer tag
///
/// The stream ends when the consumer is cancelled by the server or when the
/// channel closes. Dropping the consumer cancels it without waiting for the
/// server to confirm.
#[derive(Debug)]
pub struct Consumer {
    tag: String,
    channel: Channel,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    cancelled: bool,
}

impl Consumer {
    pub(crate) fn new(
        tag: String,
        channel: Channel,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            tag,
            channel,
            deliveries,
            cancelled: false,
        }
    }

    /// Consumer tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The channel the consumer lives on
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Receives the next delivery, `None` once the consumer is cancelled or
    /// the channel is closed
    pub async fn recv(&mut self) -> Option<Delivery> {
        let delivery = self.deliveries.recv().await?;
        Some(delivery.with_acker(&self.channel))
    }

    /// Cancels the consumer and waits for Basic.CancelOk
    pub async fn cancel(mut self) -> Result<(), Error> {
        self.cancelled = true;
        self.channel.cancel(&self.tag, false).await
    }
}

impl Stream for Consumer {
    type Item = Delivery;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.deliveries.poll_recv(cx) {
            Poll::Ready(delivery) => {
                Poll::Ready(delivery.map(|delivery| delivery.with_acker(&this.channel)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if !self.cancelled && !self.channel.is_closed() {
            self.channel.try_cast(basic::Cancel {
                consumer_tag: self.tag.clone(),
                no_wait: true,
            });
        }
    }
}
