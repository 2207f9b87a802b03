//! Implements an asynchronous heartbeat
//!
//! The ticker fires at half the negotiated heartbeat interval. A heartbeat
//! frame only needs to go out when nothing else was written during the last
//! half interval, since any outgoing frame proves liveness to the peer.

use std::{task::Poll, time::Duration};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A wrapper over an `Option<IntervalStream>` which will never tick ready if the underlying
    /// `Interval` is `None`
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>,
        period: Duration,
        last_sent: Instant,
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that will never yield `Poll::Ready(_)` with `StreamExt::next()`
    pub fn never() -> Self {
        Self {
            interval: None,
            period: Duration::ZERO,
            last_sent: Instant::now(),
        }
    }

    /// A [`HeartBeat`] for the negotiated heartbeat interval. A zero interval
    /// disables heartbeats.
    pub fn new(heartbeat: Duration) -> Self {
        if heartbeat.is_zero() {
            return Self::never();
        }
        let period = heartbeat / 2;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(IntervalStream::new(interval)),
            period,
            last_sent: Instant::now(),
        }
    }

    /// Records that a frame was written to the peer
    pub fn record_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Whether a heartbeat frame should be sent on this tick
    pub fn is_due(&self) -> bool {
        self.interval.is_some() && self.last_sent.elapsed() >= self.period
    }
}

impl Stream for HeartBeat {
    type Item = Instant;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::HeartBeat;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_half_the_interval() {
        let mut heartbeat = HeartBeat::new(Duration::from_secs(10));
        let start = tokio::time::Instant::now();
        heartbeat.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(heartbeat.is_due());
    }

    #[tokio::test(start_paused = true)]
    async fn recent_write_suppresses_heartbeat() {
        let mut heartbeat = HeartBeat::new(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(4)).await;
        heartbeat.record_sent();
        heartbeat.next().await;
        assert!(!heartbeat.is_due());
    }

    #[tokio::test(start_paused = true)]
    async fn never_stays_pending() {
        let mut heartbeat = HeartBeat::never();
        let result = tokio::time::timeout(Duration::from_secs(3600), heartbeat.next()).await;
        assert!(result.is_err());
        assert!(!heartbeat.is_due());
    }
}
