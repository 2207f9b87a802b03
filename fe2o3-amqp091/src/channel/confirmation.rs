//! Publisher confirms
//!
//! Once Confirm.Select is written on a channel, every publish is numbered
//! with a delivery tag starting at 1. The server acknowledges publishes with
//! Basic.Ack or Basic.Nack, either one tag at a time or, with `multiple` set,
//! every outstanding tag up to and including the given one.

use std::collections::BTreeMap;

use fe2o3_amqp091_types::definitions::{self, ReplyCode};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::Error;

/// Resolution of a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Delivery tag assigned to the publish
    pub delivery_tag: u64,

    /// `true` if the server acknowledged the publish, `false` if it was
    /// negatively acknowledged
    pub ack: bool,
}

/// A publish that is waiting for the server to confirm it
#[derive(Debug)]
pub struct DeferredConfirmation {
    delivery_tag: u64,
    outcome: oneshot::Receiver<Result<bool, Error>>,
}

impl DeferredConfirmation {
    /// Delivery tag assigned to the publish
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Waits for the server to confirm the publish. Returns `true` for an
    /// ack and `false` for a nack.
    ///
    /// An error is returned if the channel is closed before the publish is
    /// confirmed.
    pub async fn wait(self) -> Result<bool, Error> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Closed),
        }
    }
}

/// Sequences publishes and correlates acks and nacks with them
#[derive(Debug)]
pub(crate) struct ConfirmTracker {
    next_tag: u64,
    pending: BTreeMap<u64, oneshot::Sender<Result<bool, Error>>>,
    listeners: Vec<mpsc::UnboundedSender<Confirmation>>,
}

impl ConfirmTracker {
    pub fn new() -> Self {
        Self {
            next_tag: 1,
            pending: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }

    /// Tags still waiting for a confirmation, in increasing order
    #[cfg(test)]
    pub fn unresolved(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }

    pub fn listen(&mut self, listener: mpsc::UnboundedSender<Confirmation>) {
        self.listeners.push(listener);
    }

    /// Assigns the next delivery tag to a publish that is about to be written
    pub fn on_publish(&mut self) -> DeferredConfirmation {
        let delivery_tag = self.next_tag;
        self.next_tag += 1;
        let (tx, outcome) = oneshot::channel();
        self.pending.insert(delivery_tag, tx);
        DeferredConfirmation {
            delivery_tag,
            outcome,
        }
    }

    /// Resolves the tags covered by an incoming Basic.Ack or Basic.Nack and
    /// returns the confirmations in increasing tag order
    ///
    /// A tag of 0 with `multiple` set covers every outstanding publish.
    pub fn on_confirm(
        &mut self,
        delivery_tag: u64,
        multiple: bool,
        ack: bool,
    ) -> Result<Vec<Confirmation>, definitions::Error> {
        if delivery_tag >= self.next_tag {
            return Err(definitions::Error::new(
                ReplyCode::PreconditionFailed,
                format!("Unknown delivery tag {}", delivery_tag),
            ));
        }

        let resolved: Vec<u64> = match (multiple, delivery_tag) {
            (true, 0) => self.pending.keys().copied().collect(),
            (true, tag) => {
                let tags: Vec<u64> = self.pending.range(..=tag).map(|(tag, _)| *tag).collect();
                if tags.is_empty() {
                    return Err(definitions::Error::new(
                        ReplyCode::PreconditionFailed,
                        format!("Delivery tags up to {} are already confirmed", tag),
                    ));
                }
                tags
            }
            (false, tag) => {
                if !self.pending.contains_key(&tag) {
                    return Err(definitions::Error::new(
                        ReplyCode::PreconditionFailed,
                        format!("Delivery tag {} is already confirmed", tag),
                    ));
                }
                vec![tag]
            }
        };

        let mut confirmations = Vec::with_capacity(resolved.len());
        for delivery_tag in resolved {
            if let Some(deferred) = self.pending.remove(&delivery_tag) {
                let _ = deferred.send(Ok(ack));
            }
            let confirmation = Confirmation { delivery_tag, ack };
            trace!(?confirmation);
            self.listeners
                .retain(|listener| listener.send(confirmation).is_ok());
            confirmations.push(confirmation);
        }
        Ok(confirmations)
    }

    /// Fails every outstanding publish, eg. when the channel closes
    pub fn fail_all(&mut self, error: &Error) {
        for (_, deferred) in std::mem::take(&mut self.pending) {
            let _ = deferred.send(Err(error.clone()));
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use fe2o3_amqp091_types::definitions::ReplyCode;
    use tokio::sync::mpsc;

    use super::{Confirmation, ConfirmTracker};
    use crate::channel::Error;

    fn tags(confirmations: &[Confirmation]) -> Vec<u64> {
        confirmations.iter().map(|c| c.delivery_tag).collect()
    }

    #[test]
    fn tags_start_at_one() {
        let mut tracker = ConfirmTracker::new();
        assert_eq!(tracker.on_publish().delivery_tag(), 1);
        assert_eq!(tracker.on_publish().delivery_tag(), 2);
    }

    #[test]
    fn multiple_resolves_every_lower_tag() {
        let mut tracker = ConfirmTracker::new();
        let _deferred: Vec<_> = (0..5).map(|_| tracker.on_publish()).collect();

        let confirmations = tracker.on_confirm(3, true, true).unwrap();
        assert_eq!(tags(&confirmations), vec![1, 2, 3]);
        assert_eq!(tracker.unresolved().collect::<Vec<_>>(), vec![4, 5]);

        let confirmations = tracker.on_confirm(5, true, true).unwrap();
        assert_eq!(tags(&confirmations), vec![4, 5]);
        assert_eq!(tracker.unresolved().count(), 0);
    }

    #[test]
    fn single_confirmation_resolves_exactly_one_tag() {
        let mut tracker = ConfirmTracker::new();
        let _deferred: Vec<_> = (0..3).map(|_| tracker.on_publish()).collect();

        let confirmations = tracker.on_confirm(2, false, false).unwrap();
        assert_eq!(
            confirmations,
            vec![Confirmation {
                delivery_tag: 2,
                ack: false
            }]
        );
        assert_eq!(tracker.unresolved().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn resolving_twice_is_a_violation() {
        let mut tracker = ConfirmTracker::new();
        let _deferred: Vec<_> = (0..2).map(|_| tracker.on_publish()).collect();
        tracker.on_confirm(1, false, true).unwrap();

        let err = tracker.on_confirm(1, false, true).unwrap_err();
        assert_eq!(err.code, ReplyCode::PreconditionFailed);
        let err = tracker.on_confirm(1, true, true).unwrap_err();
        assert_eq!(err.code, ReplyCode::PreconditionFailed);
    }

    #[test]
    fn never_issued_tag_is_a_violation() {
        let mut tracker = ConfirmTracker::new();
        let _deferred = tracker.on_publish();
        assert!(tracker.on_confirm(2, false, true).is_err());
    }

    #[test]
    fn tag_zero_with_multiple_covers_everything() {
        let mut tracker = ConfirmTracker::new();
        let _deferred: Vec<_> = (0..3).map(|_| tracker.on_publish()).collect();
        let confirmations = tracker.on_confirm(0, true, true).unwrap();
        assert_eq!(tags(&confirmations), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn deferred_confirmation_and_listener_are_resolved() {
        let mut tracker = ConfirmTracker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tracker.listen(tx);

        let first = tracker.on_publish();
        let second = tracker.on_publish();
        tracker.on_confirm(2, true, false).unwrap();

        assert!(!first.wait().await.unwrap());
        assert!(!second.wait().await.unwrap());
        assert_eq!(rx.recv().await.unwrap().delivery_tag, 1);
        assert_eq!(rx.recv().await.unwrap().delivery_tag, 2);
    }

    #[tokio::test]
    async fn outstanding_publishes_fail_on_close() {
        let mut tracker = ConfirmTracker::new();
        let deferred = tracker.on_publish();
        tracker.fail_all(&Error::Closed);
        assert!(matches!(deferred.wait().await, Err(Error::Closed)));
    }
}
