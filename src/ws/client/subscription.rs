use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll},
};

use futures_util::{ready, Stream};
use tokio::sync::mpsc;

use super::session::Shared;
use crate::{error::SubscribeError, ws::message::ExecutionResult};

/// Item routed from the session to one subscription
#[derive(Debug)]
pub(crate) enum Delivery {
    Next(ExecutionResult),
    Error(SubscribeError),
    Complete,
}

impl Delivery {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

/// Subscription lifecycle, as seen by its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// waiting for or receiving results
    Subscribed,
    /// server completed the operation
    Completed,
    /// ended with an error
    Errored,
    /// cancelled by the caller, or dropped by the session
    Cancelled,
}

/// Cancels one subscription, can be cloned and sent to other tasks
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: Arc<str>,
    cancelled: Arc<AtomicBool>,
    session: Weak<Shared>,
}

impl CancelHandle {
    pub(crate) fn new(id: Arc<str>, session: Weak<Shared>) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
            session,
        }
    }

    /// Cancel the subscription.
    ///
    /// Sends `complete` to the server if the subscription was already sent, or drops it from the
    /// pending queue if not. Calling it again, or after the subscription ended, does nothing.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        log::debug!("Cancel subscription {}", self.id);

        if let Some(shared) = self.session.upgrade() {
            shared.cancel(&self.id);
        }
    }

    /// Check if [`CancelHandle::cancel`] was called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result stream of one GraphQL subscription.
///
/// Yields every `next` payload, ends after the server completes the operation. An error is
/// always the last item. After [`Subscription::cancel`] the stream ends immediately, values
/// already buffered are discarded.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
    handle: CancelHandle,
    status: Status,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Delivery>, handle: CancelHandle) -> Self {
        Self {
            rx,
            handle,
            status: Status::Subscribed,
        }
    }

    /// Subscription that ends with an error as its only item
    pub(crate) fn failed(id: Arc<str>, error: SubscribeError) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // receiver is alive, send can't fail
        let _ = tx.send(Delivery::Error(error));
        Self::new(rx, CancelHandle::new(id, Weak::new()))
    }

    /// subscription id, as sent to the server
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// current status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Cancel the subscription, see [`CancelHandle::cancel`]
    pub fn cancel(&mut self) {
        self.handle.cancel();
        if self.status == Status::Subscribed {
            self.status = Status::Cancelled;
        }
    }

    /// A handle to cancel this subscription from elsewhere
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl Stream for Subscription {
    type Item = Result<ExecutionResult, SubscribeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.status != Status::Subscribed {
            return Poll::Ready(None);
        }

        if self.handle.is_cancelled() {
            self.status = Status::Cancelled;
            return Poll::Ready(None);
        }

        let item = match ready!(self.rx.poll_recv(cx)) {
            Some(Delivery::Next(result)) => Some(Ok(result)),
            Some(Delivery::Error(err)) => {
                self.status = Status::Errored;
                Some(Err(err))
            }
            Some(Delivery::Complete) => {
                self.status = Status::Completed;
                None
            }
            None => {
                self.status = Status::Cancelled;
                None
            }
        };

        Poll::Ready(item)
    }
}

#[cfg(test)]
mod test {
    use futures_util::StreamExt;

    use super::*;

    fn detached(id: &str) -> (mpsc::UnboundedSender<Delivery>, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(rx, CancelHandle::new(id.into(), Weak::new()));
        (tx, subscription)
    }

    #[tokio::test]
    async fn test_subscription_yields_until_complete() {
        let (tx, mut subscription) = detached("1");
        tx.send(Delivery::Next(ExecutionResult::default())).unwrap();
        tx.send(Delivery::Complete).unwrap();

        assert!(subscription.next().await.unwrap().is_ok());
        assert!(subscription.next().await.is_none());
        assert_eq!(subscription.status(), Status::Completed);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_error_is_last_item() {
        let (tx, mut subscription) = detached("1");
        tx.send(Delivery::Error(SubscribeError::NotStartedAndNoAutoConnect))
            .unwrap();
        tx.send(Delivery::Next(ExecutionResult::default())).unwrap();

        assert!(subscription.next().await.unwrap().is_err());
        assert_eq!(subscription.status(), Status::Errored);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_subscription_discards_buffered_values() {
        let (tx, mut subscription) = detached("1");
        tx.send(Delivery::Next(ExecutionResult::default())).unwrap();

        let handle = subscription.cancel_handle();
        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert!(subscription.next().await.is_none());
        assert_eq!(subscription.status(), Status::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_subscription() {
        let mut subscription =
            Subscription::failed("1".into(), SubscribeError::NotStartedAndNoAutoConnect);

        assert_eq!(subscription.id(), "1");
        assert!(matches!(
            subscription.next().await,
            Some(Err(SubscribeError::NotStartedAndNoAutoConnect))
        ));
        assert!(subscription.next().await.is_none());
    }
}
