use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::{ready, FutureExt};
use tokio::sync::oneshot;

use crate::{error::ConnectionError, ws::message::Payload};

pub(crate) type HandshakeResult = Result<Option<Payload>, Arc<ConnectionError>>;

/// Resolves when the server acknowledges the session, to the `connection_ack` payload.
///
/// Recoverable connection losses before that are retried, so it only fails with the error that
/// ended the whole session. Dropping it does not affect the session.
#[derive(Debug)]
pub struct Handshake {
    rx: oneshot::Receiver<HandshakeResult>,
}

impl Handshake {
    pub(crate) fn new(rx: oneshot::Receiver<HandshakeResult>) -> Self {
        Self { rx }
    }
}

impl Future for Handshake {
    type Output = HandshakeResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match ready!(self.rx.poll_unpin(cx)) {
            Ok(result) => result,
            Err(_) => Err(Arc::new(ConnectionError::Stopped)),
        };

        Poll::Ready(result)
    }
}
