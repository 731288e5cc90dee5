//! In-process transport, for testing code built on the client without any network.
//!
//! [`channel`] creates a connected [`MemoryTransport`] and [`MemoryServer`] pair, every socket
//! opened by the transport is accepted on the server side as a [`MemoryConnection`].

use std::task::Poll;

use futures_util::{Sink, Stream};
use tokio::sync::mpsc;

use super::{BoxSocket, CloseFrame, Frame, Transport, TransportError};
use crate::ws::{close::CloseCode, message::Message};

/// Client half, opens in-process sockets
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<MemoryConnection>,
}

/// Server half, accepts sockets opened by the [`MemoryTransport`]
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryConnection>,
}

/// Create a connected transport/server pair
pub fn channel() -> (MemoryTransport, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (MemoryTransport { accept_tx }, MemoryServer { accept_rx })
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<BoxSocket, TransportError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        self.accept_tx
            .send(MemoryConnection {
                tx: server_tx,
                rx: server_rx,
            })
            .map_err(|_| TransportError::new("open memory socket failed", "server dropped"))?;

        Ok(Box::new(MemorySocket {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

impl MemoryServer {
    /// Wait for the next opened socket, `None` if the transport and all its clones are dropped
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.recv().await
    }

    /// Take an already opened socket without waiting
    pub fn try_accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server side of one in-process socket
#[derive(Debug)]
pub struct MemoryConnection {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryConnection {
    /// Wait for the next frame sent by the client, `None` once the client dropped the socket
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Take an already sent frame without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next protocol message sent by the client.
    ///
    /// Undecodable frames are skipped, `None` once the client closed or dropped the socket.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            let data = match self.recv().await? {
                Frame::Text(text) => text.into_bytes(),
                Frame::Binary(data) => data.to_vec(),
                Frame::Close(close) => {
                    log::trace!("Memory socket closed by client: {:?}", close);
                    return None;
                }
            };

            match Message::decode(&data) {
                Ok(message) => return Some(message),
                Err(err) => log::warn!("Memory server received undecodable frame: {}", err),
            }
        }
    }

    /// Send a frame to the client, false if the client dropped the socket
    pub fn send_frame(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Send a protocol message to the client as a text frame
    pub fn send(&self, message: &Message) -> bool {
        match message.encode() {
            Ok(text) => self.send_frame(Frame::Text(text)),
            Err(err) => {
                log::warn!("Memory server encode message failed: {}", err);
                false
            }
        }
    }

    /// Close the socket with a code
    pub fn close<S: Into<String>>(self, code: CloseCode, reason: S) {
        self.send_frame(Frame::Close(CloseFrame::new(code, reason)));
    }
}

#[derive(Debug)]
struct MemorySocket {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Stream for MemorySocket {
    type Item = Result<Frame, TransportError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Frame> for MemorySocket {
    type Error = TransportError;

    fn poll_ready(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: std::pin::Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.tx
            .send(item)
            .map_err(|_| TransportError::new("memory socket send failed", "server dropped"))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
