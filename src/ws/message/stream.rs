use std::task::Poll;

use bytes::Bytes;
use futures_util::{ready, Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;

use super::{EncodeMessageError, Message, ParseMessageError};
use crate::ws::transport::{CloseFrame, Frame, Socket, TransportError};

/// Error when read/write message stream/sink
#[derive(Debug, Snafu)]
#[snafu(module(error), context(suffix(false)))]
pub enum MessageStreamSinkError {
    /// underlying socket broken
    #[snafu(display("underlying socket broken: {source}"))]
    Transport {
        /// source error
        source: TransportError,
    },

    /// parse frame data as message failed
    #[snafu(display("parse frame to message failed: {source}"))]
    ParseMessageFailed {
        /// source error
        source: ParseMessageError,
    },

    /// encode message as frame data failed
    #[snafu(display("encode message to frame failed: {source}"))]
    EncodeMessageFailed {
        /// source error
        source: EncodeMessageError,
    },
}

impl MessageStreamSinkError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::ParseMessageFailed { .. } | Self::EncodeMessageFailed { .. } => false,
        }
    }
}

/// Item read from a [`MessageStream`]
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// decoded protocol message
    Message(Message),
    /// peer closed the socket
    Closed(CloseFrame),
}

/// Item written to a [`MessageStream`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// protocol message, sent as a text frame
    Message(Message),
    /// close the socket
    Close(CloseFrame),
}

impl From<Message> for Outbound {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// graphql-transport-ws message stream/sink over a [`Socket`]
#[derive(Debug)]
pub struct MessageStream<S> {
    socket: S,
}

impl<S> MessageStream<S> {
    /// Construct a new stream with underlying socket.
    pub fn new(socket: S) -> Self {
        Self { socket }
    }
}

impl<S: Socket> Stream for MessageStream<S> {
    type Item = Result<Inbound, MessageStreamSinkError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let frame = match ready!(self.socket.poll_next_unpin(cx)) {
            Some(frame) => frame.context(error::Transport)?,
            None => return Poll::Ready(None),
        };

        let buffer: Bytes = match frame {
            Frame::Text(text) => text.into(),
            Frame::Binary(data) => data,
            Frame::Close(close) => return Poll::Ready(Some(Ok(Inbound::Closed(close)))),
        };

        let result = match Message::decode(&buffer) {
            Ok(message) => Ok(Inbound::Message(message)),
            Err(e) => {
                log::trace!(
                    "Parse failed message data: {}",
                    std::str::from_utf8(&buffer).unwrap_or("<not-utf8-binary>")
                );
                Err(MessageStreamSinkError::ParseMessageFailed { source: e })
            }
        };

        Poll::Ready(Some(result))
    }
}

impl<S: Socket> Sink<Outbound> for MessageStream<S> {
    type Error = MessageStreamSinkError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.socket
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Transport { source: e })
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Outbound) -> Result<(), Self::Error> {
        let frame = match item {
            Outbound::Message(message) => {
                log::trace!("Send {} message", message.type_name());
                Frame::Text(message.encode().context(error::EncodeMessageFailed)?)
            }
            Outbound::Close(close) => {
                log::trace!("Send close frame {:?}", close);
                Frame::Close(close)
            }
        };

        self.socket
            .start_send_unpin(frame)
            .map_err(|e| Self::Error::Transport { source: e })
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.socket
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Transport { source: e })
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.socket
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Transport { source: e })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ws::{
        close::CloseCode,
        transport::{memory, Transport},
    };

    #[tokio::test]
    async fn test_stream_decodes_text_and_binary() {
        let (transport, mut server) = memory::channel();
        let mut stream = MessageStream::new(transport.open().await.unwrap());
        let conn = server.accept().await.unwrap();

        conn.send_frame(Frame::Text(r#"{"type":"connection_ack"}"#.to_string()));
        conn.send_frame(Frame::Binary(Bytes::from_static(
            br#"{"type":"complete","id":"1"}"#,
        )));

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Inbound::Message(Message::ConnectionAck { payload: None })
        );
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Inbound::Message(Message::complete("1"))
        );
    }

    #[tokio::test]
    async fn test_stream_decode_error_is_not_fatal() {
        let (transport, mut server) = memory::channel();
        let mut stream = MessageStream::new(transport.open().await.unwrap());
        let conn = server.accept().await.unwrap();

        conn.send_frame(Frame::Text(r#"{"type":"bogus"}"#.to_string()));
        conn.close(CloseCode::UNAUTHORIZED, "Unauthorized");

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(
            err,
            MessageStreamSinkError::ParseMessageFailed {
                source: ParseMessageError::UnknownMessageType { .. }
            }
        ));

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Inbound::Closed(CloseFrame::new(CloseCode::UNAUTHORIZED, "Unauthorized"))
        );
    }

    #[tokio::test]
    async fn test_sink_encodes_messages_and_close() {
        let (transport, mut server) = memory::channel();
        let mut stream = MessageStream::new(transport.open().await.unwrap());
        let mut conn = server.accept().await.unwrap();

        stream
            .send(Message::ConnectionInit { payload: None }.into())
            .await
            .unwrap();
        stream
            .send(Outbound::Close(CloseFrame::new(
                CloseCode::NORMAL_CLOSURE,
                "Normal Closure",
            )))
            .await
            .unwrap();

        assert_eq!(
            conn.recv().await.unwrap(),
            Frame::Text(r#"{"type":"connection_init"}"#.to_string())
        );
        assert_eq!(
            conn.recv().await.unwrap(),
            Frame::Close(CloseFrame::new(CloseCode::NORMAL_CLOSURE, "Normal Closure"))
        );
    }
}
