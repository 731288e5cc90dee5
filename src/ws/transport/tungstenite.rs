use std::task::Poll;

use futures_util::{ready, Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::{
    self as websocket,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        protocol::{frame::coding::CloseCode as WsCloseCode, CloseFrame as WsCloseFrame},
    },
};

use super::{BoxSocket, CloseFrame, Frame, Transport, TransportError};
use crate::ws::{close::CloseCode, PROTOCOL};

type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Error when parse string as graphql websocket endpoint
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum InvalidEndpointError {
    /// the str is not a valid url
    #[snafu(display("{s} is an invalid url: {source}"))]
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is not websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the endpoint url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// [`Transport`] over a real websocket connection, using tokio-tungstenite.
///
/// The opening handshake asks for the `graphql-transport-ws` sub-protocol.
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    url: url::Url,
    headers: Vec<(String, String)>,
}

impl TungsteniteTransport {
    /// Create a transport connecting to a `ws://` or `wss://` endpoint
    pub fn new<S: AsRef<str> + ?Sized>(endpoint: &S) -> Result<Self, InvalidEndpointError> {
        let s = endpoint.as_ref();
        let url = url::Url::parse(s).with_context(|_| error::InvalidURL { s })?;

        ensure!(
            url.scheme() == "wss" || url.scheme() == "ws",
            error::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        ensure!(url.host().is_some(), error::NoHost { s });

        Ok(Self {
            url,
            headers: Vec::new(),
        })
    }

    /// Add an extra header to the opening handshake request, e.g. for authorization
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// endpoint url
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    fn request(&self) -> Result<tungstenite::handshake::client::Request, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::new("build websocket request failed", e))?;

        let headers = request.headers_mut();
        headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static(PROTOCOL));

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::new(format!("invalid header name {}", name), e))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::new(format!("invalid header value for {}", name.as_str()), e)
            })?;
            headers.insert(name, value);
        }

        Ok(request)
    }
}

#[async_trait::async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self) -> Result<BoxSocket, TransportError> {
        log::debug!("Connecting endpoint: {}", self.url);

        let (ws, response) = websocket::connect_async(self.request()?)
            .await
            .map_err(|e| TransportError::new(format!("connect {} failed", self.url), e))?;

        log::trace!(
            "Endpoint accepted sub-protocol {:?}",
            response.headers().get("Sec-WebSocket-Protocol")
        );

        Ok(Box::new(TungsteniteSocket { ws }))
    }
}

#[derive(Debug)]
struct TungsteniteSocket {
    ws: WebsocketClient,
}

impl Stream for TungsteniteSocket {
    type Item = Result<Frame, TransportError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        loop {
            let message = match ready!(self.ws.poll_next_unpin(cx)) {
                None => return Poll::Ready(None),
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(TransportError::new(
                        "underlying websocket stream broken",
                        e,
                    ))))
                }
                Some(Ok(message)) => message,
            };

            let frame = match message {
                tungstenite::Message::Text(text) => Frame::Text(text),
                tungstenite::Message::Binary(data) => Frame::Binary(data.into()),
                tungstenite::Message::Close(close) => Frame::Close(match close {
                    Some(close) => CloseFrame::new(
                        CloseCode::new(close.code.into()),
                        close.reason.into_owned(),
                    ),
                    None => CloseFrame::new(CloseCode::NO_STATUS, ""),
                }),
                // control frames are answered by tungstenite itself
                _ => continue,
            };

            return Poll::Ready(Some(Ok(frame)));
        }
    }
}

impl Sink<Frame> for TungsteniteSocket {
    type Error = TransportError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| TransportError::new("websocket not ready", e))
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let message = match item {
            Frame::Text(text) => tungstenite::Message::Text(text),
            Frame::Binary(data) => tungstenite::Message::Binary(data.to_vec()),
            Frame::Close(close) => tungstenite::Message::Close(Some(WsCloseFrame {
                code: WsCloseCode::from(close.code.as_u16()),
                reason: close.reason.into(),
            })),
        };

        self.ws
            .start_send_unpin(message)
            .map_err(|e| TransportError::new("websocket send failed", e))
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| TransportError::new("websocket flush failed", e))
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| TransportError::new("websocket close failed", e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoint_validation() {
        let transport = TungsteniteTransport::new("wss://example.com/graphql").unwrap();
        assert_eq!(transport.url().path(), "/graphql");

        assert!(matches!(
            TungsteniteTransport::new("https://example.com/graphql"),
            Err(InvalidEndpointError::InvalidSchema { .. })
        ));
        assert!(matches!(
            TungsteniteTransport::new("not a url"),
            Err(InvalidEndpointError::InvalidURL { .. })
        ));
    }

    #[test]
    fn test_request_carries_sub_protocol_and_headers() {
        let request = TungsteniteTransport::new("ws://127.0.0.1:4000/graphql")
            .unwrap()
            .header("Authorization", "Bearer token")
            .request()
            .unwrap();

        assert_eq!(
            request.headers().get("Sec-WebSocket-Protocol").unwrap(),
            "graphql-transport-ws"
        );
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer token"
        );
    }

    #[test]
    fn test_request_rejects_invalid_header() {
        let result = TungsteniteTransport::new("ws://127.0.0.1:4000/graphql")
            .unwrap()
            .header("bad header", "value")
            .request();

        assert!(result.is_err());
    }
}
