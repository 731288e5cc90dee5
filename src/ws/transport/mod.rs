//! Socket transport abstraction.
//!
//! The session only talks to a [`Transport`], so any websocket implementation (or an in-process
//! double, see [`memory`]) can carry the protocol.

pub mod memory;
mod tungstenite;

pub use self::tungstenite::{InvalidEndpointError, TungsteniteTransport};

use std::fmt::Debug;

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use futures_util::{Sink, Stream};
use snafu::prelude::*;

use super::close::CloseCode;

/// Opaque transport specific error
#[derive(Debug, Snafu)]
#[snafu(display("{message}: {source}"))]
pub struct TransportError {
    /// what the transport was doing
    pub message: String,
    /// source error
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    /// Wrap a transport specific error
    pub fn new<M, E>(message: M, source: E) -> Self
    where
        M: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// Close frame content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// close code
    pub code: CloseCode,
    /// human readable reason
    pub reason: String,
}

impl CloseFrame {
    /// Create a close frame
    pub fn new<S: Into<String>>(code: CloseCode, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A websocket data frame, as seen by the session
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum Frame {
    /// text frame
    Text(String),
    /// binary frame
    Binary(Bytes),
    /// close frame, the last frame of a socket
    Close(CloseFrame),
}

/// One opened physical socket.
///
/// Inbound frames are read from the [`Stream`] side in delivery order, outbound frames are
/// written to the [`Sink`] side. Sending a [`Frame::Close`] closes the socket.
pub trait Socket:
    Stream<Item = Result<Frame, TransportError>> + Sink<Frame, Error = TransportError> + Send + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Frame, TransportError>>
        + Sink<Frame, Error = TransportError>
        + Send
        + Unpin
{
}

/// Boxed socket returned by a [`Transport`]
pub type BoxSocket = Box<dyn Socket>;

/// Capability to open sockets to a graphql-transport-ws server.
///
/// Every call opens a new physical socket, the session calls it once per connection attempt.
#[async_trait::async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Open a new socket
    async fn open(&self) -> Result<BoxSocket, TransportError>;
}
