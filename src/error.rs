//! session error types

use std::sync::Arc;

use snafu::prelude::*;

use crate::ws::{
    close::CloseCode,
    message::{EncodeMessageError, GraphQLError, MessageStreamSinkError, ParseMessageError},
    transport::TransportError,
};

/// Error when start a session
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(start_error), context(suffix(false)))]
pub enum StartError {
    /// session is not in not-started state
    #[snafu(display("session already started"))]
    AlreadyStarted,

    /// connection params can't be serialized
    #[snafu(display("encode connection params failed: {source}"))]
    EncodeConnectionParams {
        /// source error
        source: serde_json::Error,
    },

    /// connection params is not a json object
    #[snafu(display("connection params must be an object, got {found}"))]
    ConnectionParamsNotObject {
        /// json type found
        found: &'static str,
    },
}

/// Error that ends a connection attempt, or the whole session
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(connection_error), context(suffix(false)))]
pub enum ConnectionError {
    /// transport can't open a socket
    #[snafu(display("open socket failed: {source}"))]
    Open {
        /// source error
        source: TransportError,
    },

    /// send `connection_init` failed
    #[snafu(display("send connection_init failed: {source}"))]
    SendInit {
        /// source error
        source: MessageStreamSinkError,
    },

    /// send a keep-alive or control message failed
    #[snafu(display("send {type_name} message failed: {source}"))]
    Send {
        /// message type
        type_name: &'static str,
        /// source error
        source: MessageStreamSinkError,
    },

    /// receive from socket failed
    #[snafu(display("receive from socket failed: {source}"))]
    Receive {
        /// source error
        source: TransportError,
    },

    /// socket ended without close frame
    #[snafu(display("socket ended without close frame"))]
    EndOfStream,

    /// socket closed by server
    #[snafu(display("socket closed with code {code}: {reason}"))]
    Closed {
        /// close code
        code: CloseCode,
        /// close reason
        reason: String,
    },

    /// no `connection_ack` in time
    #[snafu(display("timeout when wait connection_ack"))]
    AckTimeout,

    /// no traffic in time after a keep-alive ping
    #[snafu(display("timeout when wait pong"))]
    PongTimeout,

    /// server sent an undecodable message that no subscription can take
    #[snafu(display("invalid message from server: {source}"))]
    BadResponse {
        /// source error
        source: ParseMessageError,
    },

    /// server sent a message that is not allowed in current state
    #[snafu(display("unexpected {type_name} message from server"))]
    UnexpectedMessage {
        /// message type
        type_name: &'static str,
    },

    /// reconnect budget used up
    #[snafu(display("give up after {attempts} reconnect attempts: {source}"))]
    RetriesExhausted {
        /// reconnect attempts made
        attempts: u32,
        /// last connection error
        source: Box<ConnectionError>,
    },

    /// session stopped by caller
    #[snafu(display("session stopped"))]
    Stopped,
}

impl ConnectionError {
    /// close code the session ended with, if the server closed the socket
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code, .. } => Some(*code),
            Self::RetriesExhausted { source, .. } => source.close_code(),
            _ => None,
        }
    }
}

/// Error delivered to a subscription, always the last item of it
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(subscribe_error), context(suffix(false)))]
pub enum SubscribeError {
    /// session not started and auto connect disabled
    #[snafu(display("session not started and auto connect is disabled"))]
    NotStartedAndNoAutoConnect,

    /// auto connect failed to start the session
    #[snafu(display("auto connect failed: {source}"))]
    Start {
        /// source error
        source: StartError,
    },

    /// encode `subscribe` message failed
    #[snafu(display("encode subscribe message failed: {source}"))]
    Encode {
        /// source error
        source: EncodeMessageError,
    },

    /// send `subscribe` message failed
    #[snafu(display("send subscribe message failed: {source}"))]
    Send {
        /// source error
        source: TransportError,
    },

    /// server sent an undecodable message for this subscription
    #[snafu(display("decode message failed: {source}"))]
    Decode {
        /// source error
        source: ParseMessageError,
    },

    /// server reported operation errors
    #[snafu(display("server reported {} error(s), first: {}", errors.len(), errors.first().map(|e| e.message.as_str()).unwrap_or("<none>")))]
    Server {
        /// reported errors
        errors: Vec<GraphQLError>,
    },

    /// session connection failed
    #[snafu(display("connection failed: {source}"))]
    Connection {
        /// source error, shared by all subscriptions of the session
        source: Arc<ConnectionError>,
    },
}
