//! graphql-transport-ws protocol client implement

mod client;
pub mod close;
pub mod message;
pub mod transport;

pub use client::{
    default_retry_wait, CancelHandle, Client, ClientBuilder, Handshake, RetryWait, State, Status,
    Subscription,
};

/// Websocket sub-protocol negotiated in the opening handshake
pub const PROTOCOL: &str = "graphql-transport-ws";
