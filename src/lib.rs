//! # graphql-ws-session
//!
//! A GraphQL over WebSocket subscription client, speaking the `graphql-transport-ws` protocol.
//!
//! A [`Client`] runs one session: it opens a socket through a [`Transport`], performs the
//! `connection_init`/`connection_ack` handshake, multiplexes subscriptions over the socket,
//! keeps it alive with pings, and reconnects after recoverable losses.
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use graphql_ws_session::{ws::message::SubscribePayload, Client, TungsteniteTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TungsteniteTransport::new("ws://localhost:4000/graphql")?;
//! let client = Client::new(transport);
//!
//! let mut counts = client.subscribe(SubscribePayload::new("subscription { count }"));
//! while let Some(result) = counts.next().await {
//!     println!("{:?}", result?.data);
//! }
//!
//! client.stop();
//! # Ok(())
//! # }
//! ```

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod ws;

mod error;
pub use error::{ConnectionError, StartError, SubscribeError};

pub use ws::{
    transport::{Transport, TransportError, TungsteniteTransport},
    Client, ClientBuilder, Handshake, State, Status, Subscription,
};
