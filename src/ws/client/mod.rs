mod config;
mod driver;
mod handshake;
mod keepalive;
mod registry;
mod session;
mod subscription;


pub use config::{default_retry_wait, ClientBuilder, RetryWait};
pub use handshake::Handshake;
pub use subscription::{CancelHandle, Status, Subscription};

use std::sync::Arc;

use serde::Serialize;
use snafu::prelude::*;
use tokio::sync::watch;

use crate::{
    error::{start_error, StartError},
    ws::{message::SubscribePayload, transport::Transport},
};
use config::Config;
use session::{connection_params, Shared};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// no socket, subscriptions are refused or start the session
    #[default]
    NotStarted,
    /// socket opening or waiting for `connection_ack`, subscriptions are queued
    Connecting,
    /// server acknowledged, subscriptions are sent immediately
    Acknowledged,
}

/// graphql-transport-ws client, it manages one session over sockets opened by a [`Transport`].
///
/// The session starts explicitly with [`Client::start`], or on the first
/// [`Client::subscribe`] if auto connect is enabled. It runs in a background tokio task until
/// [`Client::stop`] is called or it fails, so a tokio runtime is required.
///
/// Cloning the client gives another handle to the same session. Once the last handle is
/// dropped the session is stopped, like [`Client::stop`].
#[derive(Debug, Clone)]
pub struct Client {
    owner: Arc<Owner>,
}

/// Last client handle stops the session
#[derive(Debug)]
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl Client {
    /// Create a client with default configuration
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::builder(transport).build()
    }

    /// Create a client builder
    pub fn builder<T: Transport>(transport: T) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.owner.shared
    }

    pub(crate) fn from_parts(transport: Arc<dyn Transport>, config: Config) -> Self {
        Self {
            owner: Arc::new(Owner {
                shared: Arc::new(Shared::new(transport, config)),
            }),
        }
    }

    /// Start the session with the configured connection params.
    ///
    /// Returns immediately, the socket is opened in background. Await the returned
    /// [`Handshake`] to know when (and if) the server accepted the session.
    pub fn start(&self) -> Result<Handshake, StartError> {
        let params = connection_params(self.shared().config.connection_params.clone())?;
        self.shared().start(params)
    }

    /// Start the session, sending `params` as `connection_init` payload
    pub fn start_with<P: Serialize + ?Sized>(&self, params: &P) -> Result<Handshake, StartError> {
        let value = serde_json::to_value(params).context(start_error::EncodeConnectionParams)?;
        self.shared().start(connection_params(Some(value))?)
    }

    /// Subscribe a GraphQL operation.
    ///
    /// Never waits: before acknowledgment the operation is queued and sent once the server
    /// accepts the session. Failures, including refusal to start, arrive as the last item of
    /// the returned stream.
    pub fn subscribe(&self, payload: SubscribePayload) -> Subscription {
        self.shared().subscribe(payload)
    }

    /// Stop the session: close the socket with 1000, terminate all subscriptions and clear the
    /// pending queue. Does nothing if not started.
    pub fn stop(&self) {
        self.shared().stop()
    }

    /// current state
    pub fn state(&self) -> State {
        self.shared().state()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.shared().watch_state()
    }

    /// active subscription count
    pub fn subscription_count(&self) -> usize {
        self.shared().subscription_count()
    }
}
