use std::{fmt::Debug, sync::Arc, time::Duration};

use rand::Rng;

use super::Client;
use crate::ws::{message::Payload, transport::Transport};

/// Wait time before the n-th (zero based) reconnect attempt
pub type RetryWait = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(12);
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_MAX_EXPONENT: u32 = 5;
const RETRY_JITTER_MS: std::ops::Range<u64> = 300..3000;

/// Default reconnect backoff: `1s * 2^attempt` plus a random jitter of 300ms to 3s.
///
/// The exponent stops growing after 5, so a single wait is never longer than 35s.
pub fn default_retry_wait(attempt: u32) -> Duration {
    let backoff = RETRY_BASE * 2u32.pow(attempt.min(RETRY_MAX_EXPONENT));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(RETRY_JITTER_MS));
    backoff + jitter
}

#[derive(Clone)]
pub(crate) struct Config {
    pub connection_params: Option<serde_json::Value>,
    pub auto_connect: bool,
    pub connection_ack_timeout: Option<Duration>,
    pub keep_alive: Option<Duration>,
    pub pong_timeout: Option<Duration>,
    pub ping_payload: Option<Payload>,
    pub retry_attempts: u32,
    pub retry_wait: RetryWait,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_params: None,
            auto_connect: true,
            connection_ack_timeout: None,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            pong_timeout: None,
            ping_payload: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_wait: Arc::new(default_retry_wait),
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("connection_params", &self.connection_params.is_some())
            .field("auto_connect", &self.auto_connect)
            .field("connection_ack_timeout", &self.connection_ack_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("pong_timeout", &self.pong_timeout)
            .field("ping_payload", &self.ping_payload)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Client`]
#[derive(Debug)]
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    config: Config,
}

impl ClientBuilder {
    pub(crate) fn new<T: Transport>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Config::default(),
        }
    }

    /// Default `connection_init` payload, must be a json object or null.
    ///
    /// Checked when the session starts, see [`Client::start`].
    pub fn connection_params(mut self, params: serde_json::Value) -> Self {
        self.config.connection_params.replace(params);
        self
    }

    /// Start the session on first subscribe if it is not started yet, default true
    pub fn auto_connect(mut self, enable: bool) -> Self {
        self.config.auto_connect = enable;
        self
    }

    /// Give up (and close with 4504) if no `connection_ack` arrives in this time after the socket
    /// opened, default no limit
    pub fn connection_ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_ack_timeout.replace(timeout);
        self
    }

    /// Send a `ping` after this long without inbound traffic, zero disables, default 12s
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.config.keep_alive = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }

    /// Treat the socket as lost if nothing arrives in this time after a keep-alive `ping`,
    /// default no limit
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.config.pong_timeout.replace(timeout);
        self
    }

    /// Payload carried by keep-alive `ping` messages
    pub fn ping_payload(mut self, payload: Payload) -> Self {
        self.config.ping_payload.replace(payload);
        self
    }

    /// Reconnect attempts allowed after a recoverable connection loss, default 5.
    ///
    /// The budget is refilled every time the server acknowledges a connection.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    /// Backoff policy, receives the zero based attempt number, default [`default_retry_wait`]
    pub fn retry_wait<F>(mut self, wait: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.config.retry_wait = Arc::new(wait);
        self
    }

    /// Build the client, no socket is opened until it starts
    pub fn build(self) -> Client {
        Client::from_parts(self.transport, self.config)
    }
}
