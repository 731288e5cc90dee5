use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use snafu::prelude::*;
use tokio::sync::{mpsc, oneshot, watch, Notify};

use super::{
    config::Config,
    driver::Driver,
    handshake::{Handshake, HandshakeResult},
    registry::{Dispatch, Registry},
    subscription::{CancelHandle, Delivery, Subscription},
    State,
};
use crate::{
    error::{start_error, ConnectionError, StartError, SubscribeError},
    ws::{
        message::{Message, Payload, SubscribePayload},
        transport::Transport,
    },
};

/// Mutable session fields, only touched with the lock held.
#[derive(Debug, Default)]
struct Session {
    state: State,
    /// bumped on every start and stop, drivers of older epochs are ignored
    epoch: u64,
    /// ids of subscriptions waiting for acknowledgment, in submission order
    pending: VecDeque<String>,
    registry: Registry,
    /// outgoing queue of the current socket, only set while acknowledged
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    shutdown: Option<Arc<Notify>>,
    handshakes: Vec<oneshot::Sender<HandshakeResult>>,
}

impl Session {
    fn send(&self, message: Message) {
        match &self.outgoing {
            Some(tx) => {
                if tx.send(message).is_err() {
                    log::debug!("Outgoing queue closed, message dropped");
                }
            }
            None => log::debug!("No socket, {} message dropped", message.type_name()),
        }
    }

    /// Forget subscriptions whose consumer was dropped.
    ///
    /// While acknowledged they already reached the server, so `complete` is sent for them.
    fn reap(&mut self) {
        let abandoned = self.registry.remove_abandoned();
        if abandoned.is_empty() {
            return;
        }

        self.pending.retain(|id| !abandoned.contains(id));

        for id in abandoned {
            log::debug!("Subscription {} consumer dropped, forget it", id);
            if self.state == State::Acknowledged {
                self.send(Message::complete(&id));
            }
        }
    }
}

/// State shared by the client handles, subscription handles and the session driver
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: Config,
    pub transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    state_tx: watch::Sender<State>,
}

impl Shared {
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Self {
        let (state_tx, _) = watch::channel(State::NotStarted);

        Self {
            config,
            transport,
            session: Mutex::new(Session::default()),
            state_tx,
        }
    }

    pub fn state(&self) -> State {
        self.session.lock().state
    }

    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state_tx.subscribe()
    }

    pub fn subscription_count(&self) -> usize {
        self.session.lock().registry.len()
    }

    fn transition(&self, session: &mut Session, state: State) {
        if session.state != state {
            log::debug!("Move to {:?} state", state);
            session.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn prepare_start(
        self: &Arc<Self>,
        session: &mut Session,
        params: Option<Payload>,
    ) -> Result<(Driver, Handshake), StartError> {
        ensure!(session.state == State::NotStarted, start_error::AlreadyStarted);

        session.epoch += 1;
        let shutdown = Arc::new(Notify::new());
        session.shutdown.replace(Arc::clone(&shutdown));

        let (tx, rx) = oneshot::channel();
        session.handshakes.push(tx);

        self.transition(session, State::Connecting);

        let driver = Driver::new(Arc::clone(self), session.epoch, shutdown, params);
        Ok((driver, Handshake::new(rx)))
    }

    pub fn start(self: &Arc<Self>, params: Option<Payload>) -> Result<Handshake, StartError> {
        let (driver, handshake) = {
            let mut guard = self.session.lock();
            self.prepare_start(&mut guard, params)?
        };

        tokio::spawn(driver.run());

        Ok(handshake)
    }

    pub fn subscribe(self: &Arc<Self>, payload: SubscribePayload) -> Subscription {
        let id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut driver = None;

        {
            let mut guard = self.session.lock();
            let session = &mut *guard;

            if session.state == State::NotStarted {
                if !self.config.auto_connect {
                    log::debug!("Subscription {} refused, session not started", id);
                    return Subscription::failed(id, SubscribeError::NotStartedAndNoAutoConnect);
                }

                let started = connection_params(self.config.connection_params.clone())
                    .and_then(|params| self.prepare_start(session, params));

                match started {
                    // nobody waits for an implicit start, failures reach the subscriptions
                    Ok((d, _)) => driver = Some(d),
                    Err(source) => {
                        return Subscription::failed(id, SubscribeError::Start { source })
                    }
                }
            }

            session.reap();
            session.registry.insert(id.to_string(), payload.clone(), tx);

            match session.state {
                State::Acknowledged => {
                    log::trace!("Send subscription {}", id);
                    session.send(Message::subscribe(&id, payload));
                }
                _ => {
                    log::trace!("Queue subscription {} until acknowledged", id);
                    session.pending.push_back(id.to_string());
                }
            }
        }

        if let Some(driver) = driver {
            tokio::spawn(driver.run());
        }

        Subscription::new(rx, CancelHandle::new(id, Arc::downgrade(self)))
    }

    pub fn cancel(&self, id: &str) {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.registry.remove(id).is_none() {
            log::trace!("Subscription {} already ended", id);
            return;
        }

        match session.state {
            State::Acknowledged => session.send(Message::complete(id)),
            State::Connecting => session.pending.retain(|pending| pending != id),
            State::NotStarted => {}
        }
    }

    pub fn stop(&self) {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.state == State::NotStarted {
            return;
        }

        log::info!("Stop session");

        if let Some(shutdown) = session.shutdown.take() {
            shutdown.notify_one();
        }
        session.epoch += 1;

        self.reset(session, Arc::new(ConnectionError::Stopped));
    }

    fn reset(&self, session: &mut Session, error: Arc<ConnectionError>) {
        session.outgoing = None;
        session.shutdown = None;
        session.pending.clear();

        for (id, sink) in session.registry.drain() {
            log::trace!("Terminate subscription {}", id);
            let _ = sink.send(Delivery::Error(SubscribeError::Connection {
                source: Arc::clone(&error),
            }));
        }

        for handshake in session.handshakes.drain(..) {
            let _ = handshake.send(Err(Arc::clone(&error)));
        }

        self.transition(session, State::NotStarted);
    }

    /// Driver of an older epoch, or of a stopped session
    pub fn is_stale(&self, epoch: u64) -> bool {
        self.session.lock().epoch != epoch
    }

    /// Called by the driver when `connection_ack` arrives, flushes the pending queue in order.
    ///
    /// Returns false if the driver is stale.
    pub fn acknowledge(
        &self,
        epoch: u64,
        outgoing: mpsc::UnboundedSender<Message>,
        payload: Option<Payload>,
    ) -> bool {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.epoch != epoch {
            return false;
        }

        // nothing queued reached this socket yet, abandoned entries are just skipped
        session.reap();

        log::info!(
            "Connection acknowledged, flush {} pending subscription(s)",
            session.pending.len()
        );

        session.outgoing.replace(outgoing);
        self.transition(session, State::Acknowledged);

        while let Some(id) = session.pending.pop_front() {
            if let Some(payload) = session.registry.payload(&id) {
                let message = Message::subscribe(&id, payload.clone());
                session.send(message);
            }
        }

        for handshake in session.handshakes.drain(..) {
            let _ = handshake.send(Ok(payload.clone()));
        }

        true
    }

    /// Called by the driver when the socket is lost but the session will reconnect.
    ///
    /// Every registered subscription with a live consumer is queued again, to be replayed after
    /// the next acknowledgment. Returns false if the driver is stale.
    pub fn connection_lost(&self, epoch: u64) -> bool {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.epoch != epoch {
            return false;
        }

        session.outgoing = None;
        self.transition(session, State::Connecting);
        session.reap();
        session.pending = session.registry.ids().into();

        true
    }

    /// Called by the driver when the session can't go on
    pub fn fail(&self, epoch: u64, error: ConnectionError) {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.epoch != epoch {
            return;
        }

        log::warn!(
            "Session failed, terminate {} subscription(s): {}",
            session.registry.len(),
            error
        );

        self.reset(session, Arc::new(error));
    }

    /// Route a `next`, `error` or `complete` message to its subscription.
    ///
    /// Returns false if the driver is stale.
    pub fn dispatch(&self, epoch: u64, message: Message) -> bool {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.epoch != epoch {
            return false;
        }

        let (id, delivery) = match message {
            Message::Next { id, payload } => (id, Delivery::Next(payload)),
            Message::Error { id, payload } => (
                id,
                Delivery::Error(SubscribeError::Server { errors: payload }),
            ),
            Message::Complete { id } => (id, Delivery::Complete),
            other => {
                log::warn!("Can't dispatch {} message", other.type_name());
                return true;
            }
        };

        match session.registry.deliver(&id, delivery) {
            Dispatch::Sent => log::trace!("Delivered result to subscription {}", id),
            Dispatch::Finished => log::debug!("Subscription {} ended by server", id),
            Dispatch::Unknown => log::trace!("Drop message for unknown subscription {}", id),
            Dispatch::Gone => {
                log::debug!("Subscription {} consumer dropped, complete it", id);
                session.send(Message::complete(&id));
            }
        }

        true
    }

    /// End one subscription with an error, the session goes on.
    ///
    /// If `notify_server`, a `complete` is sent for it. Returns false if the driver is stale.
    pub fn fail_subscription(
        &self,
        epoch: u64,
        id: &str,
        error: SubscribeError,
        notify_server: bool,
    ) -> bool {
        let mut guard = self.session.lock();
        let session = &mut *guard;

        if session.epoch != epoch {
            return false;
        }

        if let Some(sink) = session.registry.remove(id) {
            log::warn!("Subscription {} failed: {}", id, error);
            let _ = sink.send(Delivery::Error(error));

            if notify_server && session.state == State::Acknowledged {
                session.send(Message::complete(id));
            }
        }

        true
    }
}

/// Check caller provided connection params, only json object or null is allowed
pub(crate) fn connection_params(
    params: Option<serde_json::Value>,
) -> Result<Option<Payload>, StartError> {
    match params {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(map)) => Ok(Some(map)),
        Some(other) => start_error::ConnectionParamsNotObject {
            found: json_type_name(&other),
        }
        .fail(),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
