use std::sync::Arc;

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, Notify},
    time::Instant,
};

use super::{
    keepalive::{sleep_until, KeepAlive},
    session::Shared,
};
use crate::{
    error::{ConnectionError, SubscribeError},
    ws::{
        close::{CloseCode, Disposition},
        message::{Inbound, Message, MessageStream, MessageStreamSinkError, Outbound, Payload},
        transport::{BoxSocket, CloseFrame},
    },
};

type SocketSink = SplitSink<MessageStream<BoxSocket>, Outbound>;

/// How one socket ended
#[derive(Debug)]
enum Outcome {
    /// session stopped by caller
    Stopped,
    /// session can't go on
    Fatal(ConnectionError),
    /// socket lost, may reconnect
    Lost {
        error: ConnectionError,
        acknowledged: bool,
    },
}

/// Background task of one started session, owns the current socket.
///
/// Opens a socket, runs the handshake, moves messages between the socket and the session, and
/// reconnects on recoverable losses until the retry budget is used up.
#[derive(Debug)]
pub(crate) struct Driver {
    shared: Arc<Shared>,
    epoch: u64,
    shutdown: Arc<Notify>,
    params: Option<Payload>,
}

impl Driver {
    pub fn new(
        shared: Arc<Shared>,
        epoch: u64,
        shutdown: Arc<Notify>,
        params: Option<Payload>,
    ) -> Self {
        Self {
            shared,
            epoch,
            shutdown,
            params,
        }
    }

    pub async fn run(self) {
        log::debug!("Session driver {} start", self.epoch);

        let retry_attempts = self.shared.config.retry_attempts;
        let mut attempt = 0;

        loop {
            match self.connection().await {
                Outcome::Stopped => break,
                Outcome::Fatal(error) => {
                    self.shared.fail(self.epoch, error);
                    break;
                }
                Outcome::Lost {
                    error,
                    acknowledged,
                } => {
                    log::warn!("Connection lost: {}", error);

                    if acknowledged {
                        attempt = 0;
                    }

                    if attempt >= retry_attempts {
                        self.shared.fail(
                            self.epoch,
                            ConnectionError::RetriesExhausted {
                                attempts: attempt,
                                source: Box::new(error),
                            },
                        );
                        break;
                    }

                    if !self.shared.connection_lost(self.epoch) {
                        break;
                    }

                    let wait = (self.shared.config.retry_wait)(attempt);
                    attempt += 1;
                    log::info!(
                        "Reconnect in {:?}, attempt {}/{}",
                        wait,
                        attempt,
                        retry_attempts
                    );

                    tokio::select! {
                        biased;

                        _ = self.shutdown.notified() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        log::debug!("Session driver {} stop", self.epoch);
    }

    async fn connection(&self) -> Outcome {
        let config = &self.shared.config;

        if self.shared.is_stale(self.epoch) {
            return Outcome::Stopped;
        }

        let socket = tokio::select! {
            biased;

            _ = self.shutdown.notified() => return Outcome::Stopped,
            socket = self.shared.transport.open() => match socket {
                Ok(socket) => socket,
                Err(source) => {
                    return Outcome::Lost {
                        error: ConnectionError::Open { source },
                        acknowledged: false,
                    }
                }
            },
        };

        log::debug!("Socket opened, send connection_init");

        let (mut sink, mut stream) = MessageStream::new(socket).split();

        let init = Message::ConnectionInit {
            payload: self.params.clone(),
        };
        if let Err(source) = sink.send(init.into()).await {
            let socket_broken = source.is_fatal();
            let error = ConnectionError::SendInit { source };
            return if socket_broken {
                Outcome::Lost {
                    error,
                    acknowledged: false,
                }
            } else {
                Outcome::Fatal(error)
            };
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let mut keep_alive = KeepAlive::new(config.keep_alive, config.pong_timeout);
        let ack_deadline = config.connection_ack_timeout.map(|t| Instant::now() + t);
        let mut acknowledged = false;

        loop {
            let ack_at = if acknowledged { None } else { ack_deadline };

            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    close(&mut sink, CloseCode::NORMAL_CLOSURE, "Normal Closure").await;
                    return Outcome::Stopped;
                }

                _ = sleep_until(ack_at) => {
                    log::warn!("No connection_ack in {:?}", config.connection_ack_timeout);
                    close(&mut sink, CloseCode::CONNECTION_ACK_TIMEOUT, "Connection acknowledgement timeout").await;
                    return Outcome::Fatal(ConnectionError::AckTimeout);
                }

                _ = sleep_until(keep_alive.pong_deadline()) => {
                    return Outcome::Lost {
                        error: ConnectionError::PongTimeout,
                        acknowledged,
                    };
                }

                _ = sleep_until(keep_alive.ping_at()) => {
                    log::trace!("Connection idle, send ping");
                    let ping = Message::Ping { payload: config.ping_payload.clone() };
                    if let Err(source) = sink.send(ping.into()).await {
                        return Outcome::Lost {
                            error: ConnectionError::Send { type_name: "ping", source },
                            acknowledged,
                        };
                    }
                    keep_alive.ping_sent();
                }

                Some(message) = out_rx.recv() => {
                    self.send_outgoing(&mut sink, message).await;
                }

                inbound = stream.next() => {
                    let message = match inbound {
                        None => return Outcome::Lost {
                            error: ConnectionError::EndOfStream,
                            acknowledged,
                        },
                        Some(Ok(Inbound::Closed(frame))) => {
                            log::debug!("Socket closed by server with code {}: {}", frame.code, frame.reason);
                            let fatal = frame.code.disposition() == Disposition::Fatal;
                            let error = ConnectionError::Closed { code: frame.code, reason: frame.reason };
                            return if fatal {
                                Outcome::Fatal(error)
                            } else {
                                Outcome::Lost { error, acknowledged }
                            };
                        }
                        Some(Ok(Inbound::Message(message))) => message,
                        Some(Err(MessageStreamSinkError::Transport { source })) => return Outcome::Lost {
                            error: ConnectionError::Receive { source },
                            acknowledged,
                        },
                        Some(Err(MessageStreamSinkError::ParseMessageFailed { source })) => {
                            keep_alive.traffic();

                            let id = source.id().map(ToString::to_string);
                            match id {
                                Some(id) if acknowledged => {
                                    log::warn!("Undecodable message for subscription {}: {}", id, source);
                                    let error = SubscribeError::Decode { source };
                                    if !self.shared.fail_subscription(self.epoch, &id, error, true) {
                                        return Outcome::Stopped;
                                    }
                                    continue;
                                }
                                _ => {
                                    close(&mut sink, CloseCode::BAD_RESPONSE, "Bad response").await;
                                    return Outcome::Fatal(ConnectionError::BadResponse { source });
                                }
                            }
                        }
                        Some(Err(err)) => {
                            log::warn!("Unexpected error from message stream: {}", err);
                            continue;
                        }
                    };

                    keep_alive.traffic();
                    log::trace!("Received {} message", message.type_name());

                    match message {
                        Message::ConnectionAck { payload } => {
                            if acknowledged {
                                log::debug!("Ignore duplicate connection_ack");
                                continue;
                            }

                            acknowledged = true;
                            if !self.shared.acknowledge(self.epoch, out_tx.clone(), payload) {
                                return Outcome::Stopped;
                            }
                        }
                        Message::Ping { payload } => {
                            if let Err(source) = sink.send(Message::Pong { payload }.into()).await {
                                return Outcome::Lost {
                                    error: ConnectionError::Send { type_name: "pong", source },
                                    acknowledged,
                                };
                            }
                        }
                        Message::Pong { .. } => {}
                        message @ (Message::Next { .. } | Message::Error { .. } | Message::Complete { .. }) if acknowledged => {
                            if !self.shared.dispatch(self.epoch, message) {
                                return Outcome::Stopped;
                            }
                        }
                        message => {
                            let type_name = message.type_name();
                            log::warn!("Server sent unexpected {} message", type_name);
                            close(&mut sink, CloseCode::BAD_RESPONSE, "Bad response").await;
                            return Outcome::Fatal(ConnectionError::UnexpectedMessage { type_name });
                        }
                    }
                }
            }
        }
    }

    /// Send a message queued by the session, failures end only the subscription it belongs to
    async fn send_outgoing(&self, sink: &mut SocketSink, message: Message) {
        let id = message.id().map(ToString::to_string);
        let type_name = message.type_name();

        let error = match sink.send(message.into()).await {
            Ok(()) => return,
            Err(MessageStreamSinkError::EncodeMessageFailed { source }) => {
                SubscribeError::Encode { source }
            }
            Err(MessageStreamSinkError::Transport { source }) => SubscribeError::Send { source },
            Err(err) => {
                log::warn!("Send {} message failed: {}", type_name, err);
                return;
            }
        };

        match id {
            Some(id) => {
                self.shared.fail_subscription(self.epoch, &id, error, false);
            }
            None => log::warn!("Send {} message failed: {}", type_name, error),
        }
    }
}

async fn close(sink: &mut SocketSink, code: CloseCode, reason: &str) {
    log::debug!("Close socket with code {}: {}", code, reason);

    if let Err(err) = sink.send(Outbound::Close(CloseFrame::new(code, reason))).await {
        log::debug!("Send close frame failed: {}", err);
    }
}
