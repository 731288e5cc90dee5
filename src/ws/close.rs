//! Websocket close codes used by graphql-transport-ws, and how the client reacts to them.
//!
//! see <https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md>

use std::fmt::Display;

/// What the client should do after the socket closed with some code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Closed for a transient reason, reconnect using the retry policy
    Recoverable,
    /// Closed for a terminating reason, never reconnect
    Fatal,
    /// Not listed in the close code table, retry policy applies its own backoff
    Unknown,
}

/// Websocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// 1000, normal closure
    pub const NORMAL_CLOSURE: Self = Self(1000);
    /// 1001, endpoint going away
    pub const GOING_AWAY: Self = Self(1001);
    /// 1005, closed without a status code
    pub const NO_STATUS: Self = Self(1005);
    /// 1006, connection dropped without close frame
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    /// 1012, server is restarting
    pub const SERVICE_RESTART: Self = Self(1012);
    /// 1013, server asks to try again later
    pub const TRY_AGAIN_LATER: Self = Self(1013);

    /// 4005, client hit an internal error
    pub const INTERNAL_CLIENT_ERROR: Self = Self(4005);
    /// 4400, server received an invalid message
    pub const BAD_REQUEST: Self = Self(4400);
    /// 4401, subscribed before connection acknowledged
    pub const UNAUTHORIZED: Self = Self(4401);
    /// 4403, connection rejected by server
    pub const FORBIDDEN: Self = Self(4403);
    /// 4404, client received an invalid message
    pub const BAD_RESPONSE: Self = Self(4404);
    /// 4406, websocket sub-protocol not accepted
    pub const SUBPROTOCOL_NOT_ACCEPTABLE: Self = Self(4406);
    /// 4408, server did not receive `connection_init` in time
    pub const CONNECTION_INIT_TIMEOUT: Self = Self(4408);
    /// 4409, subscription id already in use
    pub const SUBSCRIBER_ALREADY_EXISTS: Self = Self(4409);
    /// 4429, more than one `connection_init` sent
    pub const TOO_MANY_INITIALISATION_REQUESTS: Self = Self(4429);
    /// 4500, server hit an internal error
    pub const INTERNAL_SERVER_ERROR: Self = Self(4500);
    /// 4504, client did not receive `connection_ack` in time
    pub const CONNECTION_ACK_TIMEOUT: Self = Self(4504);

    const RECOVERABLE: [Self; 6] = [
        Self::NORMAL_CLOSURE,
        Self::GOING_AWAY,
        Self::NO_STATUS,
        Self::ABNORMAL_CLOSURE,
        Self::SERVICE_RESTART,
        Self::TRY_AGAIN_LATER,
    ];

    const TERMINATING: [Self; 11] = [
        Self::INTERNAL_SERVER_ERROR,
        Self::INTERNAL_CLIENT_ERROR,
        Self::BAD_REQUEST,
        Self::BAD_RESPONSE,
        Self::UNAUTHORIZED,
        Self::FORBIDDEN,
        Self::SUBPROTOCOL_NOT_ACCEPTABLE,
        Self::CONNECTION_INIT_TIMEOUT,
        Self::CONNECTION_ACK_TIMEOUT,
        Self::SUBSCRIBER_ALREADY_EXISTS,
        Self::TOO_MANY_INITIALISATION_REQUESTS,
    ];

    /// Wrap a raw close code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw close code value
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Classify this code.
    ///
    /// Unlisted codes in the 1000..=1999 range are internal websocket errors and treated as fatal.
    pub fn disposition(self) -> Disposition {
        if Self::RECOVERABLE.contains(&self) {
            Disposition::Recoverable
        } else if Self::TERMINATING.contains(&self) || (1000..=1999).contains(&self.0) {
            Disposition::Fatal
        } else {
            Disposition::Unknown
        }
    }

    /// true if the client must not reconnect after this code
    pub fn is_fatal(self) -> bool {
        self.disposition() == Disposition::Fatal
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Classify a raw close code, see [`CloseCode::disposition`]
pub fn classify(code: u16) -> Disposition {
    CloseCode::new(code).disposition()
}
