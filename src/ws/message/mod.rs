//! graphql-transport-ws message types.

mod stream;
mod types;

pub use stream::{Inbound, MessageStream, MessageStreamSinkError, Outbound};
pub use types::{ExecutionResult, GraphQLError, Location, PathSegment, Payload, SubscribePayload};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Error when parse frame data as message
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)), module(error), context(suffix(false)))]
pub enum ParseMessageError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed message is not object: {json}"))]
    MessageNotObject {
        /// json string
        json: String,
    },

    /// data json has no type field
    #[snafu(display("message has no type field: {json}"))]
    NoMessageType {
        /// json string
        json: String,
    },

    /// data json type field is not string
    #[snafu(display("message has non-string type field: {json}"))]
    MessageTypeNotString {
        /// json string
        json: String,
    },

    /// data json has an unknown type
    #[snafu(display("message has unknown type {type_name}"))]
    UnknownMessageType {
        /// received type
        type_name: String,
    },

    /// subscription scoped message has no id
    #[snafu(display("{type_name} message has no id"))]
    MissingId {
        /// message type
        type_name: &'static str,
    },

    /// subscription scoped message has an empty id
    #[snafu(display("{type_name} message has empty id"))]
    EmptyId {
        /// message type
        type_name: &'static str,
    },

    /// data json is not valid typed message
    #[snafu(display("parse to {type_name} message failed: {source}"))]
    ParseJSONToTypedMessageFailed {
        /// message type
        type_name: &'static str,
        /// id carried by the message, if it could be read
        id: Option<String>,
        /// source error
        source: serde_json::Error,
    },
}

impl ParseMessageError {
    /// The subscription id this undecodable message was addressed to, if it could be read.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::ParseJSONToTypedMessageFailed { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

/// Error when encode message to frame data
#[derive(Debug, Snafu)]
#[snafu(display("encode {type_name} message failed: {source}"))]
pub struct EncodeMessageError {
    /// message type
    pub type_name: &'static str,
    /// source error
    pub source: serde_json::Error,
}

static MESSAGE_TYPE_TAG: &str = "type";

/// graphql-transport-ws protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// ConnectionInit, client -> server
    ConnectionInit {
        /// connection params
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    /// ConnectionAck, server -> client
    ConnectionAck {
        /// server defined data
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    /// Ping, bidirectional
    Ping {
        /// sender defined data
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    /// Pong, bidirectional
    Pong {
        /// sender defined data
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    /// Subscribe, client -> server
    Subscribe {
        /// subscription id
        id: String,
        /// operation to execute
        payload: SubscribePayload,
    },
    /// Next, server -> client
    Next {
        /// subscription id
        id: String,
        /// execution result
        payload: ExecutionResult,
    },
    /// Error, server -> client
    Error {
        /// subscription id
        id: String,
        /// operation errors
        payload: Vec<GraphQLError>,
    },
    /// Complete, bidirectional
    Complete {
        /// subscription id
        id: String,
    },
}

impl Message {
    /// Decode frame data to a message
    pub fn decode(buff: &[u8]) -> Result<Self, ParseMessageError> {
        let value: serde_json::Value =
            serde_json::from_slice(buff).context(error::ParseJSONFailed)?;

        let obj = value.as_object().with_context(|| error::MessageNotObject {
            json: String::from_utf8_lossy(buff),
        })?;

        let t = obj
            .get(MESSAGE_TYPE_TAG)
            .with_context(|| error::NoMessageType {
                json: String::from_utf8_lossy(buff),
            })?
            .as_str()
            .with_context(|| error::MessageTypeNotString {
                json: String::from_utf8_lossy(buff),
            })?;

        let type_name = Self::known_type_name(t)
            .with_context(|| error::UnknownMessageType { type_name: t })?;

        let id = obj
            .get("id")
            .and_then(|id| id.as_str())
            .map(ToString::to_string);

        if Self::is_subscription_scoped(type_name) {
            let id = id
                .as_deref()
                .with_context(|| error::MissingId { type_name })?;
            ensure!(!id.is_empty(), error::EmptyId { type_name });
        }

        serde_json::from_value(value)
            .with_context(|_| error::ParseJSONToTypedMessageFailed { type_name, id })
    }

    /// Encode message to json text
    pub fn encode(&self) -> Result<String, EncodeMessageError> {
        serde_json::to_string(self).map_err(|source| EncodeMessageError {
            type_name: self.type_name(),
            source,
        })
    }

    fn known_type_name(t: &str) -> Option<&'static str> {
        match t {
            "connection_init" => Some("connection_init"),
            "connection_ack" => Some("connection_ack"),
            "ping" => Some("ping"),
            "pong" => Some("pong"),
            "subscribe" => Some("subscribe"),
            "next" => Some("next"),
            "error" => Some("error"),
            "complete" => Some("complete"),
            _ => None,
        }
    }

    fn is_subscription_scoped(type_name: &str) -> bool {
        matches!(type_name, "subscribe" | "next" | "error" | "complete")
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ConnectionInit { .. } => "connection_init",
            Self::ConnectionAck { .. } => "connection_ack",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Subscribe { .. } => "subscribe",
            Self::Next { .. } => "next",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }

    /// get subscription id, session scoped messages have none
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Subscribe { id, .. }
            | Self::Next { id, .. }
            | Self::Error { id, .. }
            | Self::Complete { id } => Some(id),
            _ => None,
        }
    }

    pub(crate) fn subscribe(id: &str, payload: SubscribePayload) -> Self {
        Self::Subscribe {
            id: id.to_string(),
            payload,
        }
    }

    pub(crate) fn complete(id: &str) -> Self {
        Self::Complete { id: id.to_string() }
    }
}

#[cfg(test)]
mod test {
    mod decode {
        use super::super::*;
        use serde_json::json;

        fn decode(value: serde_json::Value) -> Result<Message, ParseMessageError> {
            Message::decode(&serde_json::to_vec(&value).unwrap())
        }

        #[test]
        fn test_message_decode_connection_ack() {
            let msg = decode(json!({
                "type": "connection_ack",
                "payload": { "server": "test" },
            }))
            .unwrap();

            if let Message::ConnectionAck { payload } = msg {
                assert_eq!(payload.unwrap()["server"], "test");
            } else {
                panic!("decoded message is not connection_ack")
            }
        }

        #[test]
        fn test_message_decode_pong_without_payload() {
            let msg = decode(json!({ "type": "pong" })).unwrap();
            assert_eq!(msg, Message::Pong { payload: None });
        }

        #[test]
        fn test_message_decode_null_payload() {
            let msg = decode(json!({ "type": "ping", "payload": null })).unwrap();
            assert_eq!(msg, Message::Ping { payload: None });
        }

        #[test]
        fn test_message_decode_next() {
            let msg = decode(json!({
                "type": "next",
                "id": "abc",
                "payload": { "data": { "count": 1 } },
            }))
            .unwrap();

            if let Message::Next { id, payload } = msg {
                assert_eq!(id, "abc");
                assert_eq!(payload.data, json!({ "count": 1 }));
                assert!(payload.errors.is_none());
            } else {
                panic!("decoded message is not next")
            }
        }

        #[test]
        fn test_message_decode_error() {
            let msg = decode(json!({
                "type": "error",
                "id": "abc",
                "payload": [{
                    "message": "boom",
                    "locations": [{ "line": 1, "column": 3 }],
                    "path": ["count", 0],
                }],
            }))
            .unwrap();

            if let Message::Error { id, payload } = msg {
                assert_eq!(id, "abc");
                assert_eq!(payload.len(), 1);
                assert_eq!(payload[0].message, "boom");
                assert_eq!(
                    payload[0].locations,
                    Some(vec![Location { line: 1, column: 3 }])
                );
                assert_eq!(
                    payload[0].path,
                    Some(vec![
                        PathSegment::Field("count".to_string()),
                        PathSegment::Index(0)
                    ])
                );
            } else {
                panic!("decoded message is not error")
            }
        }

        #[test]
        fn test_message_decode_unknown_type() {
            let err = decode(json!({ "type": "bogus" })).unwrap_err();
            assert!(
                matches!(err, ParseMessageError::UnknownMessageType { ref type_name } if type_name == "bogus")
            );
        }

        #[test]
        fn test_message_decode_no_type() {
            let err = decode(json!({ "id": "abc" })).unwrap_err();
            assert!(matches!(err, ParseMessageError::NoMessageType { .. }));
        }

        #[test]
        fn test_message_decode_not_object() {
            let err = decode(json!(["next"])).unwrap_err();
            assert!(matches!(err, ParseMessageError::MessageNotObject { .. }));
        }

        #[test]
        fn test_message_decode_invalid_json() {
            let err = Message::decode(b"{\"type\":").unwrap_err();
            assert!(matches!(err, ParseMessageError::ParseJSONFailed { .. }));
        }

        #[test]
        fn test_message_decode_missing_id() {
            let err = decode(json!({ "type": "complete" })).unwrap_err();
            assert!(matches!(
                err,
                ParseMessageError::MissingId {
                    type_name: "complete"
                }
            ));
        }

        #[test]
        fn test_message_decode_empty_id() {
            let err = decode(json!({ "type": "complete", "id": "" })).unwrap_err();
            assert!(matches!(err, ParseMessageError::EmptyId { .. }));
        }

        #[test]
        fn test_message_decode_bad_payload_keeps_id() {
            let err = decode(json!({
                "type": "next",
                "id": "abc",
                "payload": "not an object",
            }))
            .unwrap_err();

            assert!(matches!(
                err,
                ParseMessageError::ParseJSONToTypedMessageFailed { .. }
            ));
            assert_eq!(err.id(), Some("abc"));
        }
    }

    mod encode {
        use super::super::*;
        use serde_json::json;

        #[test]
        fn test_message_encode_type_first() {
            let msg = Message::subscribe(
                "abc",
                SubscribePayload::new("subscription { count }").operation_name("Count"),
            );

            let text = msg.encode().unwrap();

            assert!(text.starts_with(r#"{"type":"subscribe","id":"abc","payload":"#));
            assert_eq!(
                serde_json::from_str::<serde_json::Value>(&text).unwrap(),
                json!({
                    "type": "subscribe",
                    "id": "abc",
                    "payload": {
                        "query": "subscription { count }",
                        "operationName": "Count",
                    },
                })
            );
        }

        #[test]
        fn test_message_encode_omits_absent_payload() {
            let text = Message::ConnectionInit { payload: None }.encode().unwrap();
            assert_eq!(text, r#"{"type":"connection_init"}"#);

            let text = Message::complete("abc").encode().unwrap();
            assert_eq!(text, r#"{"type":"complete","id":"abc"}"#);
        }

        #[test]
        fn test_message_round_trip() {
            let mut params = Payload::new();
            params.insert("token".to_string(), json!("secret"));
            params.insert("nested".to_string(), json!({ "list": [1, 2.5, null, true] }));

            let messages = vec![
                Message::ConnectionInit {
                    payload: Some(params.clone()),
                },
                Message::ConnectionAck { payload: None },
                Message::Ping {
                    payload: Some(params.clone()),
                },
                Message::Pong { payload: None },
                Message::subscribe(
                    "1",
                    SubscribePayload::new("subscription { count }")
                        .variables(params.clone())
                        .extensions(params),
                ),
                Message::Next {
                    id: "1".to_string(),
                    payload: ExecutionResult {
                        data: json!({ "count": 1 }),
                        errors: None,
                        extensions: None,
                    },
                },
                Message::Error {
                    id: "1".to_string(),
                    payload: vec![GraphQLError {
                        message: "boom".to_string(),
                        locations: None,
                        path: None,
                        extensions: None,
                    }],
                },
                Message::complete("1"),
            ];

            for msg in messages {
                let text = msg.encode().unwrap();
                assert_eq!(Message::decode(text.as_bytes()).unwrap(), msg, "{}", text);
            }
        }
    }
}
