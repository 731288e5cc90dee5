use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Loosely typed key-value payload, carried by `connection_init`, `connection_ack`, `ping` and
/// `pong` messages, and by GraphQL `extensions`
pub type Payload = Map<String, Value>;

/// Payload of a `subscribe` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// serialized GraphQL operation document
    pub query: String,
    /// name of the operation to execute, required when the document holds more than one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// operation variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Payload>,
    /// protocol extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Payload>,
}

impl SubscribePayload {
    /// Payload with only the query document
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
            extensions: None,
        }
    }

    /// Set operation name
    pub fn operation_name<S: Into<String>>(mut self, name: S) -> Self {
        self.operation_name.replace(name.into());
        self
    }

    /// Set operation variables
    pub fn variables(mut self, variables: Payload) -> Self {
        self.variables.replace(variables);
        self
    }

    /// Set extensions
    pub fn extensions(mut self, extensions: Payload) -> Self {
        self.extensions.replace(extensions);
        self
    }
}

/// Payload of a `next` message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// result data, null when execution failed before producing any
    #[serde(default)]
    pub data: Value,
    /// field errors raised during execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
    /// server extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Payload>,
}

/// A GraphQL error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// error description
    pub message: String,
    /// positions in the operation document the error relates to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    /// response path of the field that errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// server defined error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Payload>,
}

impl Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Position in an operation document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-indexed line
    pub line: u64,
    /// 1-indexed column
    pub column: u64,
}

/// One step of a response path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// object field name
    Field(String),
    /// list index
    Index(u64),
}
