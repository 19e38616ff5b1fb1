//! Outgoing JSON-RPC envelope.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::RpcError;
use crate::request::JSONRPC_VERSION;

#[derive(Clone, Debug, PartialEq)]
enum Outcome {
    Result(Value),
    Error(RpcError),
}

/// Response to a single request.
///
/// Holds at most one of result or error; setting one replaces the other,
/// so the serialized form never carries both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    id: Option<Value>,
    outcome: Option<Outcome>,
}

impl Response {
    /// Empty response echoing `id`. A null id counts as absent.
    pub fn new(id: Option<Value>) -> Self {
        Self {
            id: id.filter(|id| !id.is_null()),
            outcome: None,
        }
    }

    /// Set the result, replacing any error.
    pub fn set_result(&mut self, result: Value) {
        self.outcome = Some(Outcome::Result(result));
    }

    /// Set the error, replacing any result.
    pub fn set_error(&mut self, error: RpcError) {
        self.outcome = Some(Outcome::Error(error));
    }

    /// Echoed identifier.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Result payload, if one was set.
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Some(Outcome::Result(v)) => Some(v),
            _ => None,
        }
    }

    /// Error, if one was set.
    pub fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Some(Outcome::Error(e)) => Some(e),
            _ => None,
        }
    }

    /// True when the response carries an error.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Error(_)))
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.id.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        match &self.outcome {
            Some(Outcome::Error(err)) => map.serialize_entry("error", err)?,
            Some(Outcome::Result(v)) => map.serialize_entry("result", v)?,
            None => map.serialize_entry("result", &Value::Null)?,
        }
        map.end()
    }
}
