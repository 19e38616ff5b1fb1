//! Incoming JSON-RPC envelope: parsing and one-time validation.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

/// The only protocol version accepted and emitted.
pub const JSONRPC_VERSION: &str = "2.0";

/// Methods a client may call.
///
/// Membership here only makes a request valid; whether a method has a
/// handler is decided by the [`crate::Controller`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Method {
    Info,
    Start,
    Stop,
    /// Alias of [`Method::Info`].
    Status,
    ActivityInsert,
    ActivityRemove,
    ActivitySelect,
    ActivityUpdate,
    ProjectInsert,
    ProjectRemove,
    ProjectSelect,
    ProjectUpdate,
}

impl Method {
    /// The allow-list, in declaration order.
    pub const ALL: [Method; 12] = [
        Method::Info,
        Method::Start,
        Method::Stop,
        Method::Status,
        Method::ActivityInsert,
        Method::ActivityRemove,
        Method::ActivitySelect,
        Method::ActivityUpdate,
        Method::ProjectInsert,
        Method::ProjectRemove,
        Method::ProjectSelect,
        Method::ProjectUpdate,
    ];

    /// Wire name of the method.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Status => "Status",
            Self::ActivityInsert => "ActivityInsert",
            Self::ActivityRemove => "ActivityRemove",
            Self::ActivitySelect => "ActivitySelect",
            Self::ActivityUpdate => "ActivityUpdate",
            Self::ProjectInsert => "ProjectInsert",
            Self::ProjectRemove => "ProjectRemove",
            Self::ProjectSelect => "ProjectSelect",
            Self::ProjectUpdate => "ProjectUpdate",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown method: {s}"))
    }
}

/// Why a request was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Body is not a JSON object.
    Malformed,
    /// `jsonrpc` is present but not `"2.0"`.
    ProtocolVersion(String),
    /// `method` is missing or not in [`Method::ALL`].
    UnknownMethod(Option<String>),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "request body is not a JSON object"),
            Self::ProtocolVersion(v) => write!(f, "invalid protocol version {v}"),
            Self::UnknownMethod(Some(m)) => write!(f, "unknown method {m}"),
            Self::UnknownMethod(None) => write!(f, "missing method"),
        }
    }
}

/// A parsed request. Validity is computed once, at construction.
#[derive(Clone, Debug)]
pub struct Request {
    method: Option<Method>,
    params: Value,
    id: Option<Value>,
    violation: Option<Violation>,
}

impl Request {
    /// Parse a raw body. Anything that is not a JSON object is invalid
    /// and carries no other fields.
    pub fn from_slice(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(envelope)) => Self::from_envelope(envelope),
            _ => Self {
                method: None,
                params: Value::Null,
                id: None,
                violation: Some(Violation::Malformed),
            },
        }
    }

    fn from_envelope(mut envelope: Map<String, Value>) -> Self {
        let params = envelope.remove("params").unwrap_or(Value::Null);
        let id = envelope.remove("id").filter(|id| !id.is_null());

        let version_ok = match envelope.get("jsonrpc") {
            None => true,
            Some(v) => v.as_str() == Some(JSONRPC_VERSION),
        };

        let method_name = envelope.get("method").map(|m| match m {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let method = method_name.as_deref().and_then(|m| m.parse::<Method>().ok());

        let violation = if !version_ok {
            let raw = envelope.get("jsonrpc").map(Value::to_string).unwrap_or_default();
            Some(Violation::ProtocolVersion(raw))
        } else if method.is_none() {
            Some(Violation::UnknownMethod(method_name))
        } else {
            None
        };

        Self {
            method,
            params,
            id,
            violation,
        }
    }

    /// Validation result computed at construction.
    pub fn is_valid(&self) -> bool {
        self.violation.is_none()
    }

    /// Why the request is invalid, if it is.
    pub fn violation(&self) -> Option<&Violation> {
        self.violation.as_ref()
    }

    /// The allow-listed method, if the `method` field named one.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// Raw `params`; `Null` when absent.
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Client identifier to echo back; `None` when absent or null.
    pub fn identifier(&self) -> Option<&Value> {
        self.id.as_ref()
    }
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Extract an optional integer param. Finite floats are truncated toward
/// zero and numeric strings are accepted.
#[allow(clippy::cast_possible_truncation)]
pub fn optional_i64(params: &Value, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
