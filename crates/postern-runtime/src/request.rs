//! Per-request state handed to a dispatch thunk.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// The parts of an incoming request that bindings read from.
///
/// The serving runtime fills this in after routing and schema validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    /// Dynamic url segments by name.
    pub params: BTreeMap<String, String>,
    /// Parsed query string.
    pub query: Map<String, Value>,
    /// Keyed by lowercased header name.
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// The response side of a request.
///
/// Once sent, the thunk stops before the next step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    sent: bool,
    status: u16,
    payload: Option<Value>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the request.
    pub fn send(&mut self, status: u16, payload: Value) {
        self.sent = true;
        self.status = status;
        self.payload = Some(payload);
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}

/// Static facts about the route being served; what a `This` parameter
/// receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteContext {
    pub method: String,
    pub url: String,
    pub operation_id: String,
    pub config: BTreeMap<String, Value>,
}

/// One handler argument, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Extracted or resolved data; `Null` for an absent optional value.
    Value(Value),
    Request,
    Reply,
    Connection,
    Socket,
    Context,
}

impl Argument {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Value(value) => Some(value),
            _ => None,
        }
    }
}
