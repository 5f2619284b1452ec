//! Connection descriptors and the span attributes derived from them.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::Span;

pub const DB_SYSTEM: &str = "db.system";
pub const DB_NAMESPACE: &str = "db.namespace";
pub const DB_USER: &str = "db.user";
pub const DB_QUERY_TEXT: &str = "db.query.text";
pub const SERVER_ADDRESS: &str = "server.address";
pub const SERVER_PORT: &str = "server.port";

// Candidate descriptor fields, in priority order.
const NAMESPACE_FIELDS: &[&str] = &["filename", "db", "database"];
const ADDRESS_FIELDS: &[&str] = &["host", "server", "unixSocket", "socketPath"];
const PORT_FIELDS: &[&str] = &["port"];
const USER_FIELDS: &[&str] = &["user"];

/// A single value in a [`ConnectionDescriptor`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConnectionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConnectionValue>),
    Map(BTreeMap<String, ConnectionValue>),
}

impl ConnectionValue {
    /// Returns the value as a span attribute if it is a scalar.
    pub fn as_scalar(&self) -> Option<AttributeValue> {
        match self {
            ConnectionValue::Bool(b) => Some(AttributeValue::Bool(*b)),
            ConnectionValue::Int(i) => Some(AttributeValue::I64(*i)),
            ConnectionValue::Float(f) => Some(AttributeValue::F64(*f)),
            ConnectionValue::String(s) => Some(AttributeValue::String(s.clone())),
            ConnectionValue::Null | ConnectionValue::List(_) | ConnectionValue::Map(_) => None,
        }
    }
}

impl From<&str> for ConnectionValue {
    fn from(value: &str) -> Self {
        ConnectionValue::String(value.to_string())
    }
}

impl From<String> for ConnectionValue {
    fn from(value: String) -> Self {
        ConnectionValue::String(value)
    }
}

impl From<bool> for ConnectionValue {
    fn from(value: bool) -> Self {
        ConnectionValue::Bool(value)
    }
}

impl From<i64> for ConnectionValue {
    fn from(value: i64) -> Self {
        ConnectionValue::Int(value)
    }
}

impl From<u16> for ConnectionValue {
    fn from(value: u16) -> Self {
        ConnectionValue::Int(i64::from(value))
    }
}

impl From<f64> for ConnectionValue {
    fn from(value: f64) -> Self {
        ConnectionValue::Float(value)
    }
}

/// Describes how a client reaches its data store.
///
/// This is a free-form key/value bag in the shape most drivers accept
/// (`filename`, `host`, `port`, `user`, ...). It can be built in code or
/// deserialized from configuration:
///
/// ```rust
/// use sql_query_tracing::ConnectionDescriptor;
///
/// let descriptor = ConnectionDescriptor::new()
///     .with("host", "db.internal")
///     .with("port", 5432_i64);
///
/// assert!(descriptor.get("host").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConnectionDescriptor {
    fields: HashMap<String, ConnectionValue>,
}

impl ConnectionDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConnectionValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConnectionValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First scalar value among `keys`, in order.
    fn find_scalar(&self, keys: &[&str]) -> Option<AttributeValue> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(ConnectionValue::as_scalar)
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectionDescriptor
where
    K: Into<String>,
    V: Into<ConnectionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Scalar span attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Record this value on a span field declared under `key`.
    pub(crate) fn record(&self, span: &Span, key: &str) {
        match self {
            AttributeValue::String(s) => span.record(key, s.as_str()),
            AttributeValue::I64(i) => span.record(key, *i),
            AttributeValue::F64(f) => span.record(key, *f),
            AttributeValue::Bool(b) => span.record(key, *b),
        };
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::I64(i) => write!(f, "{i}"),
            AttributeValue::F64(v) => write!(f, "{v}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Canonical attributes extracted from a [`ConnectionDescriptor`].
///
/// Only attributes with a scalar source field are present; a missing field
/// is never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionAttributes {
    attributes: Vec<(&'static str, AttributeValue)>,
}

impl ConnectionAttributes {
    /// Extract `db.namespace`, `server.address` and `server.port`.
    pub fn extract(connection: &ConnectionDescriptor) -> Self {
        let attributes = [
            (DB_NAMESPACE, NAMESPACE_FIELDS),
            (SERVER_ADDRESS, ADDRESS_FIELDS),
            (SERVER_PORT, PORT_FIELDS),
        ]
        .into_iter()
        .filter_map(|(key, fields)| connection.find_scalar(fields).map(|value| (key, value)))
        .collect();

        Self { attributes }
    }

    /// Add `db.user` when the descriptor carries one.
    pub fn with_user(mut self, connection: &ConnectionDescriptor) -> Self {
        if let Some(user) = extract_user(connection) {
            self.attributes.push((DB_USER, user));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &AttributeValue)> + '_ {
        self.attributes.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub(crate) fn record(&self, span: &Span) {
        for (key, value) in &self.attributes {
            value.record(span, key);
        }
    }
}

/// The connection user, if the descriptor has a scalar `user` field.
pub fn extract_user(connection: &ConnectionDescriptor) -> Option<AttributeValue> {
    connection.find_scalar(USER_FIELDS)
}
