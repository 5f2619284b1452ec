//! Query descriptors: statement text, bindings and operation name.

use std::fmt;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // nulls render as nothing between separators
            Binding::Null => Ok(()),
            Binding::Bool(b) => write!(f, "{b}"),
            Binding::Int(i) => write!(f, "{i}"),
            Binding::Float(v) => write!(f, "{v}"),
            Binding::Text(s) => f.write_str(s),
            Binding::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<bool> for Binding {
    fn from(value: bool) -> Self {
        Binding::Bool(value)
    }
}

impl From<i32> for Binding {
    fn from(value: i32) -> Self {
        Binding::Int(i64::from(value))
    }
}

impl From<i64> for Binding {
    fn from(value: i64) -> Self {
        Binding::Int(value)
    }
}

impl From<u32> for Binding {
    fn from(value: u32) -> Self {
        Binding::Int(i64::from(value))
    }
}

impl From<f64> for Binding {
    fn from(value: f64) -> Self {
        Binding::Float(value)
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Binding::Text(value.to_string())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Binding::Text(value)
    }
}

impl From<Vec<u8>> for Binding {
    fn from(value: Vec<u8>) -> Self {
        Binding::Bytes(value)
    }
}

impl<T: Into<Binding>> From<Option<T>> for Binding {
    fn from(value: Option<T>) -> Self {
        value.map_or(Binding::Null, Into::into)
    }
}

/// A statement ready to be sent to the backing store.
///
/// The statement text is opaque; it is never parsed. `method` is the
/// operation name a query builder knows about (e.g. `"select"`) and is
/// preferred as the span name.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    bindings: Vec<Binding>,
    method: Option<String>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
            method: None,
        }
    }

    /// Replace the bindings.
    pub fn with_bindings<I, B>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Binding>,
    {
        self.bindings = bindings.into_iter().map(Into::into).collect();
        self
    }

    /// Set the operation name used for the span.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The operation name if known, otherwise the statement text.
    pub fn span_name(&self) -> &str {
        self.method.as_deref().unwrap_or(&self.sql)
    }

    /// Statement text with bindings appended as `"\nwith [a,b]"`.
    ///
    /// Without bindings this is exactly the statement text.
    pub fn statement_text(&self) -> String {
        if self.bindings.is_empty() {
            return self.sql.clone();
        }

        let bindings = self
            .bindings
            .iter()
            .map(Binding::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}\nwith [{}]", self.sql, bindings)
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}
