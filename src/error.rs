//! Error types and the driver error classification used for exception events.

use thiserror::Error;

/// An error produced by a wrapped client.
///
/// Instrumentation never changes these errors; it only reads them to build
/// the `exception` event of a failed query span.
pub trait DriverError: std::error::Error {
    /// Vendor or driver error code, e.g. `SQLITE_ERROR`.
    fn code(&self) -> Option<String> {
        None
    }

    /// Name of the error type, used when there is no code.
    fn type_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Value recorded as `exception.type`.
    fn exception_type(&self) -> String {
        self.code().unwrap_or_else(|| self.type_name())
    }
}

/// `a::b::Error<c::D>` -> `Error`
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Reasons a client cannot be instrumented.
///
/// Activation failures never reach the host application as errors: the
/// client is still installed, just without instrumentation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("driver `{0}` is not supported")]
    UnsupportedDriver(String),

    #[error("driver `{driver}` version {version} is not supported")]
    UnsupportedVersion { driver: String, version: String },
}
