//! Error types surfaced to host code.
//!
//! Engine failures (syntax errors, thrown exceptions, termination) and
//! host-side misuse both end up as [`Error`]; nothing is retried or
//! silently coerced.

#![warn(clippy::all, rust_2018_idioms)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::Bridge;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(JsError),

    #[error("uncaught exception: {0}")]
    Exception(#[source] JsError),

    #[error("execution terminated")]
    Terminated,

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("object belongs to a different context")]
    ForeignObject,

    #[error("'{0}' is not a function")]
    NotAFunction(String),

    #[error("V8 error: {0}")]
    Engine(String),

    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The engine's description of the exception, if this error carries one.
    pub fn js_error(&self) -> Option<&JsError> {
        match self {
            Error::Compile(e) | Error::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// The host error behind this exception, when JavaScript was unwinding
    /// an error raised by a host callable or host object.
    pub fn host_cause(&self) -> Option<&anyhow::Error> {
        self.js_error()?.cause.as_deref()
    }
}

/// A JavaScript exception as reported by the engine.
#[derive(Debug, Clone)]
pub struct JsError {
    /// The exception converted to a string, e.g. `SyntaxError: Unexpected token ';'`
    pub message: String,

    /// Resource name of the script the exception originated in
    pub resource: Option<String>,

    /// One-based line number
    pub line: Option<usize>,

    /// Original host error, if the exception was thrown on behalf of one
    pub cause: Option<Arc<anyhow::Error>>,
}

impl PartialEq for JsError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.resource == other.resource
            && self.line == other.line
            && match (&self.cause, &other.cause) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for JsError {}

impl std::error::Error for JsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let cause: &(dyn std::error::Error + Send + Sync + 'static) = self.cause.as_deref()?.as_ref();
        Some(cause)
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match (&self.resource, self.line) {
            (Some(resource), Some(line)) => write!(f, " (at {}:{})", resource, line),
            (Some(resource), None) => write!(f, " (at {})", resource),
            _ => Ok(()),
        }
    }
}

/// Where in an operation an exception was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Compile,
    Run,
}

/// Turn what a `TryCatch` observed into an [`Error`].
pub(crate) fn caught_error(
    scope: &mut v8::PinScope<'_, '_>,
    bridge: &Bridge,
    exception: Option<v8::Local<'_, v8::Value>>,
    message: Option<v8::Local<'_, v8::Message>>,
    terminated: bool,
    phase: Phase,
) -> Error {
    if terminated {
        return Error::Terminated;
    }

    let Some(exception) = exception else {
        return Error::Engine("operation failed without an exception".to_string());
    };

    let cause = bridge.host_error(scope, exception);
    let text = exception.to_rust_string_lossy(scope);
    let (resource, line) = match message {
        Some(message) => (
            message
                .get_script_resource_name(scope)
                .filter(|name| name.is_string())
                .map(|name| name.to_rust_string_lossy(scope)),
            message.get_line_number(scope),
        ),
        None => (None, None),
    };

    let error = JsError {
        message: text,
        resource,
        line,
        cause,
    };

    match phase {
        Phase::Compile => Error::Compile(error),
        Phase::Run => Error::Exception(error),
    }
}

/// Convert the state of a `TryCatch` scope into an [`Error`].
///
/// `$shared` is the context's `Shared`; its bridge resolves host errors
/// carried by the exception.
macro_rules! caught {
    ($tc:expr, $shared:expr, $phase:expr) => {{
        let terminated = $tc.has_terminated();
        let exception = $tc.exception();
        let message = $tc.message();
        $crate::error::caught_error($tc, &$shared.bridge, exception, message, terminated, $phase)
    }};
}

pub(crate) use caught;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_error_display_with_location() {
        let error = JsError {
            message: "SyntaxError: Unexpected token ';'".to_string(),
            resource: Some("app.js".to_string()),
            line: Some(3),
            cause: None,
        };
        assert_eq!(
            error.to_string(),
            "SyntaxError: Unexpected token ';' (at app.js:3)"
        );
    }

    #[test]
    fn test_js_error_display_without_location() {
        let error = JsError {
            message: "Error: boom".to_string(),
            resource: None,
            line: None,
            cause: None,
        };
        assert_eq!(error.to_string(), "Error: boom");
    }

    #[test]
    fn test_error_exposes_js_error() {
        let js = JsError {
            message: "Error: boom".to_string(),
            resource: None,
            line: Some(1),
            cause: None,
        };
        let error = Error::Exception(js.clone());
        assert_eq!(error.js_error(), Some(&js));
        assert!(Error::Terminated.js_error().is_none());
        assert_eq!(
            Error::Exception(js).to_string(),
            "uncaught exception: Error: boom"
        );
    }

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    #[test]
    fn test_host_cause_is_the_error_source() {
        let js = JsError {
            message: "Error: quota exceeded".to_string(),
            resource: None,
            line: None,
            cause: Some(Arc::new(anyhow::Error::new(QuotaExceeded))),
        };
        let error = Error::Exception(js.clone());

        let cause = error.host_cause().expect("cause should be kept");
        assert!(cause.downcast_ref::<QuotaExceeded>().is_some());

        let source = std::error::Error::source(&error).expect("JsError is the source");
        let root = source.source().expect("host error is the source of JsError");
        assert_eq!(root.to_string(), "quota exceeded");

        assert_eq!(js.clone(), js);
        assert_ne!(
            JsError { cause: None, ..js.clone() },
            js,
        );
    }
}
