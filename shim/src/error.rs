//! Error types surfaced by the runtime and the diagnostics posted for failed invocations.

use crate::types::Diagnostic;
use std::{
    any::{type_name, Any},
    error::Error as StdError,
    fmt,
    time::Duration,
};

/// Failure to read the platform-supplied environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set but its value cannot be used.
    Invalid {
        /// Name of the offending variable.
        name: &'static str,
        /// Value found in the environment.
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "missing environment variable {}", name),
            ConfigError::Invalid { name, value } => {
                write!(f, "invalid value {:?} for environment variable {}", value, name)
            }
        }
    }
}

impl StdError for ConfigError {}

/// Failure to build a [`Context`](crate::Context) from the headers of an incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A required header was absent.
    MissingHeader(&'static str),
    /// A header was present but malformed.
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::MissingHeader(name) => write!(f, "missing header {}", name),
            ContextError::InvalidHeader { name, reason } => write!(f, "invalid header {}: {}", name, reason),
        }
    }
}

impl StdError for ContextError {}

/// Returned by [`Context::ensure_remaining`](crate::Context::ensure_remaining) when the
/// invocation is about to run out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded {
    remaining: Duration,
    required: Duration,
}

impl DeadlineExceeded {
    pub(crate) fn new(remaining: Duration, required: Duration) -> Self {
        DeadlineExceeded { remaining, required }
    }

    /// Time left when the check was made.
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Time the caller asked for.
    pub fn required(&self) -> Duration {
        self.required
    }
}

impl fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ms remaining in the invocation, {}ms required",
            self.remaining.as_millis(),
            self.required.as_millis()
        )
    }
}

impl StdError for DeadlineExceeded {}

/// A handler failure carrying an explicit error type name.
///
/// The platform reports failures as an `errorType`/`errorMessage` pair. Returning a
/// `Fault` (directly or boxed in [`Error`](crate::Error)) controls the `errorType`
/// the caller sees; any other error reports its Rust type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: String,
    message: String,
}

impl Fault {
    /// Creates a fault of the given kind.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The reported error type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The reported error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Fault {}

impl From<Diagnostic> for Fault {
    fn from(diagnostic: Diagnostic) -> Self {
        Fault {
            kind: diagnostic.error_type,
            message: diagnostic.error_message,
        }
    }
}

pub(crate) const DESERIALIZATION_ERROR: &str = "Runtime.DeserializationError";
pub(crate) const SERIALIZATION_ERROR: &str = "Runtime.SerializationError";
pub(crate) const CONTEXT_ERROR: &str = "Runtime.ContextError";
pub(crate) const PANIC: &str = "Runtime.Panic";
pub(crate) const INIT_ERROR: &str = "Runtime.InitError";
const HANDLER_ERROR: &str = "HandlerError";

/// Builds the diagnostic reported for a handler error.
///
/// Boxed errors lose their concrete type, so the runtime looks inside them for the
/// error types it knows about before falling back to a generic name.
pub(crate) fn diagnostic<E>(err: &E) -> Diagnostic
where
    E: fmt::Display + 'static,
{
    let any = err as &dyn Any;
    let error_type = if let Some(boxed) = any.downcast_ref::<crate::Error>() {
        known_type(boxed.as_ref()).unwrap_or_else(|| HANDLER_ERROR.to_owned())
    } else if let Some(fault) = any.downcast_ref::<Fault>() {
        fault.kind.clone()
    } else {
        type_name::<E>().to_owned()
    };
    Diagnostic {
        error_type,
        error_message: err.to_string(),
    }
}

fn known_type(err: &(dyn StdError + Send + Sync + 'static)) -> Option<String> {
    if let Some(fault) = err.downcast_ref::<Fault>() {
        return Some(fault.kind.clone());
    }
    if err.is::<DeadlineExceeded>() {
        return Some(type_name::<DeadlineExceeded>().to_owned());
    }
    if err.is::<serde_json::Error>() {
        return Some(type_name::<serde_json::Error>().to_owned());
    }
    None
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_error::SimpleError;

    #[test]
    fn concrete_errors_report_their_type_name() {
        let diag = diagnostic(&SimpleError::new("boom"));
        assert_eq!(diag.error_type, "simple_error::SimpleError");
        assert_eq!(diag.error_message, "boom");
    }

    #[test]
    fn faults_report_their_kind() {
        let diag = diagnostic(&Fault::new("UpstreamUnavailable", "no answer"));
        assert_eq!(diag.error_type, "UpstreamUnavailable");
        assert_eq!(diag.error_message, "no answer");
    }

    #[test]
    fn boxed_faults_keep_their_kind() {
        let err: crate::Error = Fault::new("UpstreamUnavailable", "no answer").into();
        let diag = diagnostic(&err);
        assert_eq!(diag.error_type, "UpstreamUnavailable");
        assert_eq!(diag.error_message, "no answer");
    }

    #[test]
    fn boxed_unknown_errors_use_generic_type() {
        let err: crate::Error = "plain string".into();
        let diag = diagnostic(&err);
        assert_eq!(diag.error_type, "HandlerError");
        assert_eq!(diag.error_message, "plain string");
    }

    #[test]
    fn boxed_deadline_is_recognized() {
        let err: crate::Error = DeadlineExceeded::new(Duration::from_millis(3), Duration::from_millis(50)).into();
        let diag = diagnostic(&err);
        assert!(diag.error_type.ends_with("DeadlineExceeded"));
        assert_eq!(diag.error_message, "3ms remaining in the invocation, 50ms required");
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "handler panicked");
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::Missing("AWS_LAMBDA_RUNTIME_API").to_string(),
            "missing environment variable AWS_LAMBDA_RUNTIME_API"
        );
        assert_eq!(
            ConfigError::Invalid {
                name: "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
                value: "lots".into()
            }
            .to_string(),
            "invalid value \"lots\" for environment variable AWS_LAMBDA_FUNCTION_MEMORY_SIZE"
        );
    }
}
