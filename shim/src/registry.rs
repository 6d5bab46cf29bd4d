//! Selection of the packaged handler by its `<module>.<function>` target.
//!
//! A function crate registers every handler it ships under its target name; at cold
//! start the runtime picks the one the container was started with.

use crate::{
    error::{diagnostic, Fault, DESERIALIZATION_ERROR, SERIALIZATION_ERROR},
    Context, Error, Handler, HandlerTarget, TargetError,
};
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, error::Error as StdError, fmt};
use tracing::info;

type CallFn = dyn FnMut(Value, Context) -> BoxFuture<'static, Result<Value, Error>> + Send;

/// A type-erased handler working on raw JSON.
///
/// Decoding the event into the wrapped handler's event type and encoding its result
/// happen inside the box. Failures keep the error type the wrapped handler reported.
pub struct BoxHandler {
    call: Box<CallFn>,
}

impl BoxHandler {
    /// Erases the event, response and error types of `handler`.
    pub fn new<H, A, B>(mut handler: H) -> Self
    where
        H: Handler<A, B> + Send + 'static,
        H::Fut: Send + 'static,
        H::Error: fmt::Display + Send + 'static,
        A: DeserializeOwned,
        B: Serialize + Send + 'static,
    {
        let call = move |event: Value, ctx: Context| -> BoxFuture<'static, Result<Value, Error>> {
            let event: A = match serde_path_to_error::deserialize(event) {
                Ok(event) => event,
                Err(err) => {
                    let fault = Fault::new(DESERIALIZATION_ERROR, err.to_string());
                    return future::ready(Err(fault.into())).boxed();
                }
            };
            let fut = handler.call(event, ctx);
            async move {
                let result: Result<Value, Error> = match fut.await {
                    Ok(response) => serde_json::to_value(response)
                        .map_err(|err| Fault::new(SERIALIZATION_ERROR, err.to_string()).into()),
                    Err(err) => Err(Fault::from(diagnostic(&err)).into()),
                };
                result
            }
            .boxed()
        };
        BoxHandler { call: Box::new(call) }
    }
}

impl Handler<Value, Value> for BoxHandler {
    type Error = Error;
    type Fut = BoxFuture<'static, Result<Value, Error>>;

    fn call(&mut self, event: Value, context: Context) -> Self::Fut {
        (self.call)(event, context)
    }
}

impl fmt::Debug for BoxHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxHandler").finish()
    }
}

/// Handlers shipped by a function, keyed by target.
#[derive(Debug, Default)]
pub struct Registry {
    handlers: BTreeMap<HandlerTarget, BoxHandler>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `target`.
    pub fn register<H, A, B>(mut self, target: &str, handler: H) -> Result<Self, RegistryError>
    where
        H: Handler<A, B> + Send + 'static,
        H::Fut: Send + 'static,
        H::Error: fmt::Display + Send + 'static,
        A: DeserializeOwned,
        B: Serialize + Send + 'static,
    {
        let target: HandlerTarget = target.parse()?;
        if self.handlers.contains_key(&target) {
            return Err(RegistryError::Duplicate(target));
        }
        self.handlers.insert(target, BoxHandler::new(handler));
        Ok(self)
    }

    /// Registered targets, in order.
    pub fn targets(&self) -> impl Iterator<Item = &HandlerTarget> {
        self.handlers.keys()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Takes the handler registered under `target`, dropping the others.
    pub fn select(mut self, target: &HandlerTarget) -> Result<BoxHandler, RegistryError> {
        match self.handlers.remove(target) {
            Some(handler) => {
                info!(target = %target, "selected handler");
                Ok(handler)
            }
            None => Err(RegistryError::Unknown {
                target: target.clone(),
                available: self.handlers.keys().cloned().collect(),
            }),
        }
    }
}

/// Failure to register or select a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The target string is not a valid reference.
    InvalidTarget(TargetError),
    /// A handler is already registered under this target.
    Duplicate(HandlerTarget),
    /// Nothing is registered under the requested target.
    Unknown {
        /// Requested target.
        target: HandlerTarget,
        /// Registered targets.
        available: Vec<HandlerTarget>,
    },
}

impl From<TargetError> for RegistryError {
    fn from(err: TargetError) -> Self {
        RegistryError::InvalidTarget(err)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidTarget(err) => err.fmt(f),
            RegistryError::Duplicate(target) => write!(f, "handler {} is registered twice", target),
            RegistryError::Unknown { target, available } => {
                let available = available.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(
                    f,
                    "no handler named {} available, available handlers are: {}",
                    target,
                    available.join(", ")
                )
            }
        }
    }
}

impl StdError for RegistryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RegistryError::InvalidTarget(err) => Some(err),
            _ => None,
        }
    }
}
