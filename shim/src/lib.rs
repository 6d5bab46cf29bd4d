#![deny(missing_docs)]

//! The invocation shim for container-packaged serverless functions.
//!
//! The platform hands a function one event at a time through its Runtime API. This
//! crate runs the loop on the function's side of that boundary: it waits for the next
//! event, builds the read-only [`Context`], calls the [`Handler`] and reports back
//! exactly one result or one error per event. The same handler value serves every
//! invocation of the execution environment, so state it keeps in `self` (or in a
//! [`Warm`] cell) survives from one warm invocation to the next.
//!
//! ```no_run
//! use serde_json::{json, Value};
//! use shim_runtime::{handler_fn, run, Context, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     run(handler_fn(func)).await
//! }
//!
//! async fn func(event: Value, ctx: Context) -> Result<Value, Error> {
//!     Ok(json!({ "request_id": ctx.request_id(), "event": event }))
//! }
//! ```
pub use crate::{
    error::{ConfigError, ContextError, DeadlineExceeded, Fault},
    registry::{BoxHandler, Registry, RegistryError},
    response::ProxyResponse,
    target::{HandlerTarget, TargetError},
    types::{ClientApplication, ClientContext, CognitoIdentity, Config, Context, Diagnostic},
    warm::Warm,
};
use client::Client;
use futures_core::stream::Stream;
use futures_util::{FutureExt, StreamExt};
use http::{Response, Uri};
use hyper::Body;
use requests::{EventCompletionRequest, EventErrorRequest, InitErrorRequest, IntoRequest, NextEventRequest};
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{error, info, trace, warn};
use tracing_futures::Instrument;

mod client;
mod error;
mod registry;
mod requests;
mod response;
mod target;
mod types;
mod warm;

#[cfg(feature = "simulated")]
pub mod simulated;

#[cfg(feature = "derive")]
pub use shim_attributes::lambda;

/// Error type that handlers and the runtime return.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A trait describing an asynchronous function `A` to `B`.
///
/// `call` takes `&mut self`: invocations of one execution environment run strictly one
/// after another, so a handler owns its state exclusively between calls and needs no
/// locking to update it.
pub trait Handler<A, B> {
    /// Errors returned by this handler.
    type Error;
    /// Response of this handler.
    type Fut: Future<Output = Result<B, Self::Error>>;
    /// Handle the incoming event.
    fn call(&mut self, event: A, context: Context) -> Self::Fut;
}

/// Returns a new [`HandlerFn`] with the given closure.
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

/// A [`Handler`] implemented by a closure.
#[derive(Clone, Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, A, B, E, Fut> Handler<A, B> for HandlerFn<F>
where
    F: Fn(A, Context) -> Fut,
    Fut: Future<Output = Result<B, E>>,
{
    type Error = E;
    type Fut = Fut;
    fn call(&mut self, req: A, ctx: Context) -> Self::Fut {
        (self.f)(req, ctx)
    }
}

/// Starts the runtime and begins polling for events on the Runtime API.
///
/// The configuration is read from the environment the platform starts the process
/// with. Only transport failures end the loop; handler failures are reported to the
/// platform and the next event is served.
///
/// # Example
/// ```no_run
/// use shim_runtime::{handler_fn, Context, Error};
/// use serde_json::Value;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Error> {
///     let func = handler_fn(func);
///     shim_runtime::run(func).await?;
///     Ok(())
/// }
///
/// async fn func(event: Value, _: Context) -> Result<Value, Error> {
///     Ok(event)
/// }
/// ```
pub async fn run<A, B, F>(handler: F) -> Result<(), Error>
where
    F: Handler<A, B>,
    F::Error: fmt::Display + 'static,
    A: for<'de> Deserialize<'de>,
    B: Serialize,
{
    trace!("Loading config from env");
    let config = Config::from_env()?;
    let runtime = Runtime::builder().with_config(config).build()?;
    runtime.run(handler).await
}

/// Like [`run`], with a cold start step that builds the handler.
///
/// `init` runs once, before the first event is requested. If it fails the error is
/// reported to the platform as an initialization error and returned without serving any
/// invocation.
pub async fn run_with_init<A, B, F, I, Fut, E>(init: I) -> Result<(), Error>
where
    I: FnOnce(&Config) -> Fut,
    Fut: Future<Output = Result<F, E>>,
    E: fmt::Display + 'static,
    F: Handler<A, B>,
    F::Error: fmt::Display + 'static,
    A: for<'de> Deserialize<'de>,
    B: Serialize,
{
    trace!("Loading config from env");
    let config = Config::from_env()?;
    let runtime = Runtime::builder().with_config(config).build()?;
    let handler = runtime.init(init).await?;
    runtime.run(handler).await
}

/// Builder for [`Runtime`].
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    endpoint: Option<Uri>,
    config: Option<Config>,
}

impl RuntimeBuilder {
    /// Overrides the Runtime API endpoint taken from the configuration.
    pub fn with_endpoint(self, endpoint: Uri) -> Self {
        Self {
            endpoint: Some(endpoint),
            ..self
        }
    }

    /// Uses `config` instead of reading the environment.
    pub fn with_config(self, config: Config) -> Self {
        Self {
            config: Some(config),
            ..self
        }
    }

    /// Builds the runtime.
    pub fn build(self) -> Result<Runtime, Error> {
        let config = match self.config {
            Some(config) => config,
            None => Config::from_env()?,
        };
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => Client::endpoint_uri(&config.endpoint)?,
        };
        Ok(Runtime {
            client: Client::new(endpoint),
            config,
            invocations: AtomicU64::new(0),
        })
    }
}

/// The invocation loop of one execution environment.
#[derive(Debug)]
pub struct Runtime {
    client: Client,
    config: Config,
    invocations: AtomicU64,
}

impl Runtime {
    /// Returns a builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// The configuration contexts are built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of invocations served so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Serves invocations until the Runtime API becomes unreachable.
    pub async fn run<A, B, F>(&self, mut handler: F) -> Result<(), Error>
    where
        F: Handler<A, B>,
        F::Error: fmt::Display + 'static,
        A: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let incoming = incoming(&self.client);
        self.serve(incoming, &mut handler).await
    }

    /// Serves exactly `invocations` invocations and hands the handler back.
    pub async fn run_for<A, B, F>(&self, mut handler: F, invocations: usize) -> Result<F, Error>
    where
        F: Handler<A, B>,
        F::Error: fmt::Display + 'static,
        A: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let incoming = incoming(&self.client).take(invocations);
        self.serve(incoming, &mut handler).await?;
        Ok(handler)
    }

    /// Runs the cold start step, reporting a failure to the platform.
    pub async fn init<I, Fut, F, E>(&self, init: I) -> Result<F, Error>
    where
        I: FnOnce(&Config) -> Fut,
        Fut: Future<Output = Result<F, E>>,
        E: fmt::Display + 'static,
    {
        match init(&self.config).await {
            Ok(handler) => {
                info!(function = %self.config.function_name, "initialized");
                Ok(handler)
            }
            Err(err) => {
                error!(error = %err, "initialization failed");
                self.report_init_error(&err).await?;
                Err(format!("initialization failed: {}", err).into())
            }
        }
    }

    /// Posts `err` to the platform as an initialization error.
    pub async fn report_init_error<E>(&self, err: &E) -> Result<(), Error>
    where
        E: fmt::Display + 'static,
    {
        let diagnostic = Diagnostic {
            error_type: error::INIT_ERROR.to_owned(),
            error_message: err.to_string(),
        };
        let req = InitErrorRequest { diagnostic }.into_req()?;
        let res = self.client.call(req).await?;
        trace!(status = %client::describe(&res), "init error reported");
        Ok(())
    }

    async fn serve<A, B, F>(
        &self,
        incoming: impl Stream<Item = Result<Response<Body>, Error>>,
        handler: &mut F,
    ) -> Result<(), Error>
    where
        F: Handler<A, B>,
        F::Error: fmt::Display + 'static,
        A: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        futures_util::pin_mut!(incoming);
        while let Some(event) = incoming.next().await {
            trace!("New event arrived (run loop)");
            let event = event?;
            if !event.status().is_success() {
                return Err(format!("next invocation failed: {}", client::describe(&event)).into());
            }
            let sequence = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
            self.invoke(event, handler, sequence).await?;
        }
        Ok(())
    }

    async fn invoke<A, B, F>(&self, event: Response<Body>, handler: &mut F, sequence: u64) -> Result<(), Error>
    where
        F: Handler<A, B>,
        F::Error: fmt::Display + 'static,
        A: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let (parts, body) = event.into_parts();
        let request_id = types::request_id(&parts.headers)?;
        let span = tracing::info_span!("invocation", request_id = %request_id, sequence);

        let diagnostic = match Context::try_from(&parts.headers) {
            Ok(ctx) => {
                let ctx = ctx.with_config(&self.config).with_sequence(sequence);
                let body = hyper::body::to_bytes(body).await?;
                match decode_event::<A>(&body) {
                    Ok(event) => match call(handler, event, ctx).instrument(span.clone()).await {
                        Ok(response) => return self.complete(&request_id, response).instrument(span).await,
                        Err(diagnostic) => diagnostic,
                    },
                    Err(error_message) => Diagnostic {
                        error_type: error::DESERIALIZATION_ERROR.to_owned(),
                        error_message,
                    },
                }
            }
            Err(err) => Diagnostic {
                error_type: error::CONTEXT_ERROR.to_owned(),
                error_message: err.to_string(),
            },
        };
        self.fail(&request_id, diagnostic).instrument(span).await
    }

    async fn complete<B: Serialize>(&self, request_id: &str, response: B) -> Result<(), Error> {
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(err) => {
                let diagnostic = Diagnostic {
                    error_type: error::SERIALIZATION_ERROR.to_owned(),
                    error_message: err.to_string(),
                };
                return self.fail(request_id, diagnostic).await;
            }
        };
        let req = EventCompletionRequest { request_id, body }.into_req()?;
        let res = self.client.call(req).await?;
        if res.status().is_success() {
            trace!(status = %client::describe(&res), "response accepted");
        } else {
            warn!(status = %client::describe(&res), "response rejected by the runtime api");
        }
        Ok(())
    }

    async fn fail(&self, request_id: &str, diagnostic: Diagnostic) -> Result<(), Error> {
        error!(
            error_type = %diagnostic.error_type,
            error = %diagnostic.error_message,
            "invocation failed"
        );
        let req = EventErrorRequest { request_id, diagnostic }.into_req()?;
        let res = self.client.call(req).await?;
        if !res.status().is_success() {
            warn!(status = %client::describe(&res), "error rejected by the runtime api");
        }
        Ok(())
    }
}

/// Decodes the event body, which must hold exactly one JSON value.
fn decode_event<A>(body: &[u8]) -> Result<A, String>
where
    A: for<'de> Deserialize<'de>,
{
    let mut de = serde_json::Deserializer::from_slice(body);
    let event = serde_path_to_error::deserialize(&mut de).map_err(|err| err.to_string())?;
    de.end().map_err(|err| err.to_string())?;
    Ok(event)
}

/// Calls the handler, turning its error or a panic into the diagnostic to report.
async fn call<A, B, F>(handler: &mut F, event: A, ctx: Context) -> Result<B, Diagnostic>
where
    F: Handler<A, B>,
    F::Error: fmt::Display + 'static,
{
    let fut = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(event, ctx))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(payload.as_ref())),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(error::diagnostic(&err)),
        Err(payload) => Err(panicked(payload.as_ref())),
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> Diagnostic {
    Diagnostic {
        error_type: error::PANIC.to_owned(),
        error_message: error::panic_message(payload),
    }
}

fn incoming(client: &Client) -> impl Stream<Item = Result<Response<Body>, Error>> + '_ {
    async_stream::try_stream! {
        loop {
            trace!("Waiting for next event (incoming loop)");
            let req = NextEventRequest.into_req()?;
            let res = client.call(req).await?;
            yield res;
        }
    }
}
