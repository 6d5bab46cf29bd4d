//! An in-process stand-in for the platform's Runtime API.
//!
//! [`RuntimeApi`] serves the same endpoints the platform does on a local port, so a
//! [`Runtime`] can be driven end to end: queue events with [`RuntimeApi::push`], serve
//! them with [`Runtime::run_for`], then inspect what the runtime reported with
//! [`RuntimeApi::outcomes`]. A result or error posted for an invocation that is not in
//! flight is rejected with `400`, like the platform does, and is not recorded.
//!
//! [`RuntimeApi::push_raw`] hands the runtime a `next` response exactly as given, for
//! deliveries the platform should never make: missing headers, error statuses,
//! bodies that are not a single JSON value.
//!
//! [`invoke`] skips the transport entirely and calls a handler once with a local
//! context, the way a function is exercised from a unit test.

use crate::{
    types::{millis_since_epoch, DEADLINE_HEADER, FUNCTION_ARN_HEADER, REQUEST_ID_HEADER, TRACE_ID_HEADER},
    Config, Context, Diagnostic, Error, Handler, Runtime,
};
use hyper::{
    http::response::Builder,
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use serde_json::Value;
use std::{
    collections::{HashSet, VecDeque},
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error};

/// Time budget given to events queued without an explicit one.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(3);

const FUNCTION_NAME: &str = "simulated";
const FUNCTION_ARN: &str = "arn:aws:lambda:local:000000000000:function:simulated";

/// What the runtime reported for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A result was posted.
    Response {
        /// The invocation.
        request_id: String,
        /// The posted body, parsed as JSON when possible.
        body: Value,
    },
    /// An error was posted.
    Error {
        /// The invocation.
        request_id: String,
        /// The posted diagnostic.
        diagnostic: Diagnostic,
    },
}

impl Outcome {
    /// The invocation this outcome belongs to.
    pub fn request_id(&self) -> &str {
        match self {
            Outcome::Response { request_id, .. } | Outcome::Error { request_id, .. } => request_id,
        }
    }
}

enum Delivery {
    Event {
        request_id: String,
        event: Value,
        budget: Duration,
    },
    Raw {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
}

#[derive(Default)]
struct State {
    pending: VecDeque<Delivery>,
    in_flight: HashSet<String>,
    outcomes: Vec<Outcome>,
    init_error: Option<Diagnostic>,
    issued: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    arrived: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A local Runtime API serving queued events.
pub struct RuntimeApi {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RuntimeApi {
    /// Binds an ephemeral local port and starts serving. Must be called from within a
    /// tokio runtime.
    pub async fn start() -> Result<Self, Error> {
        let shared = Arc::new(Shared::default());
        let service_shared = Arc::clone(&shared);
        let make_service = make_service_fn(move |_| {
            let shared = Arc::clone(&service_shared);
            async move { Ok::<_, Infallible>(service_fn(move |req| handle(Arc::clone(&shared), req))) }
        });

        let server = Server::try_bind(&SocketAddr::from(([127, 0, 0, 1], 0)))?.serve(make_service);
        let addr = server.local_addr();
        let (shutdown, stopped) = oneshot::channel::<()>();
        let server = server.with_graceful_shutdown(async {
            stopped.await.ok();
        });
        tokio::spawn(async move {
            if let Err(err) = server.await {
                error!(error = %err, "simulated runtime api stopped");
            }
        });
        debug!(%addr, "simulated runtime api listening");

        Ok(RuntimeApi {
            addr,
            shared,
            shutdown: Some(shutdown),
        })
    }

    /// The `host:port` the API listens on.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// The ARN reported to handlers.
    pub fn function_arn(&self) -> &'static str {
        FUNCTION_ARN
    }

    /// The environment of a function running against this API.
    pub fn config(&self) -> Config {
        Config {
            endpoint: self.endpoint(),
            ..local_config()
        }
    }

    /// A runtime connected to this API.
    pub fn runtime(&self) -> Result<Runtime, Error> {
        Runtime::builder().with_config(self.config()).build()
    }

    /// Queues `event` with the default time budget and returns its request id.
    pub fn push(&self, event: Value) -> String {
        self.push_with_budget(event, DEFAULT_BUDGET)
    }

    /// Queues `event`; its deadline is `budget` after the runtime picks it up.
    pub fn push_with_budget(&self, event: Value, budget: Duration) -> String {
        let request_id = {
            let mut state = self.shared.lock();
            state.issued += 1;
            let request_id = format!("{:08x}-sim", state.issued);
            state.pending.push_back(Delivery::Event {
                request_id: request_id.clone(),
                event,
                budget,
            });
            request_id
        };
        self.shared.arrived.notify_one();
        request_id
    }

    /// Queues a `next` response built from `status`, `headers` and `body` as given.
    ///
    /// A request id among `headers` is put in flight when the response is delivered,
    /// so the runtime may post an outcome for it.
    pub fn push_raw(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers = headers
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        self.shared.lock().pending.push_back(Delivery::Raw {
            status,
            headers,
            body: body.to_owned(),
        });
        self.shared.arrived.notify_one();
    }

    /// Everything reported so far, in order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.shared.lock().outcomes.clone()
    }

    /// The initialization error, if one was reported.
    pub fn init_error(&self) -> Option<Diagnostic> {
        self.shared.lock().init_error.clone()
    }
}

impl Drop for RuntimeApi {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// A context for calling a handler directly, with `budget` left before its deadline.
pub fn context(budget: Duration) -> Context {
    Context::local("local".to_owned(), budget, &local_config())
}

/// Calls `handler` once with `event` and a fresh local context.
pub async fn invoke<H, A, B>(handler: &mut H, event: A) -> Result<B, H::Error>
where
    H: Handler<A, B>,
{
    handler.call(event, context(DEFAULT_BUDGET)).await
}

fn local_config() -> Config {
    Config {
        endpoint: String::new(),
        function_name: FUNCTION_NAME.to_owned(),
        memory: 128,
        version: "$LATEST".to_owned(),
        log_stream: "simulated/[$LATEST]0000".to_owned(),
        log_group: format!("/aws/lambda/{}", FUNCTION_NAME),
        handler: None,
    }
}

async fn handle(shared: Arc<Shared>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let method = req.method().as_str().to_owned();
    let path = req.uri().path().to_owned();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let res = match (method.as_str(), segments.as_slice()) {
        ("GET", ["2018-06-01", "runtime", "invocation", "next"]) => next_event(&shared).await,
        ("POST", ["2018-06-01", "runtime", "invocation", request_id, "response"]) => {
            let body = read_body(req).await;
            let body = serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
            record(
                &shared,
                Outcome::Response {
                    request_id: decode_segment(request_id),
                    body,
                },
            )
        }
        ("POST", ["2018-06-01", "runtime", "invocation", request_id, "error"]) => {
            match serde_json::from_slice::<Diagnostic>(&read_body(req).await) {
                Ok(diagnostic) => record(
                    &shared,
                    Outcome::Error {
                        request_id: decode_segment(request_id),
                        diagnostic,
                    },
                ),
                Err(err) => status(StatusCode::BAD_REQUEST, &err.to_string()),
            }
        }
        ("POST", ["2018-06-01", "runtime", "init", "error"]) => {
            match serde_json::from_slice::<Diagnostic>(&read_body(req).await) {
                Ok(diagnostic) => {
                    shared.lock().init_error = Some(diagnostic);
                    status(StatusCode::ACCEPTED, "")
                }
                Err(err) => status(StatusCode::BAD_REQUEST, &err.to_string()),
            }
        }
        _ => status(StatusCode::NOT_FOUND, "unknown runtime api path"),
    };
    Ok(res)
}

async fn next_event(shared: &Shared) -> Response<Body> {
    let delivery = loop {
        let popped = shared.lock().pending.pop_front();
        if let Some(delivery) = popped {
            break delivery;
        }
        shared.arrived.notified().await;
    };

    match delivery {
        Delivery::Event {
            request_id,
            event,
            budget,
        } => {
            shared.lock().in_flight.insert(request_id.clone());
            let deadline = millis_since_epoch(SystemTime::now() + budget);
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/json")
                .header(REQUEST_ID_HEADER, request_id.as_str())
                .header(DEADLINE_HEADER, deadline.to_string())
                .header(FUNCTION_ARN_HEADER, FUNCTION_ARN)
                .header(TRACE_ID_HEADER, format!("Root=1-{}", request_id));
            respond(builder, Body::from(event.to_string()))
        }
        Delivery::Raw { status, headers, body } => {
            let mut builder = Response::builder().status(status);
            for (name, value) in &headers {
                if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
                    shared.lock().in_flight.insert(value.clone());
                }
                builder = builder.header(name.as_str(), value.as_str());
            }
            respond(builder, Body::from(body))
        }
    }
}

// Reverses the percent-encoding the runtime applies to request ids in paths.
fn decode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escaped = segment
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = escaped {
                decoded.push(b);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn record(shared: &Shared, outcome: Outcome) -> Response<Body> {
    let mut state = shared.lock();
    if !state.in_flight.remove(outcome.request_id()) {
        return status(StatusCode::BAD_REQUEST, "invocation is not in flight");
    }
    state.outcomes.push(outcome);
    status(StatusCode::ACCEPTED, "")
}

async fn read_body(req: Request<Body>) -> Vec<u8> {
    hyper::body::to_bytes(req.into_body())
        .await
        .map(|bytes| bytes.to_vec())
        .unwrap_or_default()
}

fn status(code: StatusCode, message: &str) -> Response<Body> {
    respond(Response::builder().status(code), Body::from(message.to_owned()))
}

fn respond(builder: Builder, body: Body) -> Response<Body> {
    builder.body(body).unwrap_or_else(|err| {
        let mut res = Response::new(Body::from(err.to_string()));
        *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        res
    })
}
