//! The handlers packaged into the function image.
//!
//! Every handler is addressed as `function.<name>`; the container's command picks one
//! of them at cold start.

use serde::Serialize;
use serde_json::{json, Value};
use shim_runtime::{
    handler_fn, BoxHandler, Context, Error, Fault, Handler, HandlerTarget, ProxyResponse, Registry, RegistryError,
    Warm,
};
use std::{
    future::{self, Ready},
    time::{Duration, SystemTime},
};

/// Target served when the container does not name one.
pub const DEFAULT_TARGET: &str = "function.handler";

/// Below this budget `handler` refuses to start.
const MIN_REMAINING: Duration = Duration::from_millis(100);

static ENVIRONMENT: Warm<Environment> = Warm::new("environment");

#[derive(Debug)]
struct Environment {
    started_at: SystemTime,
}

#[derive(Serialize)]
struct Summary<'a> {
    message: &'static str,
    request_id: &'a str,
    function: &'a str,
    cold_start: bool,
    invocation: u64,
    environment_age_ms: u128,
    remaining_ms: u128,
    event: Value,
}

/// Acknowledges the event with a gateway-style response describing the invocation.
pub async fn handler(event: Value, ctx: Context) -> Result<ProxyResponse, Error> {
    ctx.ensure_remaining(MIN_REMAINING)?;
    let environment = ENVIRONMENT.get_or_init(|| Environment {
        started_at: SystemTime::now(),
    });

    let summary = Summary {
        message: "invocation completed",
        request_id: ctx.request_id(),
        function: ctx.function_name(),
        cold_start: ctx.is_cold_start(),
        invocation: ctx.sequence(),
        environment_age_ms: environment.started_at.elapsed().unwrap_or_default().as_millis(),
        remaining_ms: ctx.remaining_time().as_millis(),
        event,
    };
    Ok(ProxyResponse::json(200, &summary)?)
}

/// Always fails, with the event's `error_msg` when it has one.
pub async fn fail(event: Value, _: Context) -> Result<Value, Fault> {
    let message = event
        .get("error_msg")
        .and_then(Value::as_str)
        .unwrap_or("failure requested by the caller");
    Err(Fault::new("FunctionFault", message))
}

/// Counts the invocations served by this execution environment.
#[derive(Debug, Default)]
pub struct Count {
    served: u64,
}

impl Handler<Value, Value> for Count {
    type Error = Error;
    type Fut = Ready<Result<Value, Error>>;

    fn call(&mut self, _event: Value, ctx: Context) -> Self::Fut {
        self.served += 1;
        future::ready(Ok(json!({
            "served": self.served,
            "sequence": ctx.sequence(),
            "cold_start": ctx.is_cold_start(),
        })))
    }
}

/// Every handler shipped in the image.
pub fn registry() -> Result<Registry, RegistryError> {
    Registry::new()
        .register("function.handler", handler_fn(handler))?
        .register("function.fail", handler_fn(fail))?
        .register("function.count", Count::default())
}

/// Picks the handler for `target`, or [`DEFAULT_TARGET`] when none is given.
pub fn select_handler(target: Option<&str>) -> Result<BoxHandler, Error> {
    let target: HandlerTarget = target.unwrap_or(DEFAULT_TARGET).parse()?;
    Ok(registry()?.select(&target)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shim_runtime::simulated::{self, invoke, Outcome, RuntimeApi};

    fn body(response: &ProxyResponse) -> Value {
        serde_json::from_str(response.body().expect("body")).expect("json body")
    }

    #[tokio::test]
    async fn handler_wraps_event_in_proxy_response() {
        let response = invoke(&mut handler_fn(handler), json!({ "key": "a" }))
            .await
            .expect("response");
        assert_eq!(response.status_code(), 200);
        assert_eq!(
            response.headers().get("content-type").map(String::as_str),
            Some("application/json")
        );
        let body = body(&response);
        assert_eq!(body["message"], "invocation completed");
        assert_eq!(body["request_id"], "local");
        assert_eq!(body["cold_start"], true);
        assert_eq!(body["event"], json!({ "key": "a" }));
    }

    #[tokio::test]
    async fn handler_refuses_to_start_without_time() {
        let ctx = simulated::context(Duration::from_millis(0));
        let err = handler(json!({}), ctx).await.expect_err("no time left");
        assert!(err.is::<shim_runtime::DeadlineExceeded>());
    }

    #[tokio::test]
    async fn fail_uses_error_msg() {
        let err = invoke(&mut handler_fn(fail), json!({ "error_msg": "boom" }))
            .await
            .expect_err("fault");
        assert_eq!(err, Fault::new("FunctionFault", "boom"));
    }

    #[tokio::test]
    async fn count_keeps_state_between_calls() {
        let mut count = Count::default();
        let first = invoke(&mut count, json!({})).await.expect("first");
        let second = invoke(&mut count, json!({})).await.expect("second");
        assert_eq!(first["served"], 1);
        assert_eq!(second["served"], 2);
    }

    #[test]
    fn registry_lists_every_handler() {
        let targets: Vec<String> = registry()
            .expect("registry")
            .targets()
            .map(ToString::to_string)
            .collect();
        assert_eq!(targets, vec!["function.count", "function.fail", "function.handler"]);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let err = select_handler(Some("function.missing")).expect_err("unknown");
        assert!(err.to_string().starts_with("no handler named function.missing available"));
        assert!(select_handler(Some("lambda_handler")).is_err());
    }

    #[tokio::test]
    async fn selected_count_served_through_runtime() {
        let api = RuntimeApi::start().await.expect("runtime api");
        api.push(json!({}));
        api.push(json!({}));
        let handler = select_handler(Some("function.count")).expect("handler");

        api.runtime()
            .expect("runtime")
            .run_for(handler, 2)
            .await
            .expect("served");

        let served: Vec<Value> = api
            .outcomes()
            .into_iter()
            .map(|outcome| match outcome {
                Outcome::Response { body, .. } => body,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            served,
            vec![
                json!({ "served": 1, "sequence": 1, "cold_start": true }),
                json!({ "served": 2, "sequence": 2, "cold_start": false }),
            ]
        );
    }

    #[tokio::test]
    async fn fail_target_reports_faults_through_runtime() {
        let api = RuntimeApi::start().await.expect("runtime api");
        api.push(json!({ "error_msg": "upstream unavailable" }));
        let handler = select_handler(Some("function.fail")).expect("handler");

        api.runtime()
            .expect("runtime")
            .run_for(handler, 1)
            .await
            .expect("served");

        match &api.outcomes()[0] {
            Outcome::Error { diagnostic, .. } => {
                assert_eq!(diagnostic.error_type, "FunctionFault");
                assert_eq!(diagnostic.error_message, "upstream unavailable");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn default_target_is_handler() {
        let mut selected = select_handler(None).expect("handler");
        let out = invoke(&mut selected, json!({ "n": 1 })).await.expect("response");
        assert_eq!(out["statusCode"], 200);
    }
    const DOCKERFILE: &str = include_str!("../../Dockerfile");

    #[test]
    fn image_command_names_a_registered_target() {
        let cmd = DOCKERFILE
            .lines()
            .find_map(|line| line.strip_prefix("CMD "))
            .expect("CMD instruction");
        let args: Vec<String> = serde_json::from_str(cmd).expect("exec form");
        assert_eq!(args, vec![DEFAULT_TARGET]);
        assert!(select_handler(args.first().map(String::as_str)).is_ok());
    }

    #[test]
    fn image_builds_bootstrap_with_a_current_toolchain() {
        let tag = DOCKERFILE
            .lines()
            .find_map(|line| line.strip_prefix("FROM rust:"))
            .and_then(|rest| rest.split_whitespace().next())
            .expect("rust build stage");
        let version: Vec<u32> = tag
            .split('-')
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|part| part.parse().expect("numeric version"))
            .collect();
        assert_eq!(version[0], 1, "{}", tag);
        if let Some(minor) = version.get(1) {
            assert!(*minor >= 71, "toolchain {} is older than the dependency tree allows", tag);
        }
        assert!(DOCKERFILE.contains("--locked"));
        assert!(DOCKERFILE.contains("--bin bootstrap"));
    }
}
