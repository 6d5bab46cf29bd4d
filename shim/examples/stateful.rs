use serde_json::{json, Value};
use shim_runtime::{Context, Error, Handler};
use std::{future::Future, pin::Pin};

// State kept in the handler lives as long as the execution environment: the
// runtime calls the same value for every warm invocation, one at a time.
struct StatefulHandler {
    counter: usize,
}

impl Handler<Value, Value> for StatefulHandler {
    type Error = Error;
    type Fut = Pin<Box<dyn Future<Output = Result<Value, Error>> + Send + 'static>>;

    fn call(&mut self, _event: Value, context: Context) -> Self::Fut {
        self.counter += 1;
        let fut = handle_request(self.counter, context);
        Box::pin(fut)
    }
}

async fn handle_request(counter: usize, ctx: Context) -> Result<Value, Error> {
    Ok(json!({ "counter": counter, "cold_start": ctx.is_cold_start() }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    shim_runtime::run(StatefulHandler { counter: 0 }).await
}
