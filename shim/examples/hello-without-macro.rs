use serde_json::{json, Value};
use shim_runtime::{handler_fn, run, Context, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    run(handler_fn(func)).await?;
    Ok(())
}

async fn func(event: Value, ctx: Context) -> Result<Value, Error> {
    let name = event["name"].as_str().unwrap_or("world");

    Ok(json!({ "message": format!("Hello, {}!", name), "request_id": ctx.request_id() }))
}
