use serde_json::Value;
use shim_runtime::{lambda, Context, Error};

// #[lambda] attribute removes the need for boilerplate code
// required by `shim_runtime::run(func).await?` as demonstrated in other
// examples.

#[lambda]
#[tokio::main]
async fn main(event: Value, _: Context) -> Result<Value, Error> {
    Ok(event)
}
