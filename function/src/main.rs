use function::{select_handler, DEFAULT_TARGET};
use shim_runtime::{run_with_init, Config, Error};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        // the platform collects stdout as plain text
        .with_ansi(false)
        .init();

    run_with_init(|config: &Config| {
        let target = config.handler.as_deref();
        info!(target = target.unwrap_or(DEFAULT_TARGET), "cold start");
        let selected = select_handler(target);
        async move { selected }
    })
    .await
}
