use std::path::Path;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mineworker::{console::Console, settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // The world lives beside the console's install, not inside it.
    let world_path = std::env::current_dir()
        .context("cannot determine the working directory")?
        .join("../world");

    let settings = settings::load(Path::new("."))
        .await
        .context("failed to load mineworker.json")?;

    Console::new(world_path, settings).run().await
}
