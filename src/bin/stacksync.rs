//! stacksync CLI Binary
//!
//! Keeps a Hugo content directory in step with a StackEdit CouchDB database.

use anyhow::Context;
use clap::Parser;
use stacksync::tooling::cli::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(&cli).context("Error loading configuration")?;
    context.init_logging().context("Error initializing logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error starting runtime")?;
    runtime.block_on(context.execute())?;
    Ok(())
}
