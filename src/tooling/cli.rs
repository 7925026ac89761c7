//! CLI Tooling
//!
//! Command-line surface of the daemon: load configuration for a site, wire
//! the CouchDB client into a [`SyncContext`], bootstrap, then follow changes.

use crate::config::{ConfigLoader, SitePaths, SyncConfig};
use crate::error::SyncError;
use crate::logging::init_logging;
use crate::reconcile::GzipMd5Verifier;
use crate::store::CouchClient;
use crate::sync::{assert_design_document, bootstrap, ChangeConsumer, SyncContext};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// stacksync - mirror a StackEdit CouchDB tree onto a Hugo content directory
#[derive(Parser, Debug)]
#[command(name = "stacksync")]
#[command(about = "Mirror a StackEdit CouchDB tree onto a Hugo content directory")]
pub struct Cli {
    /// Hugo site root
    #[arg(long, default_value = ".")]
    pub site: PathBuf,

    /// Configuration file layered over `<site>/stacksync.toml`
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop after the bootstrap pass
    #[arg(long)]
    pub once: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,
}

/// Resolved configuration for one invocation
pub struct CliContext {
    config: SyncConfig,
    site: SitePaths,
    once: bool,
}

impl CliContext {
    /// Load and validate configuration for the site named by `cli`.
    pub fn new(cli: &Cli) -> Result<Self, SyncError> {
        let root = cli.site.canonicalize().map_err(|e| {
            SyncError::Config(format!("Site directory {}: {}", cli.site.display(), e))
        })?;
        let mut config = ConfigLoader::load(&root, cli.config.as_deref())?;
        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        config.couch.validate()?;

        let site = SitePaths::resolve(&root, &config.site);
        Ok(Self {
            config,
            site,
            once: cli.once,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn site(&self) -> &SitePaths {
        &self.site
    }

    pub fn init_logging(&self) -> Result<(), SyncError> {
        init_logging(Some(&self.config.logging), Some(&self.site.root))
    }

    /// Bootstrap, then follow changes until Ctrl-C unless `--once` was given.
    pub async fn execute(&self) -> Result<(), SyncError> {
        let client = CouchClient::from_config(&self.config.couch, self.config.sync.heartbeat())?;
        info!(
            url = %self.config.couch.url,
            database = client.database(),
            site = %self.site.root.display(),
            "Starting"
        );
        let ctx = SyncContext::new(
            Arc::new(client),
            Arc::new(GzipMd5Verifier::new()),
            self.site.clone(),
            &self.config,
        );

        assert_design_document(ctx.store(), &ctx.design_document, &ctx.view).await?;
        let (state, report) = bootstrap(&ctx).await?;
        if self.once {
            info!(?report, "Single pass finished");
            return Ok(());
        }

        let mut consumer = ChangeConsumer::new(ctx, state);
        let handled = consumer
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        info!(handled, since = consumer.since(), "Stopped following changes");
        Ok(())
    }
}
