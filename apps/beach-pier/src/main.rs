mod cli;
mod config;
mod handlers;

use anyhow::Context;
use beach_negotiate::Mailbox;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Cli, Commands},
    config::Config,
    handlers::router,
};

#[tokio::main]
async fn main() {
    // Default to WARN level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cli = Cli::parse();

    if let Some(Commands::Debug { url, command }) = cli.command.take() {
        if let Err(err) = cli::run_debug_client(url, command).await {
            error!(error = %err, "debug client failed");
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
        return;
    }

    let config = cli.apply(Config::from_env());
    if let Err(err) = serve(config).await {
        error!(error = %err, "relay stopped");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let mailbox = Arc::new(Mailbox::new(config.delivery));
    let app = router(mailbox);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, delivery = %config.delivery, "beach pier listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")?;
    Ok(())
}
