mod capture;
mod config;
mod logging;
mod rtc;

use anyhow::Context;
use beach_negotiate::{session, HttpRelay, MediaCapture, NegotiationEngine};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use crate::capture::SyntheticCapture;
use crate::config::Cli;
use crate::rtc::RtcConnectivity;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.log_config()) {
        eprintln!("beach-call: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        error!(error = %err, "beach-call exiting");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let role = cli.role;
    let capture = SyntheticCapture::new(!cli.no_audio, !cli.no_video);
    let stream = capture
        .acquire_local_stream()
        .await
        .context("local media unavailable")?;

    let (handle, events) = session::channel();
    let connectivity = Arc::new(
        RtcConnectivity::new(&cli.stun_servers(), handle.clone())
            .await
            .context("failed to create peer connection")?,
    );
    connectivity
        .attach_stream(&stream)
        .await
        .context("failed to attach local tracks")?;
    let pump = stream.spawn_audio_pump();

    let relay = HttpRelay::new(cli.relay_url.as_deref());
    let engine = NegotiationEngine::new(role, connectivity.clone(), relay);
    let interval = cli.poll_interval();
    info!(%role, relay = ?cli.relay_url, interval_ms = cli.poll_interval_ms, "starting call");

    let session_task = tokio::spawn(session::run(engine, events, interval));
    handle.media_ready();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!(state = ?connectivity.connection_state(), "hanging up");

    session_task.abort();
    if let Some(pump) = pump {
        pump.abort();
    }
    connectivity.close().await;
    Ok(())
}
