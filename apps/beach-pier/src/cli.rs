use anyhow::{bail, Context, Result};
use beach_negotiate::relay::signal_endpoint;
use beach_negotiate::{
    CandidateDelivery, ConnectivityCandidate, HttpRelay, Relay, Role, SignalRequest,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "beach-pier")]
#[command(about = "Beach Pier signaling relay and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Port to listen on (overrides BEACH_PIER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides BEACH_PIER_BIND)
    #[arg(long)]
    pub bind: Option<String>,

    /// Candidate delivery policy: cumulative or incremental
    #[arg(long)]
    pub candidates: Option<CandidateDelivery>,
}

impl Cli {
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(delivery) = self.candidates {
            config.delivery = delivery;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Talk to a running relay
    Debug {
        /// Relay base URL (e.g., http://localhost:8000)
        #[arg(short, long, default_value = "http://localhost:8000")]
        url: String,

        #[command(subcommand)]
        command: DebugCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Print what is pending for a role
    Poll {
        #[arg(short, long)]
        role: Role,
    },

    /// Push a raw connectivity candidate on behalf of a role
    PushCandidate {
        #[arg(short, long)]
        role: Role,

        /// Candidate line, e.g. "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host"
        candidate: String,

        #[arg(long, default_value = "0")]
        sdp_mid: String,

        #[arg(long, default_value_t = 0)]
        sdp_mline_index: u16,
    },

    /// Print the relay's slot summary
    Health,
}

pub async fn run_debug_client(url: String, command: DebugCommands) -> Result<()> {
    debug!(%url, ?command, "running debug command");
    match command {
        DebugCommands::Poll { role } => {
            let relay = relay_for(&url)?;
            let response = relay.poll(role).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        DebugCommands::PushCandidate {
            role,
            candidate,
            sdp_mid,
            sdp_mline_index,
        } => {
            let relay = relay_for(&url)?;
            let candidate = ConnectivityCandidate::from_ice(
                candidate,
                Some(sdp_mid),
                Some(sdp_mline_index),
                None,
            );
            relay.push(SignalRequest::candidate(role, candidate)).await?;
            println!("candidate pushed for {}", role.peer());
        }
        DebugCommands::Health => {
            let mut health = signal_endpoint(&url).context("invalid relay url")?;
            health.set_path("/health");
            let body: Value = reqwest::get(health.clone())
                .await
                .with_context(|| format!("failed to reach {health}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

fn relay_for(url: &str) -> Result<HttpRelay> {
    let relay = HttpRelay::new(Some(url));
    if relay.endpoint().is_none() {
        bail!("invalid relay url: {url}");
    }
    Ok(relay)
}
