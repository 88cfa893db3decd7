use beach_negotiate::{Role, DEFAULT_POLL_INTERVAL};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::{LogConfig, LogLevel};

pub const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";

#[derive(Parser, Debug, Clone)]
#[command(name = "beach-call")]
#[command(about = "Join a two-party call negotiated through a beach-pier relay")]
pub struct Cli {
    /// Relay base URL, e.g. http://localhost:8000
    #[arg(long, env = "BEACH_PIER_URL")]
    pub relay_url: Option<String>,

    /// Which side of the exchange this process plays
    #[arg(long, env = "BEACH_CALL_ROLE", default_value = "offerer")]
    pub role: Role,

    /// Milliseconds between relay polls
    #[arg(
        long,
        env = "BEACH_CALL_POLL_INTERVAL_MS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    /// STUN server URL; repeat for more than one
    #[arg(long = "stun", env = "BEACH_CALL_STUN", value_delimiter = ',', default_value = DEFAULT_STUN)]
    pub stun: Vec<String>,

    /// Do not send an audio track
    #[arg(long)]
    pub no_audio: bool,

    /// Do not send a video track
    #[arg(long)]
    pub no_video: bool,

    #[arg(long, value_enum, env = "BEACH_LOG_LEVEL", default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "BEACH_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.clone(),
        }
    }

    /// Empty entries (e.g. `BEACH_CALL_STUN=`) disable STUN entirely.
    pub fn stun_servers(&self) -> Vec<String> {
        self.stun
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}
