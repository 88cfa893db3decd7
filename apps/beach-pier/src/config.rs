use beach_negotiate::CandidateDelivery;
use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub delivery: CandidateDelivery,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let delivery = match env::var("BEACH_PIER_CANDIDATES") {
            Ok(value) => value.parse().unwrap_or_else(|err| {
                warn!(error = %err, "ignoring BEACH_PIER_CANDIDATES");
                defaults.delivery
            }),
            Err(_) => defaults.delivery,
        };

        Self {
            bind: env::var("BEACH_PIER_BIND").unwrap_or(defaults.bind),
            port: env::var("BEACH_PIER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            delivery,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            delivery: CandidateDelivery::Cumulative,
        }
    }
}
