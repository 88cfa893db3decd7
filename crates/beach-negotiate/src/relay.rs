use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};
use url::Url;

use crate::error::NegotiationError;
use crate::mailbox::Mailbox;
use crate::proto::{Role, SignalRequest, SignalResponse};

pub const SIGNAL_PATH: &str = "api/signal";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The peer's view of the relay: one push and one poll per round trip.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn push(&self, request: SignalRequest) -> Result<(), NegotiationError>;

    async fn poll(&self, role: Role) -> Result<SignalResponse, NegotiationError>;
}

#[async_trait]
impl<T> Relay for Arc<T>
where
    T: Relay + ?Sized,
{
    async fn push(&self, request: SignalRequest) -> Result<(), NegotiationError> {
        (**self).push(request).await
    }

    async fn poll(&self, role: Role) -> Result<SignalResponse, NegotiationError> {
        (**self).poll(role).await
    }
}

/// Talks to a `beach-pier` relay, or any relay speaking the same JSON, over HTTP.
///
/// A missing or unparsable base address does not fail construction; every
/// request short-circuits with [`NegotiationError::MisconfiguredEndpoint`].
#[derive(Clone, Debug)]
pub struct HttpRelay {
    client: Client,
    endpoint: Option<Url>,
}

impl HttpRelay {
    pub fn new(base: Option<&str>) -> Self {
        let endpoint = match base.map(str::trim).filter(|base| !base.is_empty()) {
            Some(base) => match signal_endpoint(base) {
                Ok(url) => Some(url),
                Err(err) => {
                    error!(base, error = %err, "relay base address is not a valid url");
                    None
                }
            },
            None => {
                error!("relay base address is not set; pushes and polls will be skipped");
                None
            }
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    async fn exchange(&self, request: &SignalRequest) -> Result<SignalResponse, NegotiationError> {
        let url = self
            .endpoint
            .as_ref()
            .ok_or(NegotiationError::MisconfiguredEndpoint)?;
        trace!(%url, push = request.is_push(), "relay request");
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            return Err(NegotiationError::RelayRejected {
                status: status.as_u16(),
                reason,
            });
        }
        if !status.is_success() {
            return Err(NegotiationError::RelayUnreachable(format!(
                "relay returned {status}"
            )));
        }
        response.json::<SignalResponse>().await.map_err(http_error)
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn push(&self, request: SignalRequest) -> Result<(), NegotiationError> {
        self.exchange(&request).await.map(|_| ())
    }

    async fn poll(&self, role: Role) -> Result<SignalResponse, NegotiationError> {
        self.exchange(&SignalRequest::poll(role)).await
    }
}

/// In-process relay over a shared [`Mailbox`].
#[derive(Clone, Debug)]
pub struct LocalRelay {
    mailbox: Arc<Mailbox>,
}

impl LocalRelay {
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn push(&self, request: SignalRequest) -> Result<(), NegotiationError> {
        self.mailbox
            .push(request.role, request.sdp, request.candidate)
            .map(|_| ())
            .map_err(|err| NegotiationError::RelayRejected {
                status: 400,
                reason: err.to_string(),
            })
    }

    async fn poll(&self, role: Role) -> Result<SignalResponse, NegotiationError> {
        Ok(self.mailbox.poll(role).into())
    }
}

/// `http://host:8000` or `host:8000/` become `http://host:8000/api/signal`.
pub fn signal_endpoint(base: &str) -> Result<Url, url::ParseError> {
    let trimmed = base.trim().trim_end_matches('/');
    let normalized = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    if normalized.ends_with(SIGNAL_PATH) {
        Url::parse(&normalized)
    } else {
        Url::parse(&format!("{normalized}/{SIGNAL_PATH}"))
    }
}

fn http_error(err: reqwest::Error) -> NegotiationError {
    NegotiationError::RelayUnreachable(err.to_string())
}
