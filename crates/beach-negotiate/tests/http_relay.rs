mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use beach_negotiate::{
    HttpRelay, Mailbox, NegotiationEngine, NegotiationError, NegotiationState, Relay, Role,
    SessionDescription, SignalRequest, SignalResponse,
};
use common::{candidate, ScriptedConnectivity, OFFER_SDP};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn signal(
    State(mailbox): State<Arc<Mailbox>>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, (StatusCode, String)> {
    mailbox
        .handle(request)
        .map(Json)
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))
}

async fn serve(mailbox: Arc<Mailbox>) -> String {
    let app = Router::new()
        .route("/api/signal", post(signal))
        .with_state(mailbox);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[test_timeout::tokio_timeout_test]
async fn http_relay_round_trips_through_a_live_server() {
    let mailbox = Arc::new(Mailbox::default());
    let base = serve(mailbox.clone()).await;
    let relay = HttpRelay::new(Some(base.as_str()));

    relay
        .push(SignalRequest::description(
            Role::Offerer,
            SessionDescription::offer(OFFER_SDP),
        ))
        .await
        .unwrap();
    relay
        .push(SignalRequest::candidate(Role::Offerer, candidate("c1")))
        .await
        .unwrap();

    let (description, candidates) = relay.poll(Role::Answerer).await.unwrap().into_parts();
    assert_eq!(description, Some(SessionDescription::offer(OFFER_SDP)));
    assert_eq!(candidates, vec![candidate("c1")]);
    assert_eq!(mailbox.snapshot().answerer.candidates, 1);
}

#[test_timeout::tokio_timeout_test]
async fn role_mismatch_surfaces_as_rejection() {
    let base = serve(Arc::new(Mailbox::default())).await;
    let relay = HttpRelay::new(Some(base.as_str()));
    let err = relay
        .push(SignalRequest::description(
            Role::Answerer,
            SessionDescription::offer(OFFER_SDP),
        ))
        .await
        .unwrap_err();
    match err {
        NegotiationError::RelayRejected { status, reason } => {
            assert_eq!(status, 400);
            assert!(reason.contains("answerer"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test_timeout::tokio_timeout_test]
async fn server_error_is_retryable() {
    let app = Router::new().route(
        "/api/signal",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "draining") }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let relay = HttpRelay::new(Some(format!("http://{addr}").as_str()));
    let err = relay.poll(Role::Answerer).await.unwrap_err();
    assert!(matches!(err, NegotiationError::RelayUnreachable(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[test_timeout::tokio_timeout_test]
async fn refused_connection_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = HttpRelay::new(Some(format!("http://{addr}").as_str()));
    let err = relay.poll(Role::Offerer).await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[test_timeout::tokio_timeout_test]
async fn engines_negotiate_over_http() {
    let mailbox = Arc::new(Mailbox::default());
    let base = serve(mailbox.clone()).await;

    let offerer_rtc = Arc::new(ScriptedConnectivity::default());
    let answerer_rtc = Arc::new(ScriptedConnectivity::default());
    let mut offerer = NegotiationEngine::new(
        Role::Offerer,
        offerer_rtc.clone(),
        HttpRelay::new(Some(base.as_str())),
    );
    let mut answerer = NegotiationEngine::new(
        Role::Answerer,
        answerer_rtc.clone(),
        HttpRelay::new(Some(base.as_str())),
    );

    offerer.on_local_media_ready().await;
    offerer.on_local_candidate(candidate("offerer-host")).await;
    answerer.poll_once().await.unwrap();
    answerer.on_local_candidate(candidate("answerer-host")).await;
    offerer.poll_once().await.unwrap();
    answerer.poll_once().await.unwrap();

    assert_eq!(offerer.state(), NegotiationState::RemoteDescriptionSet);
    assert_eq!(answerer.state(), NegotiationState::RemoteDescriptionSet);
    assert_eq!(offerer_rtc.candidate_lines(), ["answerer-host"]);
    assert_eq!(answerer_rtc.candidate_lines(), ["offerer-host"]);
}
