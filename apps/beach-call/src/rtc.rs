use async_trait::async_trait;
use beach_negotiate::{
    ConnectivityCandidate, ConnectivityEngine, NegotiationError, SdpKind, SessionDescription,
    SessionHandle,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use crate::capture::LocalStream;

/// `RTCPeerConnection` behind the negotiation engine's connectivity seam.
/// Gathered candidates, the connected transition, and remote tracks are
/// reported through the session handle.
pub struct RtcConnectivity {
    pc: Arc<RTCPeerConnection>,
}

fn build_api() -> Result<API, NegotiationError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(connectivity_error)?;

    let mut registry = Registry::new();
    registry =
        register_default_interceptors(registry, &mut media_engine).map_err(connectivity_error)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

impl RtcConnectivity {
    pub async fn new(stun: &[String], session: SessionHandle) -> Result<Self, NegotiationError> {
        let api = build_api()?;
        let config = RTCConfiguration {
            ice_servers: stun
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(connectivity_error)?,
        );

        let candidates = session.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let session = candidates.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("local candidate gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        session.candidate_discovered(ConnectivityCandidate::from_ice(
                            init.candidate,
                            init.sdp_mid,
                            init.sdp_mline_index,
                            init.username_fragment,
                        ));
                    }
                    Err(err) => warn!(error = %err, "could not encode local candidate"),
                }
            })
        }));

        let connected = session;
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let session = connected.clone();
            Box::pin(async move {
                debug!(?state, "peer connection state changed");
                match state {
                    RTCPeerConnectionState::Connected => {
                        session.connection_established();
                    }
                    RTCPeerConnectionState::Failed => {
                        warn!("peer connection failed");
                    }
                    _ => {}
                }
            })
        }));

        pc.on_track(Box::new(|track, _receiver, _transceiver| {
            Box::pin(async move {
                info!(
                    kind = %track.kind(),
                    track_id = %track.id(),
                    stream_id = %track.stream_id(),
                    "remote stream available"
                );
            })
        }));

        Ok(Self { pc })
    }

    pub async fn attach_stream(&self, stream: &LocalStream) -> Result<(), NegotiationError> {
        for track in stream.tracks() {
            self.pc
                .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(connectivity_error)?;
            debug!(track_id = track.id(), kind = %track.kind(), "local track attached");
        }
        Ok(())
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }

    pub async fn close(&self) {
        if let Err(err) = self.pc.close().await {
            warn!(error = %err, "failed to close peer connection");
        }
    }
}

#[async_trait]
impl ConnectivityEngine for RtcConnectivity {
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, NegotiationError> {
        let description = match kind {
            SdpKind::Offer => self.pc.create_offer(None).await,
            SdpKind::Answer => self.pc.create_answer(None).await,
        }
        .map_err(connectivity_error)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(connectivity_error)?;
        let local = self.pc.local_description().await.ok_or_else(|| {
            NegotiationError::Connectivity("local description missing after set".into())
        })?;
        Ok(SessionDescription::new(kind, local.sdp))
    }

    async fn apply_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        let sdp = description.sdp.clone();
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp),
            SdpKind::Answer => RTCSessionDescription::answer(sdp),
        }
        .map_err(payload_error)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(payload_error)
    }

    async fn apply_remote_candidate(
        &self,
        candidate: &ConnectivityCandidate,
    ) -> Result<(), NegotiationError> {
        let line = candidate.candidate_line().ok_or_else(|| {
            NegotiationError::InvalidCandidate("missing \"candidate\" field".into())
        })?;
        let init = RTCIceCandidateInit {
            candidate: line.to_string(),
            sdp_mid: candidate.sdp_mid().map(str::to_string),
            sdp_mline_index: candidate.sdp_mline_index(),
            username_fragment: candidate.username_fragment().map(str::to_string),
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|err| NegotiationError::InvalidCandidate(err.to_string()))
    }
}

fn connectivity_error<E: std::fmt::Display>(err: E) -> NegotiationError {
    NegotiationError::Connectivity(err.to_string())
}

fn payload_error<E: std::fmt::Display>(err: E) -> NegotiationError {
    NegotiationError::InvalidPayload(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCapture;
    use beach_negotiate::session;
    use beach_negotiate::MediaCapture;
    use serde_json::json;

    async fn peer() -> RtcConnectivity {
        let (handle, _events) = session::channel();
        RtcConnectivity::new(&[], handle).await.unwrap()
    }

    #[test_timeout::tokio_timeout_test]
    async fn offer_carries_media_sections_for_attached_tracks() {
        let pc = peer().await;
        let stream = SyntheticCapture::new(true, true)
            .acquire_local_stream()
            .await
            .unwrap();
        pc.attach_stream(&stream).await.unwrap();

        let offer = pc.create_local_description(SdpKind::Offer).await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.has_media_section());
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));
        pc.close().await;
    }

    #[test_timeout::tokio_timeout_test]
    async fn offer_and_answer_apply_across_two_connections() {
        let offerer = peer().await;
        let answerer = peer().await;
        let stream = SyntheticCapture::new(true, false)
            .acquire_local_stream()
            .await
            .unwrap();
        offerer.attach_stream(&stream).await.unwrap();

        let offer = offerer.create_local_description(SdpKind::Offer).await.unwrap();
        answerer.apply_remote_description(&offer).await.unwrap();
        let answer = answerer
            .create_local_description(SdpKind::Answer)
            .await
            .unwrap();
        offerer.apply_remote_description(&answer).await.unwrap();

        offerer.close().await;
        answerer.close().await;
    }

    #[test_timeout::tokio_timeout_test]
    async fn garbage_description_is_invalid_payload() {
        let pc = peer().await;
        let err = pc
            .apply_remote_description(&SessionDescription::offer("not an sdp"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
        pc.close().await;
    }

    #[test_timeout::tokio_timeout_test]
    async fn candidate_without_line_is_invalid() {
        let pc = peer().await;
        let err = pc
            .apply_remote_candidate(&ConnectivityCandidate::new(json!({ "sdpMid": "0" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_candidate");
        pc.close().await;
    }
}
