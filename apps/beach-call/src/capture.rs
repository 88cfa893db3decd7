use async_trait::async_trait;
use beach_negotiate::{MediaCapture, NegotiationError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const OPUS_FRAME: Duration = Duration::from_millis(20);
// Opus TOC byte for a 20 ms CELT frame followed by an empty payload.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Stands in for a camera and microphone: Opus and VP8 tracks whose audio
/// carries silence.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    audio: bool,
    video: bool,
    stream_id: String,
}

impl SyntheticCapture {
    pub fn new(audio: bool, video: bool) -> Self {
        Self {
            audio,
            video,
            stream_id: "beach-call".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct LocalStream {
    pub audio: Option<Arc<TrackLocalStaticSample>>,
    pub video: Option<Arc<TrackLocalStaticSample>>,
}

impl LocalStream {
    pub fn tracks(&self) -> impl Iterator<Item = &Arc<TrackLocalStaticSample>> {
        self.audio.iter().chain(self.video.iter())
    }

    /// Feeds silent Opus frames so the far side sees a live audio track.
    pub fn spawn_audio_pump(&self) -> Option<JoinHandle<()>> {
        let track = self.audio.clone()?;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(OPUS_FRAME);
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: Bytes::from_static(&OPUS_SILENCE),
                    duration: OPUS_FRAME,
                    ..Default::default()
                };
                if let Err(err) = track.write_sample(&sample).await {
                    trace!(error = %err, "audio sample dropped");
                }
            }
        }))
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    type Stream = LocalStream;

    async fn acquire_local_stream(&self) -> Result<LocalStream, NegotiationError> {
        if !self.audio && !self.video {
            return Err(NegotiationError::Device(
                "audio and video are both disabled".into(),
            ));
        }
        let audio = self.audio.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48_000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                "audio".to_owned(),
                self.stream_id.clone(),
            ))
        });
        let video = self.video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90_000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "video".to_owned(),
                self.stream_id.clone(),
            ))
        });
        debug!(
            audio = audio.is_some(),
            video = video.is_some(),
            "synthetic capture ready"
        );
        Ok(LocalStream { audio, video })
    }
}
