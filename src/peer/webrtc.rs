//! WebRTC negotiator on webrtc-rs

use super::{Negotiator, NegotiatorEvent, NegotiatorFactory, PeerState};
use crate::config::ViewerConfig;
use crate::media::FeedTrack;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Remote screen track surfaced to the feed registry
#[derive(Clone)]
pub struct RemoteScreenTrack {
    id: String,
    inner: Arc<TrackRemote>,
}

impl RemoteScreenTrack {
    /// The underlying remote track, for binding to an output surface
    pub fn remote(&self) -> &Arc<TrackRemote> {
        &self.inner
    }
}

impl FeedTrack for RemoteScreenTrack {
    fn transport_id(&self) -> String {
        self.id.clone()
    }

    fn stop(&self) {
        // Remote-track teardown rides on the peer connection close; the
        // registry drops the last reader handle here.
        debug!(track_id = %self.id, "releasing remote screen track");
    }
}

/// [`Negotiator`] implementation owning one webrtc-rs peer connection
///
/// The viewer never sends media; answers are derived from the agent's offer.
pub struct WebRtcNegotiator {
    session_id: String,
    peer_connection: Arc<RTCPeerConnection>,

    /// Candidates received before the remote description was applied. The
    /// flag is flipped under the same lock so no candidate is lost between
    /// the check and the flush.
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    remote_description_set: AtomicBool,

    closed: AtomicBool,
}

impl WebRtcNegotiator {
    /// Create a negotiator and its event stream for one session
    pub async fn connect(
        session_id: &str,
        config: &ViewerConfig,
    ) -> Result<(
        Self,
        mpsc::UnboundedReceiver<NegotiatorEvent<RemoteScreenTrack>>,
    )> {
        info!(session_id, "creating peer connection");

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnection(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnection(format!("Failed to create peer connection: {}", e))
        })?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Connection-state changes, in transport order.
        let state_tx = event_tx.clone();
        let state_session = session_id.to_string();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let state = match s {
                    RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
                    RTCPeerConnectionState::Connected => Some(PeerState::Connected),
                    RTCPeerConnectionState::Failed => Some(PeerState::Failed),
                    RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                        Some(PeerState::Closed)
                    }
                    _ => None,
                };

                if let Some(state) = state {
                    debug!(session_id = %state_session, ?state, "peer connection state changed");
                    let _ = state_tx.send(NegotiatorEvent::StateChanged(state));
                }

                Box::pin(async {})
            },
        ));

        // Remote tracks: the only path by which the feed registry learns of
        // feeds.
        let track_tx = event_tx.clone();
        let track_session = session_id.to_string();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let transport_id = track.id();
            info!(session_id = %track_session, track_id = %transport_id, "remote track arrived");

            let _ = track_tx.send(NegotiatorEvent::TrackArrived {
                transport_id: transport_id.clone(),
                track: RemoteScreenTrack {
                    id: transport_id,
                    inner: track,
                },
            });

            Box::pin(async {})
        }));

        // Trickle local candidates toward the agent as they are discovered.
        let candidate_tx = event_tx;
        let candidate_session = session_id.to_string();
        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => match serde_json::to_string(&init) {
                        Ok(json) => {
                            let _ = candidate_tx
                                .send(NegotiatorEvent::LocalCandidate { candidate: json });
                        }
                        Err(e) => {
                            warn!(session_id = %candidate_session, "failed to encode local candidate: {}", e)
                        }
                    },
                    Err(e) => {
                        warn!(session_id = %candidate_session, "failed to serialize local candidate: {}", e)
                    }
                }
            }
            Box::pin(async {})
        }));

        Ok((
            Self {
                session_id: session_id.to_string(),
                peer_connection,
                pending_candidates: Mutex::new(Vec::new()),
                remote_description_set: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            },
            event_rx,
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Negotiation(
                "peer connection already closed".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Negotiator for WebRtcNegotiator {
    type Track = RemoteScreenTrack;

    async fn create_offer(&self) -> Result<String> {
        self.ensure_open()?;

        // The viewer only ever receives; express that intent before offering.
        self.peer_connection
            .add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to add video transceiver: {}", e)))?;

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::Negotiation("No local description after setting offer".to_string())
            })?;

        debug!(session_id = %self.session_id, "created SDP offer");

        Ok(local_desc.sdp)
    }

    async fn answer_offer(&self, offer_sdp: String) -> Result<String> {
        self.ensure_open()?;

        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::Negotiation(format!("Failed to parse offer: {}", e)))?;

        // Hold the candidate buffer across the remote-description flip so a
        // concurrently arriving candidate is either buffered or applied,
        // never dropped.
        let mut pending = self.pending_candidates.lock().await;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set remote description: {}", e)))?;

        self.remote_description_set.store(true, Ordering::SeqCst);

        // A bad buffered candidate is dropped like on the direct path; the
        // remaining candidates can still complete connectivity checks.
        for candidate in pending.drain(..) {
            if let Err(e) = self.peer_connection.add_ice_candidate(candidate).await {
                warn!(session_id = %self.session_id, "ignoring buffered candidate: {}", e);
            }
        }
        drop(pending);

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::Negotiation("No local description after setting answer".to_string())
            })?;

        debug!(session_id = %self.session_id, "created SDP answer");

        Ok(local_desc.sdp)
    }

    async fn add_remote_candidate(&self, candidate: String) -> Result<()> {
        self.ensure_open()?;

        let init: RTCIceCandidateInit = serde_json::from_str(&candidate)
            .map_err(|e| Error::IceCandidate(format!("Failed to parse ICE candidate: {}", e)))?;

        let mut pending = self.pending_candidates.lock().await;
        if !self.remote_description_set.load(Ordering::SeqCst) {
            debug!(session_id = %self.session_id, "buffering early ICE candidate");
            pending.push(init);
            return Ok(());
        }
        drop(pending);

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(session_id = %self.session_id, "closing peer connection");

        if let Err(e) = self.peer_connection.close().await {
            warn!(session_id = %self.session_id, "error closing peer connection: {}", e);
        }
    }
}

/// Factory producing a [`WebRtcNegotiator`] per session
pub struct WebRtcNegotiatorFactory {
    config: ViewerConfig,
}

impl WebRtcNegotiatorFactory {
    /// Create a factory for the given viewer configuration
    pub fn new(config: ViewerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NegotiatorFactory for WebRtcNegotiatorFactory {
    type Negotiator = WebRtcNegotiator;

    async fn create(
        &self,
        session_id: &str,
    ) -> Result<(
        WebRtcNegotiator,
        mpsc::UnboundedReceiver<NegotiatorEvent<RemoteScreenTrack>>,
    )> {
        WebRtcNegotiator::connect(session_id, &self.config).await
    }
}
