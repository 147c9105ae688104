use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use crate::peer::media::MediaTrack;
use crate::peer::transport::{EventSink, Transport, TransportFactory};
use crate::peer::types::{
    IceCandidate, IceConnectionState, IceGatheringState, RemoteTrack, SdpType,
    SessionDescription, TrackKind, TransportEvent,
};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`WebRtcTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self, config: &Config, events: EventSink) -> Result<Box<dyn Transport>> {
        let transport = WebRtcTransport::new(config, events).await?;
        Ok(Box::new(transport))
    }
}

/// Transport handle backed by a webrtc-rs peer connection.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    local_tracks: Mutex<Vec<Arc<TrackLocalStaticSample>>>,
}

impl WebRtcTransport {
    pub async fn new(config: &Config, events: EventSink) -> Result<Self> {
        let unavailable = |what: &str, e: webrtc::Error| {
            Error::TransportUnavailable(format!("{what}: {e}"))
        };

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| unavailable("register codecs", e))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| unavailable("register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(rtc_config(&config.ice_servers))
                .await
                .map_err(|e| unavailable("create peer connection", e))?,
        );
        info!(
            "Peer connection created for session {} with {} ICE servers",
            events.session(),
            config.ice_servers.len()
        );

        wire_events(&pc, events);

        Ok(WebRtcTransport {
            pc,
            local_tracks: Mutex::new(Vec::new()),
        })
    }

    /// Tracks added so far; an external producer writes samples into them.
    pub fn local_tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        match self.local_tracks.lock() {
            Ok(tracks) => tracks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

/// Forward every peer connection callback as a typed event.
fn wire_events(pc: &Arc<RTCPeerConnection>, events: EventSink) {
    let sink = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    };
                    sink.emit(TransportEvent::Candidate(Some(candidate)));
                }
                Err(e) => warn!("Failed to serialize local candidate: {e}"),
            },
            None => {
                sink.emit(TransportEvent::Candidate(None));
            }
        }
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
        sink.emit(TransportEvent::ConnectivityChanged(connectivity_from(st)));
        Box::pin(async {})
    }));

    let sink = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |st: RTCIceGathererState| {
        match gathering_from(st) {
            Some(state) => {
                sink.emit(TransportEvent::GatheringChanged(state));
            }
            None => debug!("Ignoring gatherer state {:?}", st),
        }
        Box::pin(async {})
    }));

    let sink = events;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(TrackKind::Audio),
                RTPCodecType::Video => Some(TrackKind::Video),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    sink.emit(TransportEvent::RemoteTrack(RemoteTrack {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                    }));
                }
                None => warn!("Remote track {} has no media kind", track.id()),
            }
            Box::pin(async {})
        },
    ));
}

/// Peer connection configuration with the configured ICE servers
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn connectivity_from(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}

fn gathering_from(state: RTCIceGathererState) -> Option<IceGatheringState> {
    match state {
        RTCIceGathererState::Unspecified | RTCIceGathererState::New => {
            Some(IceGatheringState::New)
        }
        RTCIceGathererState::Gathering => Some(IceGatheringState::Gathering),
        RTCIceGathererState::Complete => Some(IceGatheringState::Complete),
        RTCIceGathererState::Closed => None,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(|e| Error::InvalidDescription(e.to_string()))
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(Error::Transport(format!(
            "unsupported description type {other}"
        ))),
    }
}

fn transport_err(what: &str) -> impl Fn(webrtc::Error) -> Error + '_ {
    move |e| Error::Transport(format!("{what}: {e}"))
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(transport_err("create offer"))?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(transport_err("create answer"))?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(transport_err("set local description"))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(transport_err("set remote description"))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        match from_rtc(desc) {
            Ok(desc) => Some(desc),
            Err(e) => {
                warn!("Local description unusable: {e}");
                None
            }
        }
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: track.mime_type.clone(),
                clock_rate: track.clock_rate,
                channels: track.channels,
                ..Default::default()
            },
            track.id.clone(),
            track.stream_id.clone(),
        ));

        self.pc
            .add_track(local.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(transport_err("add track"))?;

        match self.local_tracks.lock() {
            Ok(mut tracks) => tracks.push(local),
            Err(poisoned) => poisoned.into_inner().push(local),
        }
        Ok(())
    }

    fn connectivity_state(&self) -> IceConnectionState {
        connectivity_from(self.pc.ice_connection_state())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.pc.close().await.map_err(transport_err("close"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_ice_servers, ServerKind};

    #[test]
    fn ice_servers_get_schemes_and_credentials() {
        let servers = vec![
            ServerConfig::stun("s", "stun.example.org:3478"),
            ServerConfig {
                id: "t".into(),
                kind: ServerKind::Turn,
                url: "turn.example.org:3478".into(),
                username: Some("alice".into()),
                credential: Some("secret".into()),
            },
        ];

        let rtc = ice_servers(&servers);
        assert_eq!(rtc[0].urls, vec!["stun:stun.example.org:3478".to_string()]);
        assert_eq!(rtc[0].username, "");
        assert_eq!(rtc[1].urls, vec!["turn:turn.example.org:3478".to_string()]);
        assert_eq!(rtc[1].username, "alice");
        assert_eq!(rtc[1].credential, "secret");
    }

    #[test]
    fn configuration_keeps_bundle_and_mux_policies() {
        let config = rtc_config(&default_ice_servers());
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
        assert_eq!(config.rtcp_mux_policy, RTCRtcpMuxPolicy::Require);
    }

    #[test]
    fn states_map_one_to_one() {
        assert_eq!(
            connectivity_from(RTCIceConnectionState::Disconnected),
            IceConnectionState::Disconnected
        );
        assert_eq!(
            connectivity_from(RTCIceConnectionState::Unspecified),
            IceConnectionState::New
        );
        assert_eq!(
            gathering_from(RTCIceGathererState::Complete),
            Some(IceGatheringState::Complete)
        );
        assert_eq!(gathering_from(RTCIceGathererState::Closed), None);
    }
}
