#![allow(dead_code)]

use async_trait::async_trait;
use p2pcall::config::{CaptureConstraints, DescriptionEncoding};
use p2pcall::peer::{
    CaptureSource, EventSink, IceCandidate, IceConnectionState, IceGatheringState, LocalStream,
    MediaTrack, RenderSink, RenderTarget, SdpType, SessionDescription, StreamHandle,
    SyntheticCapture, Transport, TransportEvent, TransportFactory,
};
use p2pcall::signaling::encode_description;
use p2pcall::{Config, ConnectionManager, Error, Result, SignalSlot};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OFFER_SDP: &str = "v=0\r\n\
    o=- 4215775240449105457 2 IN IP4 127.0.0.1\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=mid:0\r\n\
    a=sendrecv\r\n\
    a=rtpmap:96 VP8/90000\r\n";

pub const ANSWER_SDP: &str = "v=0\r\n\
    o=- 8821937452298834112 2 IN IP4 127.0.0.1\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=mid:0\r\n\
    a=sendrecv\r\n\
    a=rtpmap:96 VP8/90000\r\n";

pub fn offer_text() -> String {
    encode_description(&SessionDescription::offer(OFFER_SDP), DescriptionEncoding::Json).unwrap()
}

pub fn answer_text() -> String {
    encode_description(&SessionDescription::answer(ANSWER_SDP), DescriptionEncoding::Json).unwrap()
}

pub fn host_candidate() -> IceCandidate {
    IceCandidate {
        candidate: "candidate:1 1 udp 2130706431 192.168.1.10 50000 typ host".into(),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    }
}

/// Everything a fake transport was asked to do
#[derive(Debug, Default)]
pub struct TransportLog {
    pub calls: Vec<String>,
    pub tracks: Vec<String>,
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub closed: usize,
}

pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    connectivity: Arc<Mutex<IceConnectionState>>,
    fail_offer: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.log.lock().unwrap().calls.push("create_offer".into());
        if self.fail_offer {
            return Err(Error::Transport("offer refused".into()));
        }
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.log.lock().unwrap().calls.push("create_answer".into());
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(format!("set_local:{}", desc.kind));
        log.local = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(format!("set_remote:{}", desc.kind));
        log.remote = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.log.lock().unwrap().local.clone()
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("add_track".into());
        log.tracks.push(track.id.clone());
        Ok(())
    }

    fn connectivity_state(&self) -> IceConnectionState {
        *self.connectivity.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        *self.connectivity.lock().unwrap() = IceConnectionState::Closed;
        Ok(())
    }
}

/// Test-side view of a transport the factory handed out
#[derive(Clone)]
pub struct TransportHandle {
    pub sink: EventSink,
    pub log: Arc<Mutex<TransportLog>>,
    connectivity: Arc<Mutex<IceConnectionState>>,
}

impl TransportHandle {
    pub fn emit(&self, event: TransportEvent) {
        assert!(self.sink.emit(event));
    }

    /// Change the transport's connectivity and notify the manager.
    pub fn connectivity(&self, state: IceConnectionState) {
        *self.connectivity.lock().unwrap() = state;
        self.emit(TransportEvent::ConnectivityChanged(state));
    }

    pub fn gathering(&self, state: IceGatheringState) {
        self.emit(TransportEvent::GatheringChanged(state));
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().calls.clone()
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub unavailable: AtomicBool,
    pub fail_offer: AtomicBool,
    created: Mutex<Vec<TransportHandle>>,
}

impl FakeFactory {
    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last(&self) -> TransportHandle {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport created")
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(&self, _config: &Config, events: EventSink) -> Result<Box<dyn Transport>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::TransportUnavailable("no network".into()));
        }

        let log = Arc::new(Mutex::new(TransportLog::default()));
        let connectivity = Arc::new(Mutex::new(IceConnectionState::New));
        self.created.lock().unwrap().push(TransportHandle {
            sink: events,
            log: log.clone(),
            connectivity: connectivity.clone(),
        });

        Ok(Box::new(FakeTransport {
            log,
            connectivity,
            fail_offer: self.fail_offer.load(Ordering::SeqCst),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBehaviour {
    Grant,
    Deny,
    NoDevice,
}

pub struct FakeCapture {
    pub requests: AtomicUsize,
    behaviour: Mutex<CaptureBehaviour>,
}

impl FakeCapture {
    pub fn new(behaviour: CaptureBehaviour) -> Self {
        FakeCapture {
            requests: AtomicUsize::new(0),
            behaviour: Mutex::new(behaviour),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn request(&self, constraints: &CaptureConstraints) -> Result<LocalStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            CaptureBehaviour::Grant => SyntheticCapture::default().request(constraints).await,
            CaptureBehaviour::Deny => Err(Error::Permission("user dismissed the prompt".into())),
            CaptureBehaviour::NoDevice => SyntheticCapture::new(Vec::new()).request(constraints).await,
        }
    }
}

#[derive(Default)]
pub struct RecordingRender {
    pub events: Mutex<Vec<(RenderTarget, bool)>>,
}

impl RecordingRender {
    pub fn attached(&self, target: RenderTarget) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| *t == target)
            .map(|(_, attached)| *attached)
            .unwrap_or(false)
    }
}

impl RenderSink for RecordingRender {
    fn attach(&self, target: RenderTarget, _stream: StreamHandle) {
        self.events.lock().unwrap().push((target, true));
    }

    fn detach(&self, target: RenderTarget) {
        self.events.lock().unwrap().push((target, false));
    }
}

pub struct Harness {
    pub manager: ConnectionManager,
    pub factory: Arc<FakeFactory>,
    pub capture: Arc<FakeCapture>,
    pub render: Arc<RecordingRender>,
    pub slot: Arc<SignalSlot>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_capture(CaptureBehaviour::Grant)
    }

    pub fn with_capture(behaviour: CaptureBehaviour) -> Self {
        let factory = Arc::new(FakeFactory::default());
        let capture = Arc::new(FakeCapture::new(behaviour));
        let render = Arc::new(RecordingRender::default());
        let slot = Arc::new(SignalSlot::default());
        let manager = ConnectionManager::new(
            Config::default(),
            factory.clone(),
            capture.clone(),
            render.clone(),
            slot.clone(),
        );
        Harness {
            manager,
            factory,
            capture,
            render,
            slot,
        }
    }

    /// Deliver every notification queued so far.
    pub async fn drain(&mut self, count: usize) {
        for _ in 0..count {
            self.manager.process_next_event().await;
        }
    }

    /// Finish gathering and return the published text.
    pub async fn complete_gathering(&mut self) -> String {
        let handle = self.factory.last();
        handle.gathering(IceGatheringState::Gathering);
        handle.emit(TransportEvent::Candidate(Some(host_candidate())));
        handle.gathering(IceGatheringState::Complete);
        self.drain(3).await;
        self.slot.text().expect("nothing published")
    }
}

pub fn kind_of(text: &str) -> SdpType {
    p2pcall::signaling::decode_description(text).unwrap().kind
}
