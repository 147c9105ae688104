use crate::config::CaptureConstraints;
use crate::error::{Error, Result};
use crate::peer::transport::Transport;
use crate::peer::types::{RemoteTrack, TrackKind};
use crate::session::{Session, SessionId};
use crate::utils::random_id;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// A local media track as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
}

impl MediaTrack {
    pub fn video(stream_id: &str) -> Self {
        MediaTrack {
            id: format!("video-{}", random_id()),
            stream_id: stream_id.into(),
            kind: TrackKind::Video,
            mime_type: "video/VP8".into(),
            clock_rate: 90000,
            channels: 0,
        }
    }

    pub fn audio(stream_id: &str) -> Self {
        MediaTrack {
            id: format!("audio-{}", random_id()),
            stream_id: stream_id.into(),
            kind: TrackKind::Audio,
            mime_type: "audio/opus".into(),
            clock_rate: 48000,
            channels: 2,
        }
    }
}

/// Captured local stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

/// Remote stream assembled from the tracks the peer announces
#[derive(Debug)]
pub struct RemoteStream {
    id: String,
    tracks: Mutex<Vec<RemoteTrack>>,
}

impl RemoteStream {
    fn new(first: RemoteTrack) -> Self {
        RemoteStream {
            id: first.stream_id.clone(),
            tracks: Mutex::new(vec![first]),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        match self.tracks.lock() {
            Ok(tracks) => tracks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, track: RemoteTrack) {
        let mut tracks = match self.tracks.lock() {
            Ok(tracks) => tracks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tracks.iter().any(|t| t.track_id == track.track_id) {
            tracks.push(track);
        }
    }
}

/// Capability request for audio/video capture.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Fails with [`Error::Permission`] or [`Error::Device`].
    async fn request(&self, constraints: &CaptureConstraints) -> Result<LocalStream>;
}

/// Test-pattern capture with a fixed set of devices.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    devices: Vec<TrackKind>,
}

impl SyntheticCapture {
    pub fn new(devices: Vec<TrackKind>) -> Self {
        SyntheticCapture { devices }
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        SyntheticCapture::new(vec![TrackKind::Video, TrackKind::Audio])
    }
}

#[async_trait]
impl CaptureSource for SyntheticCapture {
    async fn request(&self, constraints: &CaptureConstraints) -> Result<LocalStream> {
        let stream_id = format!("stream-{}", random_id());
        let mut tracks = Vec::new();

        for (wanted, kind) in [
            (constraints.video, TrackKind::Video),
            (constraints.audio, TrackKind::Audio),
        ] {
            if !wanted {
                continue;
            }
            if !self.devices.contains(&kind) {
                return Err(Error::Device(format!("no {:?} device", kind).to_lowercase()));
            }
            tracks.push(match kind {
                TrackKind::Video => MediaTrack::video(&stream_id),
                TrackKind::Audio => MediaTrack::audio(&stream_id),
            });
        }

        if tracks.is_empty() {
            return Err(Error::Device("no media kind requested".into()));
        }

        Ok(LocalStream {
            id: stream_id,
            tracks,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Local,
    Remote,
}

/// Opaque handle passed to the rendering sink
#[derive(Debug, Clone)]
pub enum StreamHandle {
    Local(Arc<LocalStream>),
    Remote(Arc<RemoteStream>),
}

/// Display surface for local and remote streams.
pub trait RenderSink: Send + Sync {
    fn attach(&self, target: RenderTarget, stream: StreamHandle);

    fn detach(&self, target: RenderTarget);
}

/// Sink that only records what would be shown.
#[derive(Debug, Default)]
pub struct LogRenderSink;

impl RenderSink for LogRenderSink {
    fn attach(&self, target: RenderTarget, stream: StreamHandle) {
        match stream {
            StreamHandle::Local(stream) => info!(
                "{:?} view: local stream {} ({} tracks)",
                target,
                stream.id,
                stream.tracks.len()
            ),
            StreamHandle::Remote(stream) => info!(
                "{:?} view: remote stream {} ({} tracks)",
                target,
                stream.id(),
                stream.tracks().len()
            ),
        }
    }

    fn detach(&self, target: RenderTarget) {
        info!("{:?} view cleared", target);
    }
}

/// Owns the local capture stream and the bound remote stream.
pub struct MediaBinder {
    capture: Arc<dyn CaptureSource>,
    render: Arc<dyn RenderSink>,
    constraints: CaptureConstraints,
    local: Option<Arc<LocalStream>>,
    remote: Option<Arc<RemoteStream>>,
    attached_to: Option<SessionId>,
}

impl MediaBinder {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        render: Arc<dyn RenderSink>,
        constraints: CaptureConstraints,
    ) -> Self {
        MediaBinder {
            capture,
            render,
            constraints,
            local: None,
            remote: None,
            attached_to: None,
        }
    }

    pub fn local_stream(&self) -> Option<&Arc<LocalStream>> {
        self.local.as_ref()
    }

    /// Return the cached local stream, capturing it on first use.
    pub async fn ensure_local_stream(&mut self) -> Result<Arc<LocalStream>> {
        if let Some(stream) = &self.local {
            return Ok(stream.clone());
        }

        debug!("Requesting capture: {:?}", self.constraints);
        let stream = Arc::new(self.capture.request(&self.constraints).await?);
        info!(
            "Captured local stream {} with {} tracks",
            stream.id,
            stream.tracks.len()
        );

        self.render
            .attach(RenderTarget::Local, StreamHandle::Local(stream.clone()));
        self.local = Some(stream.clone());
        Ok(stream)
    }

    /// Add every local track to the session's transport, once per session.
    pub async fn attach_local_tracks(
        &mut self,
        session: &mut Session,
        transport: &dyn Transport,
    ) -> Result<()> {
        if self.attached_to.as_ref() == Some(session.id()) {
            debug!("Local tracks already attached to session {}", session.id());
            return Ok(());
        }

        let stream = self.ensure_local_stream().await?;
        for track in &stream.tracks {
            transport.add_track(track).await?;
            debug!("Attached {:?} track {} to session {}", track.kind, track.id, session.id());
        }

        session.bind_local_stream(&stream);
        self.attached_to = Some(session.id().clone());
        Ok(())
    }

    /// Bind the first delivered remote stream and hand it to the render sink.
    pub fn on_remote_track(&mut self, session: &mut Session, track: RemoteTrack) {
        match &self.remote {
            Some(stream) if stream.id() == track.stream_id => {
                debug!("Remote track {} joins stream {}", track.track_id, stream.id());
                stream.push(track);
            }
            Some(stream) => {
                debug!(
                    "Ignoring remote track {} of stream {}, already bound to {}",
                    track.track_id,
                    track.stream_id,
                    stream.id()
                );
            }
            None => {
                info!(
                    "Remote {:?} track {} arrived, binding stream {}",
                    track.kind, track.track_id, track.stream_id
                );
                let stream = Arc::new(RemoteStream::new(track));
                session.bind_remote_stream(&stream);
                self.render
                    .attach(RenderTarget::Remote, StreamHandle::Remote(stream.clone()));
                self.remote = Some(stream);
            }
        }
    }

    /// Forget the detached transport so the next session attaches again.
    pub(crate) fn detach_transport(&mut self) {
        self.attached_to = None;
    }

    /// Drop both streams and clear the views.
    pub fn release(&mut self) {
        self.attached_to = None;
        if self.remote.take().is_some() {
            debug!("Released remote stream");
        }
        if self.local.take().is_some() {
            debug!("Released local stream");
        }
        self.render.detach(RenderTarget::Remote);
        self.render.detach(RenderTarget::Local);
    }
}
