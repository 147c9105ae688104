pub mod connection;
pub mod ice;
pub mod media;
pub mod negotiation;
pub mod transport;
pub mod types;

pub use connection::{WebRtcTransport, WebRtcTransportFactory};
pub use ice::{IceAction, IceStateMonitor};
pub use media::{
    CaptureSource, LocalStream, LogRenderSink, MediaBinder, MediaTrack, RemoteStream,
    RenderSink, RenderTarget, StreamHandle, SyntheticCapture,
};
pub use negotiation::NegotiationEngine;
pub use transport::{EventSink, Transport, TransportFactory};
pub use types::{
    IceCandidate, IceConnectionState, IceGatheringState, RemoteTrack, SdpType,
    SessionDescription, TrackKind, TransportEvent,
};
