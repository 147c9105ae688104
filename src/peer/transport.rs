//! The transport handle seam.
//!
//! The negotiation core never talks to a peer connection directly. It goes
//! through [`Transport`], and receives the transport's notifications as
//! typed [`TransportEvent`]s on the manager's queue via an [`EventSink`].

use crate::config::Config;
use crate::error::Result;
use crate::peer::media::MediaTrack;
use crate::peer::types::{IceConnectionState, SessionDescription, TransportEvent};
use crate::session::SessionId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Real-time peer connection primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current local description, including candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_track(&self, track: &MediaTrack) -> Result<()>;

    fn connectivity_state(&self) -> IceConnectionState;

    async fn close(&self) -> Result<()>;
}

/// Builds one transport handle per session.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Failures must be reported as [`crate::Error::TransportUnavailable`].
    async fn create(&self, config: &Config, events: EventSink) -> Result<Box<dyn Transport>>;
}

/// Everything the manager's event loop can receive.
#[derive(Debug)]
pub(crate) enum Notification {
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    RecoveryExpired {
        session: SessionId,
        timer: u64,
    },
}

/// Delivers a transport's notifications to the manager that owns its session.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventSink {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<Notification>) -> Self {
        EventSink { session, tx }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Queue an event. Returns false once the manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Notification::Transport {
                session: self.session.clone(),
                event,
            })
            .is_ok()
    }
}
