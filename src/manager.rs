//! Owner of the single active session.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::peer::ice::{analyze_candidates, IceAction, IceStateMonitor};
use crate::peer::media::{CaptureSource, MediaBinder, RenderSink};
use crate::peer::negotiation::NegotiationEngine;
use crate::peer::transport::{EventSink, Notification, Transport, TransportFactory};
use crate::peer::types::{IceConnectionState, SdpType, SessionDescription, TransportEvent};
use crate::session::{Role, Session, SessionId, SessionState};
use crate::signaling::SignalingSink;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of a negotiation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStatus {
    Started,
    /// Nothing to do in the current state, e.g. a duplicate `offer()`
    Ignored,
}

struct ActiveSession {
    session: Session,
    transport: Box<dyn Transport>,
    monitor: IceStateMonitor,
}

pub struct ConnectionManager {
    config: Config,
    factory: Arc<dyn TransportFactory>,
    signaling: Arc<dyn SignalingSink>,
    engine: NegotiationEngine,
    media: MediaBinder,
    active: Option<ActiveSession>,
    tx: mpsc::UnboundedSender<Notification>,
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl ConnectionManager {
    pub fn new(
        config: Config,
        factory: Arc<dyn TransportFactory>,
        capture: Arc<dyn CaptureSource>,
        render: Arc<dyn RenderSink>,
        signaling: Arc<dyn SignalingSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        ConnectionManager {
            engine: NegotiationEngine::new(config.encoding),
            media: MediaBinder::new(capture, render, config.capture),
            config,
            factory,
            signaling,
            active: None,
            tx,
            rx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `Idle` when no session exists.
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map(|active| active.session.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn monitor(&self) -> Option<&IceStateMonitor> {
        self.active.as_ref().map(|active| &active.monitor)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Digest of both descriptions for out-of-band comparison.
    pub fn fingerprint(&self) -> Option<String> {
        self.session().and_then(Session::fingerprint)
    }

    /// Start negotiating as the offerer.
    ///
    /// The serialized offer is published once candidate gathering completes.
    pub async fn offer(&mut self) -> Result<NegotiationStatus> {
        if self.active.is_some() {
            debug!("offer() ignored, a session is already active");
            return Ok(NegotiationStatus::Ignored);
        }

        let mut active = self.open_session(Role::Offerer).await?;
        let started = start_offer(&self.engine, &mut self.media, &mut active).await;

        self.adopt(active, started).await
    }

    /// Answer a pasted offer.
    pub async fn answer(&mut self, offer_text: &str) -> Result<NegotiationStatus> {
        if self.active.is_some() {
            debug!("answer() ignored, a session is already active");
            return Ok(NegotiationStatus::Ignored);
        }
        let offer = self.engine.parse_remote(offer_text, SdpType::Offer)?;

        let mut active = self.open_session(Role::Answerer).await?;
        let started = start_answer(&self.engine, &mut self.media, &mut active, offer).await;

        self.adopt(active, started).await
    }

    /// Complete the offerer's handshake with a pasted answer.
    pub async fn connect(&mut self, answer_text: &str) -> Result<NegotiationStatus> {
        let Some(active) = self.active.as_mut() else {
            debug!("connect() ignored, no active session");
            return Ok(NegotiationStatus::Ignored);
        };
        if active.session.role() != Role::Offerer || active.session.remote_description().is_some()
        {
            debug!(
                "connect() ignored for {:?} session {} with remote description {}",
                active.session.role(),
                active.session.id(),
                if active.session.remote_description().is_some() { "set" } else { "unset" }
            );
            return Ok(NegotiationStatus::Ignored);
        }
        let answer = self.engine.parse_remote(answer_text, SdpType::Answer)?;

        let applied = self
            .engine
            .apply_remote_description(&mut active.session, active.transport.as_ref(), answer)
            .await;
        if let Err(e) = applied {
            error!("Applying the answer failed: {e}");
            self.disconnect().await;
            return Err(e);
        }
        Ok(NegotiationStatus::Started)
    }

    /// Tear down the session. Safe to call repeatedly and from any state.
    pub async fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            let ActiveSession {
                session,
                transport,
                monitor,
            } = active;
            // drops and aborts any pending recovery timer
            drop(monitor);

            if transport.connectivity_state() != IceConnectionState::Closed {
                if let Err(e) = transport.close().await {
                    warn!("Closing transport of session {} failed: {e}", session.id());
                }
            }
            info!(
                "Session {} ({:?}) torn down in state {:?}",
                session.id(),
                session.role(),
                session.state()
            );
        }

        self.media.release();
        self.signaling.clear();
    }

    /// Disconnect and discard notifications still queued from earlier sessions.
    pub async fn reset(&mut self) {
        self.disconnect().await;
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {dropped} stale notifications");
        }
    }

    /// Wait for one notification and dispatch it.
    pub async fn process_next_event(&mut self) {
        // the manager holds a sender, so the queue never closes
        if let Some(notification) = self.rx.recv().await {
            self.dispatch(notification).await;
        }
    }

    /// Process notifications until the active session ends or its
    /// transport reports `closed`.
    ///
    /// A closed session stays active until [`Self::disconnect`] is called.
    pub async fn run(&mut self) {
        while self.active.is_some() && self.state() != SessionState::Closed {
            self.process_next_event().await;
        }
    }

    async fn open_session(&mut self, role: Role) -> Result<ActiveSession> {
        // capture first so a denied permission never leaves a transport behind
        self.media.ensure_local_stream().await?;

        let id = SessionId::random();
        let events = EventSink::new(id.clone(), self.tx.clone());
        let transport = self.factory.create(&self.config, events).await.map_err(|e| match e {
            Error::TransportUnavailable(_) => e,
            other => Error::TransportUnavailable(other.to_string()),
        })?;

        info!("Session {} created as {:?}", id, role);
        Ok(ActiveSession {
            monitor: IceStateMonitor::new(id.clone(), self.config.recovery_grace(), self.tx.clone()),
            session: Session::new(id, role),
            transport,
        })
    }

    /// Keep a freshly negotiated session, or close it if negotiation failed.
    async fn adopt(
        &mut self,
        active: ActiveSession,
        started: Result<()>,
    ) -> Result<NegotiationStatus> {
        match started {
            Ok(()) => {
                self.active = Some(active);
                Ok(NegotiationStatus::Started)
            }
            Err(e) => {
                error!("Negotiation for session {} failed: {e}", active.session.id());
                if let Err(close_err) = active.transport.close().await {
                    warn!("Closing failed transport: {close_err}");
                }
                self.media.detach_transport();
                Err(e)
            }
        }
    }

    async fn dispatch(&mut self, notification: Notification) {
        let (session_id, action) = {
            let Some(active) = self.active.as_mut() else {
                debug!("Dropping {:?}, no active session", notification);
                return;
            };

            let action = match notification {
                Notification::Transport { session, event } if &session == active.session.id() => {
                    handle_event(active, &mut self.media, event)
                }
                Notification::RecoveryExpired { session, timer }
                    if &session == active.session.id() =>
                {
                    active.monitor.on_recovery_expired(timer)
                }
                stale => {
                    debug!("Dropping stale notification {:?}", stale);
                    return;
                }
            };
            (active.session.id().clone(), action)
        };

        match action {
            IceAction::None => {}
            IceAction::Teardown => {
                warn!("Tearing down session {session_id} after connectivity loss");
                self.disconnect().await;
            }
            IceAction::EmitLocalDescription => self.emit_local_description().await,
        }
    }

    async fn emit_local_description(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.session.description_emitted() {
            debug!("Local description already emitted for session {}", active.session.id());
            return;
        }

        match self
            .engine
            .local_description_text(&mut active.session, active.transport.as_ref())
            .await
        {
            Ok(Some(text)) => {
                analyze_candidates(active.session.local_candidates());
                active.session.mark_emitted();
                info!(
                    "Local {} ready for manual exchange ({} bytes)",
                    active
                        .session
                        .local_description()
                        .map(|d| d.kind.to_string())
                        .unwrap_or_default(),
                    text.len()
                );
                self.signaling.publish(&text);
            }
            Ok(None) => warn!("Gathering finished before a local description was set"),
            Err(e) => error!("Serializing local description failed: {e}"),
        }
    }
}

async fn start_offer(
    engine: &NegotiationEngine,
    media: &mut MediaBinder,
    active: &mut ActiveSession,
) -> Result<()> {
    media
        .attach_local_tracks(&mut active.session, active.transport.as_ref())
        .await?;
    engine
        .create_offer(&mut active.session, active.transport.as_ref())
        .await
}

async fn start_answer(
    engine: &NegotiationEngine,
    media: &mut MediaBinder,
    active: &mut ActiveSession,
    offer: SessionDescription,
) -> Result<()> {
    engine
        .accept_offer(&mut active.session, active.transport.as_ref(), offer)
        .await?;
    media
        .attach_local_tracks(&mut active.session, active.transport.as_ref())
        .await?;
    engine
        .finish_answer(&mut active.session, active.transport.as_ref())
        .await
}

fn handle_event(active: &mut ActiveSession, media: &mut MediaBinder, event: TransportEvent) -> IceAction {
    match event {
        TransportEvent::Candidate(candidate) => {
            active.monitor.on_candidate(&mut active.session, candidate)
        }
        TransportEvent::ConnectivityChanged(state) => {
            active.monitor.on_connectivity_change(&mut active.session, state)
        }
        TransportEvent::GatheringChanged(state) => active.monitor.on_gathering_change(state),
        TransportEvent::RemoteTrack(track) => {
            media.on_remote_track(&mut active.session, track);
            IceAction::None
        }
    }
}
