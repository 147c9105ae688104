use crate::peer::media::{LocalStream, RemoteStream};
use crate::peer::types::{IceCandidate, IceConnectionState, SessionDescription};
use crate::utils::random_id;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        SessionId(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    OfferPending,
    AnswerPending,
    Connected,
    Disconnected,
    Closed,
}

/// The single active negotiation context.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    role: Role,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    local_stream: Weak<LocalStream>,
    remote_stream: Weak<RemoteStream>,
    local_candidates: Vec<IceCandidate>,
    description_emitted: bool,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, role: Role) -> Self {
        Session {
            id,
            role,
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            local_stream: Weak::new(),
            remote_stream: Weak::new(),
            local_candidates: Vec::new(),
            description_emitted: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn local_stream(&self) -> Option<Arc<LocalStream>> {
        self.local_stream.upgrade()
    }

    pub fn remote_stream(&self) -> Option<Arc<RemoteStream>> {
        self.remote_stream.upgrade()
    }

    pub fn local_candidates(&self) -> &[IceCandidate] {
        &self.local_candidates
    }

    pub fn description_emitted(&self) -> bool {
        self.description_emitted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// State while negotiation is still in progress for this role
    fn pending_state(&self) -> SessionState {
        match self.role {
            Role::Offerer => SessionState::OfferPending,
            Role::Answerer => SessionState::AnswerPending,
        }
    }

    pub(crate) fn mark_pending(&mut self) {
        self.state = self.pending_state();
    }

    /// Derive the session state from a connectivity transition.
    pub(crate) fn apply_connectivity(&mut self, connectivity: IceConnectionState) {
        self.state = match connectivity {
            IceConnectionState::New | IceConnectionState::Checking => {
                if self.state == SessionState::Idle {
                    SessionState::Idle
                } else {
                    self.pending_state()
                }
            }
            IceConnectionState::Connected | IceConnectionState::Completed => {
                SessionState::Connected
            }
            IceConnectionState::Disconnected | IceConnectionState::Failed => {
                SessionState::Disconnected
            }
            IceConnectionState::Closed => SessionState::Closed,
        };
    }

    pub(crate) fn set_local_description(&mut self, desc: SessionDescription) {
        self.local_description = Some(desc);
    }

    pub(crate) fn set_remote_description(&mut self, desc: SessionDescription) {
        self.remote_description = Some(desc);
    }

    pub(crate) fn bind_local_stream(&mut self, stream: &Arc<LocalStream>) {
        self.local_stream = Arc::downgrade(stream);
    }

    pub(crate) fn bind_remote_stream(&mut self, stream: &Arc<RemoteStream>) {
        self.remote_stream = Arc::downgrade(stream);
    }

    pub(crate) fn push_candidate(&mut self, candidate: IceCandidate) {
        self.local_candidates.push(candidate);
    }

    pub(crate) fn mark_emitted(&mut self) {
        self.description_emitted = true;
    }

    /// Short digest both peers can read aloud to confirm they exchanged
    /// the same descriptions.
    ///
    /// Both SDP payloads are hashed in sorted order so the offerer and
    /// the answerer derive the same value.
    pub fn fingerprint(&self) -> Option<String> {
        let local = self.local_description.as_ref()?;
        let remote = self.remote_description.as_ref()?;

        let mut parts = [local.sdp.as_str(), remote.sdp.as_str()];
        parts.sort_unstable();

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hex::encode(&hasher.finalize()[..6]);

        Some(
            digest
                .as_bytes()
                .chunks(4)
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect::<Vec<_>>()
                .join("-"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_idle() {
        let session = Session::new(SessionId::random(), Role::Offerer);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.local_description().is_none());
        assert!(session.remote_stream().is_none());
        assert!(session.fingerprint().is_none());
    }

    #[test]
    fn state_follows_connectivity() {
        let mut session = Session::new(SessionId::random(), Role::Answerer);
        session.mark_pending();
        assert_eq!(session.state(), SessionState::AnswerPending);

        session.apply_connectivity(IceConnectionState::Checking);
        assert_eq!(session.state(), SessionState::AnswerPending);

        session.apply_connectivity(IceConnectionState::Connected);
        assert_eq!(session.state(), SessionState::Connected);

        session.apply_connectivity(IceConnectionState::Disconnected);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.apply_connectivity(IceConnectionState::Completed);
        assert_eq!(session.state(), SessionState::Connected);

        session.apply_connectivity(IceConnectionState::Closed);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn fingerprint_matches_on_both_sides() {
        let offer = SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\n");
        let answer = SessionDescription::answer("v=0\r\no=- 2 2 IN IP4 10.0.0.2\r\n");

        let mut offerer = Session::new(SessionId::random(), Role::Offerer);
        offerer.set_local_description(offer.clone());
        offerer.set_remote_description(answer.clone());

        let mut answerer = Session::new(SessionId::random(), Role::Answerer);
        answerer.set_local_description(answer);
        answerer.set_remote_description(offer);

        let fp = offerer.fingerprint().unwrap();
        assert_eq!(Some(fp.clone()), answerer.fingerprint());
        assert_eq!(fp.len(), 14);
        assert_eq!(fp.matches('-').count(), 2);
    }
}
