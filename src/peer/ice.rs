use crate::peer::transport::Notification;
use crate::peer::types::{IceCandidate, IceConnectionState, IceGatheringState};
use crate::session::{Session, SessionId};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// What the connectivity table prescribes for an observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityPolicy {
    Observe,
    Teardown,
    Recover,
    Inert,
}

/// Connectivity transition table.
pub const fn connectivity_policy(state: IceConnectionState) -> ConnectivityPolicy {
    match state {
        IceConnectionState::New => ConnectivityPolicy::Observe,
        IceConnectionState::Checking => ConnectivityPolicy::Observe,
        IceConnectionState::Connected => ConnectivityPolicy::Observe,
        IceConnectionState::Completed => ConnectivityPolicy::Observe,
        IceConnectionState::Failed => ConnectivityPolicy::Teardown,
        IceConnectionState::Disconnected => ConnectivityPolicy::Recover,
        IceConnectionState::Closed => ConnectivityPolicy::Inert,
    }
}

/// What the manager must do after a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceAction {
    None,
    Teardown,
    EmitLocalDescription,
}

/// Pending teardown of a `disconnected` session.
///
/// Expiry is reported to the manager's queue; dropping or cancelling the
/// handle aborts the sleeping task.
#[derive(Debug)]
pub struct RecoveryTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl RecoveryTimer {
    fn start(
        session: SessionId,
        generation: u64,
        grace: Duration,
        tx: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let deadline = Instant::now() + grace;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(Notification::RecoveryExpired {
                session,
                timer: generation,
            });
        });
        RecoveryTimer { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for RecoveryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Tracks connectivity and gathering for one session and applies the
/// teardown/recovery policy.
#[derive(Debug)]
pub struct IceStateMonitor {
    session: SessionId,
    grace: Duration,
    connectivity: IceConnectionState,
    gathering: IceGatheringState,
    recovery: Option<RecoveryTimer>,
    timers_started: u64,
    tx: mpsc::UnboundedSender<Notification>,
}

impl IceStateMonitor {
    pub(crate) fn new(
        session: SessionId,
        grace: Duration,
        tx: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        IceStateMonitor {
            session,
            grace,
            connectivity: IceConnectionState::New,
            gathering: IceGatheringState::New,
            recovery: None,
            timers_started: 0,
            tx,
        }
    }

    pub fn connectivity(&self) -> IceConnectionState {
        self.connectivity
    }

    pub fn gathering(&self) -> IceGatheringState {
        self.gathering
    }

    pub fn recovery_pending(&self) -> bool {
        self.recovery.is_some()
    }

    /// Number of recovery timers armed over the session's lifetime
    pub fn timers_started(&self) -> u64 {
        self.timers_started
    }

    pub fn on_connectivity_change(
        &mut self,
        session: &mut Session,
        state: IceConnectionState,
    ) -> IceAction {
        let previous = std::mem::replace(&mut self.connectivity, state);
        info!(
            "ICE connection state change: {:?} -> {:?} (session {})",
            previous, state, self.session
        );
        session.apply_connectivity(state);

        if state != IceConnectionState::Disconnected {
            if let Some(timer) = self.recovery.take() {
                info!(
                    "Connectivity left disconnected ({:?}), cancelling recovery timer {}",
                    state,
                    timer.generation()
                );
                timer.cancel();
            }
        }

        match connectivity_policy(state) {
            ConnectivityPolicy::Observe | ConnectivityPolicy::Inert => IceAction::None,
            ConnectivityPolicy::Teardown => {
                warn!("ICE connectivity failed for session {}, tearing down", self.session);
                IceAction::Teardown
            }
            ConnectivityPolicy::Recover => {
                if self.recovery.is_some() {
                    debug!("Recovery timer already pending for session {}", self.session);
                } else {
                    self.timers_started += 1;
                    warn!(
                        "ICE disconnected for session {}, waiting {} s for recovery",
                        self.session,
                        self.grace.as_secs()
                    );
                    self.recovery = Some(RecoveryTimer::start(
                        self.session.clone(),
                        self.timers_started,
                        self.grace,
                        self.tx.clone(),
                    ));
                }
                IceAction::None
            }
        }
    }

    /// Handle an expired recovery timer.
    pub fn on_recovery_expired(&mut self, generation: u64) -> IceAction {
        let current = self.recovery.as_ref().map(RecoveryTimer::generation);
        if current != Some(generation) {
            debug!(
                "Ignoring stale recovery timer {} (current {:?})",
                generation, current
            );
            return IceAction::None;
        }

        self.recovery = None;
        if self.connectivity == IceConnectionState::Disconnected {
            warn!(
                "Session {} still disconnected after {} s grace, tearing down",
                self.session,
                self.grace.as_secs()
            );
            IceAction::Teardown
        } else {
            IceAction::None
        }
    }

    pub fn on_gathering_change(&mut self, state: IceGatheringState) -> IceAction {
        let previous = std::mem::replace(&mut self.gathering, state);
        info!("ICE gathering state change: {:?} -> {:?}", previous, state);
        match state {
            IceGatheringState::New | IceGatheringState::Gathering => IceAction::None,
            IceGatheringState::Complete => IceAction::EmitLocalDescription,
        }
    }

    /// A candidate notification; `None` ends gathering like `complete` does.
    pub fn on_candidate(
        &mut self,
        session: &mut Session,
        candidate: Option<IceCandidate>,
    ) -> IceAction {
        match candidate {
            Some(candidate) => {
                dump_candidate("LOCAL", &candidate);
                session.push_candidate(candidate);
                IceAction::None
            }
            None => {
                debug!("End of candidates for session {}", self.session);
                IceAction::EmitLocalDescription
            }
        }
    }
}

pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    debug!(
        "ICE candidate {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index
    );
}

/// Candidate counts by type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
    pub other: usize,
}

pub fn analyze_candidates(candidates: &[IceCandidate]) -> CandidateSummary {
    let mut summary = CandidateSummary::default();
    for candidate in candidates {
        match candidate.candidate_type() {
            Some("host") => summary.host += 1,
            Some("srflx") => summary.srflx += 1,
            Some("relay") => summary.relay += 1,
            _ => summary.other += 1,
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        summary.host, summary.srflx, summary.relay
    );
    if summary.relay == 0 {
        warn!("No TURN relay candidates found, connection through symmetric NAT may fail");
    }
    summary
}
