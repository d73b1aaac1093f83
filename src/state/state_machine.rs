use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{GameKind, SessionRow, SessionStatus};

/// Lifecycle of the session this device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session attached.
    Idle,
    /// Players may join.
    Lobby,
    /// Onboarding overlay shown to everyone.
    Tutorial,
    /// Picking (`None`) or playing a game.
    Playing { game: Option<GameKind> },
    /// The host closed the session.
    Ended,
}

impl SessionPhase {
    /// Phase described by a session row.
    pub fn from_row(row: &SessionRow) -> Self {
        match row.status {
            SessionStatus::Lobby => SessionPhase::Lobby,
            SessionStatus::Tutorial => SessionPhase::Tutorial,
            SessionStatus::Playing => SessionPhase::Playing {
                game: row.current_game,
            },
            SessionStatus::Ended => SessionPhase::Ended,
        }
    }

    /// Status column value for this phase, `None` while idle.
    pub fn status(self) -> Option<SessionStatus> {
        match self {
            SessionPhase::Idle => None,
            SessionPhase::Lobby => Some(SessionStatus::Lobby),
            SessionPhase::Tutorial => Some(SessionStatus::Tutorial),
            SessionPhase::Playing { .. } => Some(SessionStatus::Playing),
            SessionPhase::Ended => Some(SessionStatus::Ended),
        }
    }
}

/// Host actions moving the session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new session row was created by this device.
    Open,
    /// Host starts the game from the lobby.
    BeginTutorial,
    /// Tutorial completed or skipped by the host.
    FinishTutorial,
    /// Host picked a game.
    SelectGame(GameKind),
    /// Host edits settings; the phase does not change.
    UpdateSettings,
    /// Host removed a player; the phase does not change.
    KickPlayer,
    /// Host closes the session.
    EndSession,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// A remote change moved the session while the plan was in flight.
    StatusMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition waiting for its remote write.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<SessionPhase>,
}

/// Local mirror of the session status. Host writes go through plan/apply;
/// remote changes are adopted with [`SessionStateMachine::sync`].
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine with no session attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate `event` against the current phase and reserve the transition.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition once its remote write succeeded.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Drop a planned transition after its remote write failed.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Adopt the phase observed on the datastore. Returns whether the local
    /// phase moved. The echo of our own pending write is ignored so the plan
    /// still applies cleanly.
    pub fn sync(&mut self, remote: SessionPhase) -> bool {
        if self.phase == remote {
            return false;
        }
        if self.pending.as_ref().is_some_and(|plan| plan.to == remote) {
            return false;
        }

        self.phase = remote;
        self.version += 1;
        true
    }

    /// Detach from the session.
    pub fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.version += 1;
        self.pending = None;
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Idle, SessionEvent::Open) => SessionPhase::Lobby,
            (SessionPhase::Lobby, SessionEvent::BeginTutorial) => SessionPhase::Tutorial,
            (SessionPhase::Tutorial, SessionEvent::FinishTutorial) => {
                SessionPhase::Playing { game: None }
            }
            (SessionPhase::Playing { game: None }, SessionEvent::SelectGame(kind)) => {
                SessionPhase::Playing { game: Some(kind) }
            }
            (
                phase @ (SessionPhase::Lobby | SessionPhase::Tutorial | SessionPhase::Playing { .. }),
                SessionEvent::UpdateSettings | SessionEvent::KickPlayer,
            ) => phase,
            (
                SessionPhase::Lobby | SessionPhase::Tutorial | SessionPhase::Playing { .. },
                SessionEvent::EndSession,
            ) => SessionPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
