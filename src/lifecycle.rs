//! Status state machines for enrolments and quiz attempts.
//!
//! Both are pure: the ledger, attempt engine and progression coordinator ask
//! `transition` for the next state and persist whatever it returns.

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{EnrolmentStatus, QuizAttempt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrolmentEvent {
    /// Explicit (re-)enrolment request.
    Enrol,
    Disenrol,
    /// At least one attempt exists for the enrolment.
    AttemptActivity,
    /// Every quiz of the course has a passing attempt.
    QuizzesPassed,
}

/// Allowed enrolment transitions. Progression events only ever move status
/// forward and leave a disenrolled record alone.
pub fn transition(status: EnrolmentStatus, event: EnrolmentEvent) -> EngineResult<EnrolmentStatus> {
    use EnrolmentEvent::*;
    use EnrolmentStatus::*;

    match (status, event) {
        (Disenrolled, Enrol) => Ok(Enrolled),
        (Enrolled | InProgress | Completed, Enrol) => Err(EngineError::AlreadyEnrolled),

        (Enrolled | InProgress | Completed, Disenrol) => Ok(Disenrolled),
        (Disenrolled, Disenrol) => Err(EngineError::NotEnrolled),

        (Enrolled, AttemptActivity) => Ok(InProgress),
        (Enrolled | InProgress, QuizzesPassed) => Ok(Completed),
        (s, AttemptActivity | QuizzesPassed) => Ok(s),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Open,
    Closed,
}

impl AttemptState {
    pub fn of(attempt: &QuizAttempt) -> Self {
        if attempt.end_time.is_some() {
            AttemptState::Closed
        } else {
            AttemptState::Open
        }
    }

    /// The only attempt event is submission; a closed attempt is terminal.
    pub fn submit(self, attempt_id: Uuid) -> EngineResult<AttemptState> {
        match self {
            AttemptState::Open => Ok(AttemptState::Closed),
            AttemptState::Closed => Err(EngineError::AlreadySubmitted(attempt_id)),
        }
    }
}
