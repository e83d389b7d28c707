//! The Goal-Guard state machine.
//!
//! `IDLE -> EVALUATING -> {APPROVED, REJECTED, PENDING_HUMAN}`, with
//! `PENDING_HUMAN -> APPROVED` on a valid token-backed approval. `APPROVED`
//! and `REJECTED` are terminal for that evaluation; the FSM resets to `IDLE`
//! for the next one.

use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FsmState {
    Idle,
    Evaluating,
    Approved,
    Rejected,
    PendingHuman,
}

pub fn allowed_transitions(from: FsmState) -> &'static [FsmState] {
    use FsmState::*;
    match from {
        Idle => &[Evaluating],
        Evaluating => &[Approved, Rejected, PendingHuman],
        PendingHuman => &[Approved, Rejected],
        Approved => &[Idle],
        Rejected => &[Idle],
    }
}

pub fn validate_transition(from: FsmState, to: FsmState) -> Result<(), PolicyError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PolicyError::EvaluationInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_only_transitions_to_evaluating() {
        assert_eq!(allowed_transitions(FsmState::Idle), &[FsmState::Evaluating]);
    }

    #[test]
    fn pending_human_can_only_resolve_to_approved_or_rejected() {
        let allowed = allowed_transitions(FsmState::PendingHuman);
        assert!(allowed.contains(&FsmState::Approved));
        assert!(allowed.contains(&FsmState::Rejected));
        assert!(!allowed.contains(&FsmState::Evaluating));
    }

    #[test]
    fn terminal_states_reset_to_idle() {
        assert_eq!(allowed_transitions(FsmState::Approved), &[FsmState::Idle]);
        assert_eq!(allowed_transitions(FsmState::Rejected), &[FsmState::Idle]);
    }

    #[test]
    fn illegal_transition_rejected() {
        assert!(validate_transition(FsmState::Idle, FsmState::Approved).is_err());
    }
}
