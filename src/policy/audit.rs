//! The Policy Gate's own append-only, hash-chained audit log.
//!
//! Distinct from the external `EventLog` collaborator: this log is internal
//! state the FSM exclusively owns and is never deleted. Each entry's hash
//! folds in the previous entry's hash, so tampering with or removing an
//! entry breaks the chain.

use crate::policy::fsm::FsmState;
use crate::types::{ActionId, PrincipalId};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: u64,
    pub principal_id: PrincipalId,
    pub action_id: ActionId,
    pub decision: String,
    pub from_state: FsmState,
    pub to_state: FsmState,
    pub approval_token_id: Option<String>,
    prev_hash: [u8; 32],
    hash: [u8; 32],
}

fn compute_hash(entry: &AuditEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.timestamp.to_le_bytes());
    hasher.update(entry.principal_id.0.as_bytes());
    hasher.update(entry.action_id.0.as_bytes());
    hasher.update(entry.decision.as_bytes());
    hasher.update([0]);
    hasher.update([entry.from_state.u8_discriminant(), entry.to_state.u8_discriminant()]);
    if let Some(token_id) = &entry.approval_token_id {
        hasher.update(token_id.as_bytes());
    }
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}

// `FsmState` has no numeric repr; this keeps the hash stable without
// depending on enum memory layout.
trait DiscriminantByte {
    fn u8_discriminant(self) -> u8;
}

impl DiscriminantByte for FsmState {
    fn u8_discriminant(self) -> u8 {
        match self {
            FsmState::Idle => 0,
            FsmState::Evaluating => 1,
            FsmState::Approved => 2,
            FsmState::Rejected => 3,
            FsmState::PendingHuman => 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new entry; returns its insertion index. Timestamps are
    /// monotonically non-decreasing by construction: callers supply a
    /// clock-derived `timestamp` and this is append-only, so insertion order
    /// is preserved and never reordered.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        timestamp: u64,
        principal_id: PrincipalId,
        action_id: ActionId,
        decision: impl Into<String>,
        from_state: FsmState,
        to_state: FsmState,
        approval_token_id: Option<String>,
    ) -> usize {
        let mut guard = self.entries.lock();
        let prev_hash = guard.last().map(|e| e.hash).unwrap_or([0u8; 32]);
        let mut entry = AuditEntry {
            timestamp,
            principal_id,
            action_id,
            decision: decision.into(),
            from_state,
            to_state,
            approval_token_id,
            prev_hash,
            hash: [0u8; 32],
        };
        entry.hash = compute_hash(&entry);
        guard.push(entry);
        guard.len() - 1
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk the chain, checking each entry's stored hash against a freshly
    /// computed one and each `prev_hash` against its predecessor.
    pub fn verify_integrity(&self) -> bool {
        let guard = self.entries.lock();
        let mut prev = [0u8; 32];
        for entry in guard.iter() {
            if entry.prev_hash != prev {
                return false;
            }
            if compute_hash(entry) != entry.hash {
                return false;
            }
            prev = entry.hash;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_log_verifies() {
        let log = AuditLog::new();
        log.append(
            1,
            PrincipalId::new(),
            ActionId::new(),
            "allowed",
            FsmState::Idle,
            FsmState::Evaluating,
            None,
        );
        log.append(
            2,
            PrincipalId::new(),
            ActionId::new(),
            "allowed",
            FsmState::Evaluating,
            FsmState::Approved,
            None,
        );
        assert!(log.verify_integrity());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn tampering_with_a_field_breaks_the_chain() {
        let log = AuditLog::new();
        log.append(
            1,
            PrincipalId::new(),
            ActionId::new(),
            "allowed",
            FsmState::Idle,
            FsmState::Evaluating,
            None,
        );
        log.append(
            2,
            PrincipalId::new(),
            ActionId::new(),
            "allowed",
            FsmState::Evaluating,
            FsmState::Approved,
            None,
        );
        {
            let mut guard = log.entries.lock();
            guard[0].decision = "rejected".to_string();
        }
        assert!(!log.verify_integrity());
    }

    #[test]
    fn timestamps_are_monotonic_in_insertion_order() {
        let log = AuditLog::new();
        log.append(5, PrincipalId::new(), ActionId::new(), "a", FsmState::Idle, FsmState::Evaluating, None);
        log.append(9, PrincipalId::new(), ActionId::new(), "b", FsmState::Evaluating, FsmState::Approved, None);
        let entries = log.entries();
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
