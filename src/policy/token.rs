//! Single-use approval tokens issued when an action gates into
//! `PENDING_HUMAN`.
//!
//! Invariants enforced here: a token is valid only once, only issued on a
//! transition into `PENDING_HUMAN`, and binds to its action id.

use crate::types::{ActionId, Principal};
use rand::RngCore;

/// Opaque, cryptographically strong bearer token. ≥128 bits of entropy,
/// rendered as hex so it's safe to log the token id (not its secret) and to
/// transmit over text channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSecret(String);

impl TokenSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32]; // 256 bits, comfortably above the 128-bit floor
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalToken {
    pub secret: TokenSecret,
    pub action_id: ActionId,
    pub principal_snapshot: Principal,
    pub issued_at: u64,
    pub expires_at: u64,
    pub used: bool,
}

impl ApprovalToken {
    pub fn issue(action_id: ActionId, principal: &Principal, now: u64, ttl_secs: u64) -> Self {
        Self {
            secret: TokenSecret::generate(),
            action_id,
            principal_snapshot: principal.clone(),
            issued_at: now,
            expires_at: now + ttl_secs,
            used: false,
        }
    }

    pub fn is_valid(&self, now: u64) -> bool {
        !self.used && now <= self.expires_at
    }

    /// Default expiry: 1 hour.
    pub const DEFAULT_TTL_SECS: u64 = 3600;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrincipalKind;

    #[test]
    fn token_is_valid_until_expiry() {
        let p = Principal::new(PrincipalKind::Human);
        let t = ApprovalToken::issue(ActionId::new(), &p, 1000, 3600);
        assert!(t.is_valid(1000));
        assert!(t.is_valid(4600));
        assert!(!t.is_valid(4601));
    }

    #[test]
    fn used_token_is_invalid_even_before_expiry() {
        let p = Principal::new(PrincipalKind::Human);
        let mut t = ApprovalToken::issue(ActionId::new(), &p, 1000, 3600);
        t.used = true;
        assert!(!t.is_valid(1000));
    }

    #[test]
    fn two_tokens_never_collide() {
        let a = TokenSecret::generate();
        let b = TokenSecret::generate();
        assert_ne!(a, b);
    }
}
