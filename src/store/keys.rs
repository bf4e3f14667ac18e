//! Presence key layout
//!
//! All live presence state for a community hangs off a `presence:{id}:*`
//! namespace so a community's keys expire together once traffic stops.
//! The layout is internal; only the operations in [`super::PresenceStore`]
//! touch it.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identity prefix for anonymous visitors
pub const ANONYMOUS_PREFIX: &str = "anon_";

/// Fingerprints longer than this are shortened to a digest
const MAX_FINGERPRINT_CHARS: usize = 64;

/// Hash field per identity -> serialized `VisitorEntry`
pub fn entries(community_id: &Uuid) -> String {
    format!("presence:{}:entries", community_id)
}

/// Set of authenticated identities currently present
pub fn authenticated(community_id: &Uuid) -> String {
    format!("presence:{}:auth", community_id)
}

/// Set of anonymous identities currently present
pub fn anonymous(community_id: &Uuid) -> String {
    format!("presence:{}:anon", community_id)
}

/// Hash of home-division id -> live visitor count (gauge)
pub fn divisions(community_id: &Uuid) -> String {
    format!("presence:{}:divisions", community_id)
}

/// Sorted set of "home|visited" division pairs -> accumulated visits (ledger)
pub fn cross_division(community_id: &Uuid) -> String {
    format!("presence:{}:cross", community_id)
}

/// Peak visitor count for one window, keyed by the window token
pub fn peak(community_id: &Uuid, window: &str, token: &str) -> String {
    format!("presence:{}:peak:{}:{}", community_id, window, token)
}

/// Set of community ids with recent presence traffic (reaper work list)
pub fn active_communities() -> String {
    "presence:active".to_string()
}

/// Cross-division ledger member for a (home, visited) pair
///
/// The literal pair is the key; pairs are never merged or normalized.
pub fn cross_division_member(home_division: &str, visited_division: &str) -> String {
    format!("{}|{}", home_division, visited_division)
}

/// Canonical identity for an anonymous visitor
///
/// Client fingerprints are caller-supplied and unbounded; over-long ones are
/// shortened to a digest so store keys stay small.
pub fn anonymous_identity(fingerprint: &str) -> String {
    if fingerprint.len() <= MAX_FINGERPRINT_CHARS {
        format!("{}{}", ANONYMOUS_PREFIX, fingerprint)
    } else {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        let digest = hasher.finalize();
        format!("{}{}", ANONYMOUS_PREFIX, hex::encode(&digest[..16]))
    }
}

/// Whether an identity belongs to an anonymous visitor
pub fn is_anonymous(identity: &str) -> bool {
    identity.starts_with(ANONYMOUS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_fingerprints_pass_through() {
        assert_eq!(anonymous_identity("abc123"), "anon_abc123");
        assert!(is_anonymous(&anonymous_identity("abc123")));
    }

    #[test]
    fn long_fingerprints_are_shortened() {
        let long = "x".repeat(200);
        let identity = anonymous_identity(&long);
        assert!(identity.starts_with(ANONYMOUS_PREFIX));
        // prefix + 16 digest bytes as hex
        assert_eq!(identity.len(), ANONYMOUS_PREFIX.len() + 32);
        // deterministic
        assert_eq!(identity, anonymous_identity(&long));
    }

    #[test]
    fn cross_division_member_is_literal_pair() {
        assert_eq!(cross_division_member("d1", "d2"), "d1|d2");
        assert_ne!(
            cross_division_member("d1", "d2"),
            cross_division_member("d2", "d1")
        );
    }
}
