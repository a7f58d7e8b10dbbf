// src/profile/mod.rs

//! Persistent per-person profile records: linked platform accounts and
//! per-group nickname usage counts.

pub mod migration;
pub mod store;
pub mod types;

pub use store::ProfileStore;
pub use types::{ProfileField, ProfileRecord, SobriquetEntry};

use sha2::{Digest, Sha256};

/// Scope key for nickname counts: one group on one platform.
pub fn group_key(platform: &str, group_id: &str) -> String {
    format!("{platform}-{group_id}")
}

/// Deterministic record id from an externally-supplied person key.
///
/// Same key and salt always hash to the same id, so repeated observations
/// accumulate onto one record. Changing the salt orphans all prior records.
pub fn generate_profile_id(salt: &str, person_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{salt}-{person_key}").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_is_deterministic() {
        let a = generate_profile_id("salt", "person-1");
        let b = generate_profile_id("salt", "person-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_profile_id_varies_with_key_and_salt() {
        let base = generate_profile_id("salt", "person-1");
        assert_ne!(base, generate_profile_id("salt", "person-2"));
        assert_ne!(base, generate_profile_id("other-salt", "person-1"));
    }

    #[test]
    fn test_group_key_format() {
        assert_eq!(group_key("qq", "group101"), "qq-group101");
    }
}
