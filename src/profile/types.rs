// src/profile/types.rs

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One nickname and how often it has been confirmed in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SobriquetEntry {
    pub name: String,
    pub count: i64,
}

/// Top-level record fields that can be requested individually from
/// [`ProfileStore::get_profile`](crate::profile::ProfileStore::get_profile).
/// The record id is always returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Accounts,
    Sobriquets,
    Identity,
    Personality,
    Impression,
}

/// A person's profile as stored. Projected reads leave unrequested
/// collections as `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub person_key_ref: Option<String>,
    /// Platform name to linked platform user ids.
    pub platform_accounts: Option<BTreeMap<String, Vec<String>>>,
    /// Group key to nickname usage entries.
    pub sobriquets_by_group: Option<HashMap<String, Vec<SobriquetEntry>>>,
    // Free-form profile documents owned by other subsystems; stored and
    // returned verbatim, never interpreted here.
    pub identity: Option<String>,
    pub personality: Option<String>,
    pub impression: Option<String>,
}
