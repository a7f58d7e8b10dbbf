// src/profile/migration.rs

//! Handles migrations for SQLite: ensures the profile tables match the latest
//! schema. Run this at startup to guarantee schema compatibility.

use anyhow::Result;
use sqlx::{Executor, SqlitePool};

/// One row per resolved person. The opaque TEXT documents belong to other
/// subsystems and are preserved verbatim.
const CREATE_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    person_key_ref TEXT,
    identity TEXT,
    personality TEXT,
    impression TEXT,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Platform accounts known to map to a profile. Grows monotonically.
const CREATE_PROFILE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS profile_accounts (
    profile_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (profile_id, platform, user_id)
);
"#;

/// Per-(profile, group) nickname usage counts. The composite primary key
/// makes the name unique within a group and backs the upsert increment.
const CREATE_GROUP_SOBRIQUETS: &str = r#"
CREATE TABLE IF NOT EXISTS group_sobriquets (
    profile_id TEXT NOT NULL,
    group_key TEXT NOT NULL,
    name TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (profile_id, group_key, name)
);
"#;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    pool.execute(CREATE_PROFILES).await?;
    pool.execute(CREATE_PROFILE_ACCOUNTS).await?;
    pool.execute(CREATE_GROUP_SOBRIQUETS).await?;
    Ok(())
}
